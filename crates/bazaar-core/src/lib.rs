//! # bazaar-core: Pure Business Logic for Bazaar POS
//!
//! This crate is the **heart** of Bazaar POS. It contains all business logic
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Bazaar POS Architecture                        │
//! │                                                                     │
//! │  ┌───────────────────────────────────────────────────────────────┐ │
//! │  │                External callers (API layer, CLI)              │ │
//! │  └──────────────────────────────┬────────────────────────────────┘ │
//! │                                 │                                   │
//! │  ┌──────────────────────────────▼────────────────────────────────┐ │
//! │  │                bazaar-db (engines + storage)                  │ │
//! │  │     billing · returns · inventory · ledger · visibility       │ │
//! │  └──────────────────────────────┬────────────────────────────────┘ │
//! │                                 │                                   │
//! │  ┌──────────────────────────────▼────────────────────────────────┐ │
//! │  │               ★ bazaar-core (THIS CRATE) ★                    │ │
//! │  │                                                               │ │
//! │  │  ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌───────────┐          │ │
//! │  │  │  money  │ │ billing │ │proration │ │visibility │          │ │
//! │  │  │  Money  │ │ totals  │ │  refund  │ │  archive  │          │ │
//! │  │  │  Rate   │ │ settle  │ │  factor  │ │   rule    │          │ │
//! │  │  └─────────┘ └─────────┘ └──────────┘ └───────────┘          │ │
//! │  │                                                               │ │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS            │ │
//! │  └───────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Item, Bill, Return, StockMovement, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`billing`] - Totals, payment-split validation, settlement rule
//! - [`proration`] - Discount/tax-adjusted refund math for returns
//! - [`visibility`] - Which batches of a (name, brand) group are shown
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation

pub mod billing;
pub mod error;
pub mod money;
pub mod proration;
pub mod types;
pub mod validation;
pub mod visibility;

pub use error::{ConflictError, ValidationError};
pub use money::{Money, Rate};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tolerance for plain returns: the declared refund may deviate from the
/// computed return subtotal by up to this amount (±₹5), so the operator can
/// round at the register. Exchanges do NOT get this tolerance; their net due
/// must match exactly.
pub const REFUND_ROUND_TOLERANCE: Money = Money::from_paise(500);

/// Maximum quantity of a single item on one bill line.
///
/// ## Business Reason
/// Prevents accidental over-billing (typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 9999;
