//! # Error Types
//!
//! Domain-specific error types for bazaar-core.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  ValidationError  - bad input, detected before any mutation         │
//! │  ConflictError    - the request contradicts recorded state          │
//! │                     (edit after receipts, over-return, net-due)     │
//! │                                                                     │
//! │  NotFound and Persistence live in bazaar-db, where ids are          │
//! │  resolved and transactions commit. The engines there combine all    │
//! │  four kinds into one surface.                                       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (item name, amounts)
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation failures. Always detected before any mutation, reported
/// with a specific human-readable reason, never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// A signed value that has to move the needle (stock adjustments).
    #[error("{field} must be non-zero")]
    MustBeNonZero { field: String },

    /// A money amount that may not be negative.
    #[error("{field} cannot be negative")]
    NegativeAmount { field: String },

    /// Invalid format (e.g. a malformed expiry date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("Bill must have at least one item")]
    EmptyBill,

    #[error("Return must have at least one item")]
    EmptyReturn,

    #[error("Exchange must include return items and new items")]
    EmptyExchange,

    #[error("Discount must be between 0 and 100")]
    DiscountOutOfRange,

    #[error("final_amount cannot be negative")]
    NegativeFinalAmount,

    /// Not enough stock to cover a sale line.
    #[error("Insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock { name: String, available: i64, requested: i64 },

    // --- payment breakdown (bill creation) ------------------------------
    #[error("payment_cash must equal total_amount")]
    CashMustEqualTotal,

    #[error("payment_online must equal total_amount")]
    OnlineMustEqualTotal,

    #[error("Cash + Online + Credit must equal total_amount")]
    SplitMustEqualTotal,

    #[error("Credit bills take no payment at creation")]
    CreditTakesNoPayment,

    // --- receive payment ------------------------------------------------
    #[error("For cash mode, online_amount must be 0")]
    CashModeHasOnline,

    #[error("For online mode, cash_amount must be 0")]
    OnlineModeHasCash,

    #[error("Payment amount must be > 0")]
    NonPositivePayment,

    /// Credit is a bill-creation mode, not a receipt mode.
    #[error("Invalid mode")]
    InvalidReceiptMode,

    /// Exchanges settle immediately; credit is not a valid exchange mode.
    #[error("Invalid payment_mode")]
    InvalidExchangeMode,

    #[error("Invalid refund_mode")]
    InvalidRefundMode,

    // --- returns --------------------------------------------------------
    /// Declared refund strays too far from the computed return subtotal.
    #[error("{field} deviates from computed subtotal by more than {tolerance}")]
    RefundOutsideTolerance { field: String, tolerance: Money },
}

// =============================================================================
// Conflict Error
// =============================================================================

/// The request is well-formed but contradicts recorded state.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Editing is allowed only before any credit collection has occurred;
    /// a manual receipt would be invalidated by regenerating the bill.
    #[error("Bill {bill_id} has received payments and can no longer be edited")]
    BillHasManualReceipts { bill_id: i64 },

    /// Every mutating bill operation checks the deletion overlay first.
    #[error("Bill {bill_id} is deleted")]
    BillDeleted { bill_id: i64 },

    #[error("Bill {bill_id} is not deleted")]
    BillNotDeleted { bill_id: i64 },

    #[error("No remaining qty to return for {item_name}")]
    NothingToReturn { item_name: String },

    #[error("Return qty exceeds remaining for {item_name} (remaining {remaining})")]
    ReturnExceedsRemaining { item_name: String, remaining: i64 },

    /// Item was never sold on the named source bill.
    #[error("{item_name} was not sold on bill {bill_id}")]
    NotOnBill { item_name: String, bill_id: i64 },

    /// Exchange settlement is exact: customer pays net_due to the paisa.
    #[error("Payment amounts must equal net due ({net_due})")]
    ExchangePaymentMismatch { net_due: Money },

    #[error("Refund amounts must equal |net due| ({refund_due})")]
    ExchangeRefundMismatch { refund_due: Money },
}

// =============================================================================
// Unit Tests
// =============================================================================
