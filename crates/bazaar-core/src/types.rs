//! # Domain Types
//!
//! Core domain types used throughout Bazaar POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                │
//! │                                                                     │
//! │  ┌───────────────┐   ┌───────────────┐   ┌────────────────┐        │
//! │  │     Item      │   │     Bill      │   │  BillPayment   │        │
//! │  │  ───────────  │   │  ───────────  │   │  ────────────  │        │
//! │  │  (name,brand) │   │  totals       │   │  append-only   │        │
//! │  │  expiry, mrp  │   │  discount     │   │  receipts      │        │
//! │  │  stock        │   │  status       │   │                │        │
//! │  └───────────────┘   └───────────────┘   └────────────────┘        │
//! │                                                                     │
//! │  ┌───────────────┐   ┌───────────────┐   ┌────────────────┐        │
//! │  │ StockMovement │   │    Return     │   │  PaymentMode   │        │
//! │  │  append-only  │   │  refunds +    │   │  PaymentStatus │        │
//! │  │  ledger       │   │  exchanges    │   │ MovementReason │        │
//! │  └───────────────┘   └───────────────┘   └────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row ids are `i64` AUTOINCREMENT values. The ledger's balance
//! reconstruction walks ids downward and the visibility tie-break picks the
//! lowest id, so ids must be monotonically increasing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Item (stock batch)
// =============================================================================

/// A purchasable stock batch: one (name, brand, expiry, price) combination.
///
/// Batches sharing a case-insensitive (name, brand) key form a "group";
/// visibility rules operate per group (see [`crate::visibility`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Item {
    pub id: i64,

    /// Product name. Grouping compares it case-insensitively.
    pub name: String,

    /// Brand; `None` and blank are the same group key.
    pub brand: Option<String>,

    /// Expiry date as `YYYY-MM-DD` text, `None` when unknown.
    pub expiry_date: Option<String>,

    /// Unit price in paise.
    pub mrp_paise: i64,

    /// Current stock. Never negative; provably equals the sum of this
    /// item's ledger deltas.
    pub stock: i64,

    /// Physical rack/shelf label.
    pub rack_number: Option<String>,

    /// Derived visibility flag, never user-set. Maintained by the
    /// visibility engine after every stock or grouping-key change.
    pub is_archived: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Returns the unit price as Money.
    #[inline]
    pub fn mrp(&self) -> Money {
        Money::from_paise(self.mrp_paise)
    }

    /// Normalized (name, brand) group key.
    pub fn group_key(&self) -> (String, String) {
        (normalize_key(&self.name), normalize_key(self.brand.as_deref().unwrap_or("")))
    }
}

/// Lowercased, trimmed form used for (name, brand) grouping.
pub fn normalize_key(s: &str) -> String {
    s.trim().to_lowercase()
}

/// An explicit field update for an [`Item`].
///
/// Partial updates are a fixed set of tagged fields applied by exhaustive
/// `match`, so a patch can never write a column the domain did not intend
/// to expose.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPatch {
    Name(String),
    Brand(Option<String>),
    ExpiryDate(Option<String>),
    Mrp(Money),
    Stock(i64),
    RackNumber(Option<String>),
}

// =============================================================================
// Stock Movement (ledger)
// =============================================================================

/// Why a stock movement happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementReason {
    /// Opening stock of a newly created batch.
    Opening,
    Sale,
    Return,
    Adjust,
    BillEdit,
    ExchangeIn,
    ExchangeOut,
    /// Restock folded into an existing identical batch.
    ItemMerge,
    /// Reserved ingest reason written by data backfills.
    ItemCreate,
    /// Stock overwritten through an item patch.
    Manual,
}

/// One append-only ledger row. Never updated, never deleted.
///
/// Invariant: for every item, `SUM(delta)` equals the item's current stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: i64,
    pub item_id: i64,
    pub ts: DateTime<Utc>,
    /// Signed stock delta; positive = stock in.
    pub delta: i64,
    pub reason: MovementReason,
    /// Kind of the causing record: "BILL", "RETURN", "EXCHANGE", "ITEM".
    pub ref_type: String,
    /// Id of the causing record, if any.
    pub ref_id: Option<i64>,
    pub note: Option<String>,
    pub actor: Option<String>,
}

// =============================================================================
// Payment Mode / Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Cash,
    Online,
    Split,
    /// Nothing collected at point of sale; settled later via receipts.
    Credit,
}

/// Settlement state of a bill, derived from its payment receipts.
///
/// No terminal lock: PAID can regress in principle if receipts were ever
/// reversed, though no reversal operation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

// =============================================================================
// Bill
// =============================================================================

/// A sale transaction.
///
/// `total_amount_paise` may be a manual override supplied at creation, which
/// is why return proration never recomputes it from the discount alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Bill {
    pub id: i64,
    pub date_time: DateTime<Utc>,
    /// Invoice-level discount in basis points.
    pub discount_bps: i64,
    /// Tax in basis points. Not set by the create operation; participates
    /// in return proration for migrated bills that carried tax.
    pub tax_bps: i64,
    /// Sum of line totals before discount, in paise.
    pub subtotal_paise: i64,
    /// Final billed amount, in paise (possibly a manual override).
    pub total_amount_paise: i64,
    pub payment_mode: PaymentMode,
    /// Total cash collected for this bill so far.
    pub payment_cash_paise: i64,
    /// Total online collected for this bill so far.
    pub payment_online_paise: i64,
    pub is_credit: bool,
    pub payment_status: PaymentStatus,
    /// Derived from receipts, never incremented in place.
    pub paid_amount_paise: i64,
    pub paid_at: Option<DateTime<Utc>>,
    /// Reporting-visibility flag; deleting a bill does not reverse stock.
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Bill {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_paise(self.subtotal_paise)
    }

    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_paise(self.total_amount_paise)
    }

    #[inline]
    pub fn paid_amount(&self) -> Money {
        Money::from_paise(self.paid_amount_paise)
    }

    /// Outstanding amount, clamped at zero.
    pub fn pending_amount(&self) -> Money {
        Money::from_paise((self.total_amount_paise - self.paid_amount_paise).max(0))
    }

    pub fn discount_percent(&self) -> f64 {
        self.discount_bps as f64 / 100.0
    }
}

/// A denormalized sale line. `mrp_paise` is the price at time of sale
/// (snapshot), which may be a per-line custom price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BillItem {
    pub id: i64,
    pub bill_id: i64,
    pub item_id: i64,
    pub item_name: String,
    pub mrp_paise: i64,
    pub quantity: i64,
    pub line_total_paise: i64,
}

impl BillItem {
    #[inline]
    pub fn mrp(&self) -> Money {
        Money::from_paise(self.mrp_paise)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_paise(self.line_total_paise)
    }
}

/// An append-only payment receipt. Source of truth for `Bill.paid_amount`.
///
/// `is_auto` marks the single receipt written automatically at bill
/// creation for whatever was collected at the register; all later receipts
/// are manual and block bill editing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BillPayment {
    pub id: i64,
    pub bill_id: i64,
    pub received_at: DateTime<Utc>,
    pub mode: PaymentMode,
    pub cash_paise: i64,
    pub online_paise: i64,
    pub is_auto: bool,
    pub note: Option<String>,
}

impl BillPayment {
    /// Total amount on this receipt.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_paise(self.cash_paise + self.online_paise)
    }
}

// =============================================================================
// Return
// =============================================================================

/// A refund transaction, optionally tied to a source bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Return {
    pub id: i64,
    pub date_time: DateTime<Utc>,
    /// `None` = customer had no bill; refunds at plain MRP, no proration.
    pub source_bill_id: Option<i64>,
    pub subtotal_return_paise: i64,
    pub refund_cash_paise: i64,
    pub refund_online_paise: i64,
    /// Manual correction applied to the theoretical net during an exchange.
    pub rounding_adjustment_paise: i64,
    pub notes: Option<String>,
}

impl Return {
    #[inline]
    pub fn subtotal_return(&self) -> Money {
        Money::from_paise(self.subtotal_return_paise)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReturnItem {
    pub id: i64,
    pub return_id: i64,
    pub item_id: i64,
    pub item_name: String,
    pub mrp_paise: i64,
    pub quantity: i64,
    /// Discount/tax/proration-adjusted value of this line, in paise.
    pub line_total_paise: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
