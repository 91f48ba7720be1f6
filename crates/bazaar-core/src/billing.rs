//! # Billing Math
//!
//! Pure totals, payment-split validation, and the settlement rule.
//!
//! ## Where This Sits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Create / Edit Bill (bazaar-db engine)                              │
//! │                                                                     │
//! │  line prices ──► effective_unit_price ──► subtotal                  │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  compute_total(subtotal, discount, manual override)                 │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  validate_payment_breakdown(mode, cash, online, credit, total)      │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  settle(paid_now, total) ──► PAID / PARTIAL / UNPAID                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same `settle` function is re-evaluated on every payment receipt by
//! summing ALL receipt rows, never by trusting a cached paid amount, so a
//! double-applied receipt can never drift the status.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::{Money, Rate};
use crate::types::{PaymentMode, PaymentStatus};

// =============================================================================
// Line Pricing
// =============================================================================

/// Unit price for a sale line: the custom price when one is given and
/// positive, otherwise the item's current MRP.
#[inline]
pub fn effective_unit_price(mrp: Money, custom: Option<Money>) -> Money {
    match custom {
        Some(price) if price.is_positive() => price,
        _ => mrp,
    }
}

/// Final bill total: the manual override when supplied (validated upstream),
/// otherwise the discounted subtotal.
#[inline]
pub fn compute_total(subtotal: Money, discount: Rate, manual_final: Option<Money>) -> Money {
    manual_final.unwrap_or_else(|| subtotal.apply_discount(discount))
}

// =============================================================================
// Payment Breakdown
// =============================================================================

/// Validated payment split for a new bill.
///
/// `credit` is the portion left outstanding at creation. Cash and online
/// are what was actually collected at the register and become the bill's
/// automatic point-of-sale receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    pub cash: Money,
    pub online: Money,
    pub credit: Money,
}

impl PaymentBreakdown {
    /// Amount collected now (cash + online).
    #[inline]
    pub fn paid_now(&self) -> Money {
        self.cash + self.online
    }
}

/// Validates the payment amounts for a bill against its final total.
///
/// ## Rules (exact paise equality, no tolerance)
/// - `cash`:   payment_cash must equal the total
/// - `online`: payment_online must equal the total
/// - `credit`: nothing may be collected now
/// - `split`:  cash + online + credit must equal the total
pub fn validate_payment_breakdown(
    mode: PaymentMode,
    cash: Money,
    online: Money,
    credit: Money,
    total: Money,
) -> Result<PaymentBreakdown, ValidationError> {
    for (field, amount) in [("payment_cash", cash), ("payment_online", online), ("payment_credit", credit)] {
        if amount.is_negative() {
            return Err(ValidationError::NegativeAmount { field: field.to_string() });
        }
    }

    match mode {
        PaymentMode::Cash => {
            if cash != total {
                return Err(ValidationError::CashMustEqualTotal);
            }
            Ok(PaymentBreakdown { cash: total, online: Money::zero(), credit: Money::zero() })
        }
        PaymentMode::Online => {
            if online != total {
                return Err(ValidationError::OnlineMustEqualTotal);
            }
            Ok(PaymentBreakdown { cash: Money::zero(), online: total, credit: Money::zero() })
        }
        PaymentMode::Credit => {
            if !cash.is_zero() || !online.is_zero() {
                return Err(ValidationError::CreditTakesNoPayment);
            }
            Ok(PaymentBreakdown { cash: Money::zero(), online: Money::zero(), credit: total })
        }
        PaymentMode::Split => {
            if cash + online + credit != total {
                return Err(ValidationError::SplitMustEqualTotal);
            }
            Ok(PaymentBreakdown { cash, online, credit })
        }
    }
}

// =============================================================================
// Settlement Rule
// =============================================================================

/// Outcome of evaluating the settlement state machine.
///
/// `status == Paid` is the only state that stamps `paid_at`; the other two
/// clear it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub status: PaymentStatus,
    pub is_credit: bool,
}

/// Evaluates payment status from the sum of ALL receipts for a bill.
///
/// ```text
/// total_paid ≤ 0          → UNPAID   (is_credit = true,  paid_at = None)
/// 0 < total_paid < total  → PARTIAL  (is_credit = true,  paid_at = None)
/// total_paid ≥ total      → PAID     (is_credit = false, paid_at = now)
/// ```
///
/// Amounts are integer paise, so no epsilon is needed at the PARTIAL/PAID
/// boundary.
pub fn settle(total_paid: Money, total_amount: Money) -> Settlement {
    if total_paid.paise() <= 0 {
        Settlement { status: PaymentStatus::Unpaid, is_credit: true }
    } else if total_paid < total_amount {
        Settlement { status: PaymentStatus::Partial, is_credit: true }
    } else {
        Settlement { status: PaymentStatus::Paid, is_credit: false }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
