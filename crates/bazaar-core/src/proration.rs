//! # Return Proration
//!
//! Computes discount/tax-adjusted refund values for returned lines.
//!
//! ## The Problem
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  A bill's stored total may be a MANUAL OVERRIDE, not the number     │
//! │  its discount would produce:                                        │
//! │                                                                     │
//! │    subtotal ₹1000, discount 10%  → theoretical total ₹900           │
//! │    operator billed               → final total       ₹850           │
//! │                                                                     │
//! │  Refunding a line at its discounted MRP would hand back more than   │
//! │  the customer ever paid. Every refund line is therefore scaled by   │
//! │                                                                     │
//! │    factor = final_total / theoretical_total   (here 850/900)        │
//! │                                                                     │
//! │  so a ₹200 line refunds ₹200 × 0.9 × 850/900 = ₹170.               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The factor is kept as an exact paise ratio, never a float. A refund line
//! is one i128 multiply chain with a single rounding at the end.

use serde::{Deserialize, Serialize};

use crate::money::{div_round_half, Money, Rate};

// =============================================================================
// Proration Factor
// =============================================================================

/// Ratio between a bill's stored total and its recomputed theoretical
/// total, as an exact paise fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrationFactor {
    num: i64,
    den: i64,
}

impl ProrationFactor {
    /// The neutral factor (no source bill, or a degenerate theoretical
    /// total).
    #[inline]
    pub const fn unity() -> Self {
        ProrationFactor { num: 1, den: 1 }
    }

    /// Builds the factor for a bill.
    ///
    /// Guards the divide-by-zero case: a theoretical total of zero or less
    /// yields the neutral factor.
    pub fn for_bill(subtotal: Money, discount: Rate, tax: Rate, final_total: Money) -> Self {
        let theoretical = theoretical_total(subtotal, discount, tax);
        if theoretical.paise() <= 0 {
            return ProrationFactor::unity();
        }
        ProrationFactor { num: final_total.paise(), den: theoretical.paise() }
    }

    #[inline]
    pub fn is_unity(&self) -> bool {
        self.num == self.den
    }
}

impl Default for ProrationFactor {
    fn default() -> Self {
        ProrationFactor::unity()
    }
}

/// The total a bill's discount and tax would have produced:
/// `round(subtotal × (10000 − d) × (10000 + t) / 10000²)`, one rounding.
pub fn theoretical_total(subtotal: Money, discount: Rate, tax: Rate) -> Money {
    let kept = (10_000 - discount.bps() as i128) * (10_000 + tax.bps() as i128);
    Money::from_paise(div_round_half(subtotal.paise() as i128 * kept, 10_000 * 10_000))
}

/// Refund value of one returned line.
///
/// `round(mrp × qty × (10000 − d) × (10000 + t) × F_num / (10000² × F_den))`
/// computed entirely in i128 with a single division, so multi-line returns
/// cannot accumulate per-step rounding drift.
pub fn prorated_line_total(
    mrp: Money,
    quantity: i64,
    discount: Rate,
    tax: Rate,
    factor: ProrationFactor,
) -> Money {
    let base = mrp.paise() as i128 * quantity as i128;
    let kept = (10_000 - discount.bps() as i128) * (10_000 + tax.bps() as i128);
    let n = base * kept * factor.num as i128;
    let d = 10_000i128 * 10_000 * factor.den as i128;
    Money::from_paise(div_round_half(n, d))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theoretical_total() {
        // ₹1000 at 10% discount, no tax → ₹900
        let t = theoretical_total(Money::from_rupees(1000), Rate::from_bps(1000), Rate::zero());
        assert_eq!(t, Money::from_rupees(900));

        // ₹1000 at 10% discount, 12% tax → 900 × 1.12 = ₹1008
        let t = theoretical_total(
            Money::from_rupees(1000),
            Rate::from_bps(1000),
            Rate::from_bps(1200),
        );
        assert_eq!(t, Money::from_rupees(1008));
    }

    #[test]
    fn test_factor_unity_without_override() {
        let f = ProrationFactor::for_bill(
            Money::from_rupees(1000),
            Rate::from_bps(1000),
            Rate::zero(),
            Money::from_rupees(900),
        );
        assert!(f.is_unity() || f == ProrationFactor { num: 90000, den: 90000 });
    }

    #[test]
    fn test_factor_guards_zero_theoretical() {
        let f = ProrationFactor::for_bill(
            Money::zero(),
            Rate::zero(),
            Rate::zero(),
            Money::from_rupees(100),
        );
        assert_eq!(f, ProrationFactor::unity());
    }

    #[test]
    fn test_prorated_line_with_manual_override() {
        // Bill: subtotal ₹1000, discount 10%, manually billed ₹850.
        // Returned line: mrp ₹100 × 2 → 200 × 0.9 × 850/900 = ₹170.
        let factor = ProrationFactor::for_bill(
            Money::from_rupees(1000),
            Rate::from_bps(1000),
            Rate::zero(),
            Money::from_rupees(850),
        );
        let refund = prorated_line_total(
            Money::from_rupees(100),
            2,
            Rate::from_bps(1000),
            Rate::zero(),
            factor,
        );
        assert_eq!(refund, Money::from_rupees(170));
    }

    #[test]
    fn test_prorated_line_no_bill_is_plain_mrp() {
        let refund = prorated_line_total(
            Money::from_paise(9950),
            3,
            Rate::zero(),
            Rate::zero(),
            ProrationFactor::unity(),
        );
        assert_eq!(refund.paise(), 29850);
    }

    #[test]
    fn test_single_rounding_beats_chained_rounding() {
        // mrp ₹33.33 × 1 at 15% discount with factor 997/1000:
        // chained per-step rounding loses a paisa against the exact chain.
        let factor = ProrationFactor { num: 997, den: 1000 };
        let exact = prorated_line_total(
            Money::from_paise(3333),
            1,
            Rate::from_bps(1500),
            Rate::zero(),
            factor,
        );
        // 3333 × 0.85 × 0.997 = 2824.55... → 2825
        assert_eq!(exact.paise(), 2825);
    }
}
