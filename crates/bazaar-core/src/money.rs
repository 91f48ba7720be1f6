//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                         │
//! │                                                                     │
//! │  In floating point:                                                 │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                       │
//! │                                                                     │
//! │  A proration chain like                                             │
//! │    base × (1 − d/100) × (1 + t/100) × factor                        │
//! │  drifts a paisa at a time when every step is a rounded float.       │
//! │                                                                     │
//! │  OUR SOLUTION: Integer Paise                                        │
//! │    Every amount is an i64 count of paise. Derived amounts are       │
//! │    computed in i128 and rounded ONCE, at the end of the chain.      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bazaar_core::money::{Money, Rate};
//!
//! // Create from paise (preferred)
//! let price = Money::from_paise(10050); // ₹100.50
//!
//! // Arithmetic operations
//! let line = price * 3;                          // ₹301.50
//! let total = line.apply_discount(Rate::from_bps(1000)); // 10% off
//! assert_eq!(total.paise(), 27135);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Rounding
// =============================================================================

/// Divides `n / d` rounding half away from zero. `d` must be positive.
///
/// All derived money amounts funnel through this single function so the
/// rounding behavior is uniform across billing, settlement, and proration.
pub(crate) fn div_round_half(n: i128, d: i128) -> i64 {
    debug_assert!(d > 0);
    let q = if n >= 0 { (n + d / 2) / d } else { (n - d / 2) / d };
    q as i64
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in paise (the smallest currency unit).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds and exchange nets
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paise.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::money::Money;
    ///
    /// let price = Money::from_paise(10099); // ₹100.99
    /// assert_eq!(price.paise(), 10099);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Money(paise)
    }

    /// Creates a Money value from whole rupees.
    #[inline]
    pub const fn from_rupees(rupees: i64) -> Self {
        Money(rupees * 100)
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee portion.
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the paise portion (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::money::Money;
    ///
    /// let unit = Money::from_paise(299);
    /// assert_eq!(unit.multiply_quantity(3).paise(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Applies a percentage discount and returns the remaining amount.
    ///
    /// Computes `round(amount × (10000 − bps) / 10000)` in one step, which
    /// matches rounding the discounted total rather than rounding the
    /// discount amount first.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::money::{Money, Rate};
    ///
    /// let subtotal = Money::from_paise(100000); // ₹1000.00
    /// let total = subtotal.apply_discount(Rate::from_bps(1000)); // 10% off
    /// assert_eq!(total.paise(), 90000); // ₹900.00
    /// ```
    pub fn apply_discount(&self, discount: Rate) -> Money {
        let kept = 10_000 - discount.bps() as i128;
        Money(div_round_half(self.0 as i128 * kept, 10_000))
    }

    /// Adds a percentage tax and returns the gross amount.
    ///
    /// `round(amount × (10000 + bps) / 10000)`.
    pub fn add_tax(&self, tax: Rate) -> Money {
        let gross = 10_000 + tax.bps() as i128;
        Money(div_round_half(self.0 as i128 * gross, 10_000))
    }
}

// =============================================================================
// Rate Type
// =============================================================================

/// A percentage rate in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000. A float like `12.5` percent becomes the
/// exact integer 1250, so discount and tax math never touches floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate(u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a percentage.
    ///
    /// Rounds to the nearest basis point; `12.5` becomes 1250 bps. Range
    /// checking happens in [`crate::validation::validate_discount_percent`].
    pub fn from_percent(pct: f64) -> Self {
        Rate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percent(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for logs and error messages. Callers format for UI display.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.rupees().abs(), self.paise_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_paise() {
        let money = Money::from_paise(10099);
        assert_eq!(money.paise(), 10099);
        assert_eq!(money.rupees(), 100);
        assert_eq!(money.paise_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_paise(10099)), "₹100.99");
        assert_eq!(format!("{}", Money::from_paise(500)), "₹5.00");
        assert_eq!(format!("{}", Money::from_paise(-550)), "-₹5.50");
        assert_eq!(format!("{}", Money::from_paise(0)), "₹0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_paise(1000);
        let b = Money::from_paise(500);

        assert_eq!((a + b).paise(), 1500);
        assert_eq!((a - b).paise(), 500);
        assert_eq!((a * 3).paise(), 3000);
    }

    #[test]
    fn test_discount_exact() {
        // ₹1000.00 at 10% = ₹900.00 exactly
        let subtotal = Money::from_paise(100000);
        assert_eq!(subtotal.apply_discount(Rate::from_bps(1000)).paise(), 90000);
    }

    #[test]
    fn test_discount_rounding() {
        // ₹0.99 at 33.33% off keeps 66.67% = 66.0033 paise → 66
        let amount = Money::from_paise(99);
        assert_eq!(amount.apply_discount(Rate::from_bps(3333)).paise(), 66);

        // ₹1.25 at 50% = 62.5 paise → rounds half up to 63
        let amount = Money::from_paise(125);
        assert_eq!(amount.apply_discount(Rate::from_bps(5000)).paise(), 63);
    }

    #[test]
    fn test_add_tax() {
        // ₹100.00 at 12% tax = ₹112.00
        let amount = Money::from_paise(10000);
        assert_eq!(amount.add_tax(Rate::from_bps(1200)).paise(), 11200);
    }

    #[test]
    fn test_rate_from_percent() {
        assert_eq!(Rate::from_percent(10.0).bps(), 1000);
        assert_eq!(Rate::from_percent(12.5).bps(), 1250);
        assert!((Rate::from_bps(825).percent() - 8.25).abs() < 0.001);
    }

    #[test]
    fn test_div_round_half_negative() {
        // Symmetric rounding: -62.5 paise rounds away from zero
        assert_eq!(div_round_half(-125, 2), -63);
        assert_eq!(div_round_half(125, 2), 63);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_paise(100).is_positive());
        assert!(Money::from_paise(-100).is_negative());
    }

    #[test]
    fn test_serde_round_trip() {
        let m = Money::from_paise(12345);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "12345");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
