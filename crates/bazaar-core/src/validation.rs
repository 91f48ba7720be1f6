//! # Validation Module
//!
//! Input validation for Bazaar POS. Every rule runs before any mutation;
//! a failure here must leave no side effects.
//!
//! ## Usage
//! ```rust
//! use bazaar_core::validation::{validate_item_name, validate_quantity};
//!
//! validate_item_name("Dolo 650").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::money::{Money, Rate};
use crate::MAX_LINE_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an item (batch) name: non-empty, at most 200 characters.
pub fn validate_item_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required { field: "name".to_string() });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong { field: "name".to_string(), max: 200 });
    }

    Ok(())
}

/// Validates a brand. Blank is allowed (brand-less groups) but an overlong
/// value is not.
pub fn validate_brand(brand: Option<&str>) -> ValidationResult<()> {
    if let Some(brand) = brand {
        if brand.len() > 200 {
            return Err(ValidationError::TooLong { field: "brand".to_string(), max: 200 });
        }
    }
    Ok(())
}

/// Validates an expiry date: `None`/blank, or `YYYY-MM-DD`.
pub fn validate_expiry_date(expiry: Option<&str>) -> ValidationResult<()> {
    let Some(expiry) = expiry else { return Ok(()) };
    let expiry = expiry.trim();
    if expiry.is_empty() {
        return Ok(());
    }

    if chrono::NaiveDate::parse_from_str(expiry, "%Y-%m-%d").is_err() {
        return Err(ValidationError::InvalidFormat {
            field: "expiry_date".to_string(),
            reason: "must be YYYY-MM-DD".to_string(),
        });
    }

    Ok(())
}

/// Validates a free-text search query. Can be empty; at most 100 chars.
///
/// ## Returns
/// The trimmed query string.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong { field: "query".to_string(), max: 100 });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a sale/return line quantity: positive, capped.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive { field: "quantity".to_string() });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price (MRP): must be > 0.
pub fn validate_mrp(mrp: Money) -> ValidationResult<()> {
    if !mrp.is_positive() {
        return Err(ValidationError::MustBePositive { field: "mrp".to_string() });
    }
    Ok(())
}

/// Validates an opening/absolute stock value: must be ≥ 0.
pub fn validate_stock(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::NegativeAmount { field: "stock".to_string() });
    }
    Ok(())
}

/// Validates a discount percentage and converts it to basis points.
pub fn validate_discount_percent(pct: f64) -> ValidationResult<Rate> {
    if !(0.0..=100.0).contains(&pct) {
        return Err(ValidationError::DiscountOutOfRange);
    }
    Ok(Rate::from_percent(pct))
}

/// Validates a manual final amount: `None`, or ≥ 0.
pub fn validate_final_amount(final_amount: Option<Money>) -> ValidationResult<Option<Money>> {
    if let Some(amount) = final_amount {
        if amount.is_negative() {
            return Err(ValidationError::NegativeFinalAmount);
        }
    }
    Ok(final_amount)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_item_name() {
        assert!(validate_item_name("Dolo 650").is_ok());
        assert!(validate_item_name("").is_err());
        assert!(validate_item_name("   ").is_err());
        assert!(validate_item_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_expiry_date() {
        assert!(validate_expiry_date(None).is_ok());
        assert!(validate_expiry_date(Some("")).is_ok());
        assert!(validate_expiry_date(Some("2027-03-31")).is_ok());
        assert!(validate_expiry_date(Some("31-03-2027")).is_err());
        assert!(validate_expiry_date(Some("2027-13-01")).is_err());
        assert!(validate_expiry_date(Some("soon")).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(9999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(10000).is_err());
    }

    #[test]
    fn test_validate_mrp() {
        assert!(validate_mrp(Money::from_paise(1)).is_ok());
        assert!(validate_mrp(Money::zero()).is_err());
        assert!(validate_mrp(Money::from_paise(-100)).is_err());
    }

    #[test]
    fn test_validate_discount_percent() {
        assert_eq!(validate_discount_percent(0.0).unwrap().bps(), 0);
        assert_eq!(validate_discount_percent(12.5).unwrap().bps(), 1250);
        assert_eq!(validate_discount_percent(100.0).unwrap().bps(), 10000);
        assert!(validate_discount_percent(-0.1).is_err());
        assert!(validate_discount_percent(100.1).is_err());
    }

    #[test]
    fn test_validate_final_amount() {
        assert!(validate_final_amount(None).is_ok());
        assert!(validate_final_amount(Some(Money::zero())).is_ok());
        assert!(validate_final_amount(Some(Money::from_paise(-1))).is_err());
    }

    #[test]
    fn test_validate_search_query() {
        assert_eq!(validate_search_query("  dolo  ").unwrap(), "dolo");
        assert!(validate_search_query(&"q".repeat(150)).is_err());
    }
}
