//! # Batch Visibility Rule
//!
//! Decides which batches of a (name, brand) group are shown to the user.
//!
//! ## The Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Group = all batches sharing a case-insensitive (name, brand) key   │
//! │                                                                     │
//! │  ┌── any batch has stock > 0 ──────────────────────────────────┐    │
//! │  │  visible  = exactly the in-stock batches                    │    │
//! │  │  hidden   = every zero-stock batch                          │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                                                                     │
//! │  ┌── ALL batches have stock == 0 ──────────────────────────────┐    │
//! │  │  visible  = ONE batch only:                                 │    │
//! │  │             earliest non-blank expiry_date,                 │    │
//! │  │             ties broken by lowest id,                       │    │
//! │  │             blank expiry sorted last                        │    │
//! │  │  hidden   = all others                                      │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                                                                     │
//! │  A sold-out product group is never fully invisible, while the       │
//! │  duplicate zero-stock rows created by restocking at different       │
//! │  prices/expiries collapse to a single visible row.                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `reconcile` is a pure function of the group's member batches and is
//! idempotent; the storage layer re-runs it after every mutation that can
//! change a batch's stock, name, or brand. When the grouping key itself
//! changes, the batch's PREVIOUS group must be reconciled too, or it can be
//! left with every row hidden.

use serde::{Deserialize, Serialize};

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// The slice of a batch the visibility rule needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchState {
    pub id: i64,
    pub stock: i64,
    pub expiry_date: Option<String>,
    pub is_archived: bool,
}

/// A flag flip the storage layer must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityChange {
    pub id: i64,
    /// New value for `is_archived`.
    pub archive: bool,
}

// =============================================================================
// Reconcile
// =============================================================================

/// Computes the archive-flag changes needed to make a group consistent.
///
/// Returns only the batches whose flag must flip; an already-consistent
/// group yields an empty vec (idempotence).
pub fn reconcile(group: &[BatchState]) -> Vec<VisibilityChange> {
    if group.is_empty() {
        return Vec::new();
    }

    let any_in_stock = group.iter().any(|b| b.stock > 0);

    let mut changes = Vec::new();

    if any_in_stock {
        for batch in group {
            let should_archive = batch.stock <= 0;
            if batch.is_archived != should_archive {
                changes.push(VisibilityChange { id: batch.id, archive: should_archive });
            }
        }
        return changes;
    }

    // All sold out: keep exactly one row visible.
    let keeper = group
        .iter()
        .min_by_key(|b| expiry_sort_key(b))
        .map(|b| b.id)
        .unwrap_or_default();

    for batch in group {
        let should_archive = batch.id != keeper;
        if batch.is_archived != should_archive {
            changes.push(VisibilityChange { id: batch.id, archive: should_archive });
        }
    }
    changes
}

/// Sort key for the all-sold-out keeper: (blank-expiry-last, expiry asc,
/// id asc). `YYYY-MM-DD` text compares in date order.
fn expiry_sort_key(batch: &BatchState) -> (bool, String, i64) {
    let expiry = batch.expiry_date.as_deref().map(str::trim).unwrap_or("");
    (expiry.is_empty(), expiry.to_string(), batch.id)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(id: i64, stock: i64, expiry: Option<&str>, archived: bool) -> BatchState {
        BatchState { id, stock, expiry_date: expiry.map(String::from), is_archived: archived }
    }

    #[test]
    fn test_in_stock_batches_visible_zero_stock_hidden() {
        // Stocks [0, 0, 5]: only the stock-5 batch stays visible.
        let group = vec![
            batch(1, 0, Some("2026-01-01"), false),
            batch(2, 0, Some("2025-06-01"), false),
            batch(3, 5, Some("2027-01-01"), false),
        ];
        let mut changes = reconcile(&group);
        changes.sort_by_key(|c| c.id);
        assert_eq!(
            changes,
            vec![
                VisibilityChange { id: 1, archive: true },
                VisibilityChange { id: 2, archive: true },
            ]
        );
    }

    #[test]
    fn test_all_sold_out_keeps_earliest_expiry() {
        // All zero: the earliest non-blank expiry (id 2) becomes the single
        // visible row.
        let group = vec![
            batch(1, 0, Some("2026-01-01"), true),
            batch(2, 0, Some("2025-06-01"), true),
            batch(3, 0, Some("2027-01-01"), false),
        ];
        let mut changes = reconcile(&group);
        changes.sort_by_key(|c| c.id);
        assert_eq!(
            changes,
            vec![
                VisibilityChange { id: 2, archive: false },
                VisibilityChange { id: 3, archive: true },
            ]
        );
    }

    #[test]
    fn test_blank_expiry_sorts_last() {
        let group = vec![
            batch(1, 0, None, false),
            batch(2, 0, Some("2030-01-01"), true),
        ];
        let mut changes = reconcile(&group);
        changes.sort_by_key(|c| c.id);
        assert_eq!(
            changes,
            vec![
                VisibilityChange { id: 1, archive: true },
                VisibilityChange { id: 2, archive: false },
            ]
        );
    }

    #[test]
    fn test_all_blank_expiry_ties_break_by_lowest_id() {
        let group = vec![
            batch(7, 0, None, true),
            batch(3, 0, Some("  "), true),
            batch(9, 0, None, false),
        ];
        let mut changes = reconcile(&group);
        changes.sort_by_key(|c| c.id);
        assert_eq!(
            changes,
            vec![
                VisibilityChange { id: 3, archive: false },
                VisibilityChange { id: 9, archive: true },
            ]
        );
    }

    #[test]
    fn test_idempotent_on_consistent_group() {
        let group = vec![
            batch(1, 0, Some("2025-06-01"), true),
            batch(2, 4, None, false),
        ];
        assert!(reconcile(&group).is_empty());
    }

    #[test]
    fn test_single_batch_group_never_hidden() {
        let group = vec![batch(1, 0, None, true)];
        assert_eq!(reconcile(&group), vec![VisibilityChange { id: 1, archive: false }]);
    }

    #[test]
    fn test_empty_group() {
        assert!(reconcile(&[]).is_empty());
    }
}
