//! # Visibility Engine
//!
//! Applies the pure batch-visibility rule (`bazaar_core::visibility`) to a
//! (name, brand) group inside the caller's transaction.
//!
//! Called after every mutation that can change a batch's stock, name, or
//! brand. When a patch moves a batch to a different group, the caller must
//! reconcile the OLD group too, or it can be left with every row hidden.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::item;
use bazaar_core::visibility::{reconcile, BatchState};

/// Re-evaluates archive flags for one group. Takes normalized
/// (lowercased, trimmed) name/brand keys, as produced by
/// [`bazaar_core::types::Item::group_key`].
///
/// Returns the number of flags flipped. Idempotent.
pub async fn reconcile_group(
    conn: &mut SqliteConnection,
    name_norm: &str,
    brand_norm: &str,
    now: DateTime<Utc>,
) -> DbResult<usize> {
    let members = item::group_members(conn, name_norm, brand_norm).await?;

    let states: Vec<BatchState> = members
        .iter()
        .map(|m| BatchState {
            id: m.id,
            stock: m.stock,
            expiry_date: m.expiry_date.clone(),
            is_archived: m.is_archived,
        })
        .collect();

    let changes = reconcile(&states);
    for change in &changes {
        item::set_archived(conn, change.id, change.archive, now).await?;
    }

    if !changes.is_empty() {
        debug!(
            name = name_norm,
            brand = brand_norm,
            flips = changes.len(),
            "Group visibility reconciled"
        );
    }

    Ok(changes.len())
}
