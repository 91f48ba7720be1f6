//! # Ledger Engine
//!
//! Read-side of the stock ledger: newest-first movement pages annotated
//! with reconstructed running balances, for a single batch or a whole
//! (name, brand) group.
//!
//! Anchor stock and movements are read inside one transaction so the
//! balance trail is snapshot-consistent with current stock (§ the write
//! side keeps `stock == SUM(delta)` at every commit).

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::repository::item;
use crate::repository::ledger::{self, LedgerWindow};
use crate::pool::Database;
use bazaar_core::{normalize_key, MovementReason};

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// Filter for ledger pages. Dates are `YYYY-MM-DD`, inclusive; they and
/// the reason filter narrow the rows shown, never the balance math.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerQuery {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub reason: Option<MovementReason>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for LedgerQuery {
    fn default() -> Self {
        LedgerQuery { from_date: None, to_date: None, reason: None, limit: 100, offset: 0 }
    }
}

/// One movement with its running balance on both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedMovement {
    pub id: i64,
    pub item_id: i64,
    pub ts: DateTime<Utc>,
    pub delta: i64,
    pub reason: MovementReason,
    pub ref_type: String,
    pub ref_id: Option<i64>,
    pub note: Option<String>,
    pub actor: Option<String>,
    pub balance_before: i64,
    pub balance_after: i64,
}

/// A finite, restartable page of annotated movements, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerPage {
    pub entries: Vec<AnnotatedMovement>,
    /// Offset of the next page, `None` when this was the last one.
    pub next_offset: Option<i64>,
}

// =============================================================================
// Operations
// =============================================================================

/// Movement history for one batch, anchored at its current stock.
pub async fn item_ledger(db: &Database, item_id: i64, q: LedgerQuery) -> EngineResult<LedgerPage> {
    let limit = q.limit.clamp(1, 500);
    let offset = q.offset.max(0);

    let mut tx = db.begin().await?;

    let batch = item::get(&mut tx, item_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Item", item_id))?;

    let rows = ledger::annotated_for_item(
        &mut tx,
        item_id,
        batch.stock,
        &LedgerWindow {
            from_date: q.from_date.as_deref(),
            to_date: q.to_date.as_deref(),
            reason: q.reason,
            limit: limit + 1,
            offset,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(build_page(rows, limit, offset))
}

/// Movement history merged across every batch of a (name, brand) group,
/// anchored at the group's summed current stock.
pub async fn group_ledger(
    db: &Database,
    name: &str,
    brand: Option<&str>,
    q: LedgerQuery,
) -> EngineResult<LedgerPage> {
    let limit = q.limit.clamp(1, 500);
    let offset = q.offset.max(0);

    let name_norm = normalize_key(name);
    let brand_norm = normalize_key(brand.unwrap_or(""));

    let mut tx = db.begin().await?;

    let members = item::group_members(&mut tx, &name_norm, &brand_norm).await?;
    if members.is_empty() {
        return Err(EngineError::not_found("Group", format!("{name_norm}/{brand_norm}")));
    }
    let anchor: i64 = members.iter().map(|m| m.stock).sum();

    let rows = ledger::annotated_for_group(
        &mut tx,
        &name_norm,
        &brand_norm,
        anchor,
        &LedgerWindow {
            from_date: q.from_date.as_deref(),
            to_date: q.to_date.as_deref(),
            reason: q.reason,
            limit: limit + 1,
            offset,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(build_page(rows, limit, offset))
}

fn build_page(rows: Vec<ledger::LedgerRow>, limit: i64, offset: i64) -> LedgerPage {
    let has_more = rows.len() as i64 > limit;
    let entries = rows
        .into_iter()
        .take(limit as usize)
        .map(|r| AnnotatedMovement {
            id: r.id,
            item_id: r.item_id,
            ts: r.ts,
            delta: r.delta,
            reason: r.reason,
            ref_type: r.ref_type,
            ref_id: r.ref_id,
            note: r.note,
            actor: r.actor,
            balance_before: r.balance_after - r.delta,
            balance_after: r.balance_after,
        })
        .collect();

    LedgerPage { entries, next_offset: has_more.then_some(offset + limit) }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::inventory::{adjust_stock, create_batch, NewBatch};
    use crate::engine::testutil::test_db;
    use bazaar_core::Money;

    async fn seeded_item(db: &Database, name: &str, mrp: i64, stock: i64) -> i64 {
        create_batch(
            db,
            NewBatch {
                name: name.to_string(),
                brand: None,
                expiry_date: None,
                mrp: Money::from_paise(mrp),
                opening_stock: stock,
                rack_number: None,
            },
        )
        .await
        .unwrap()
        .item
        .id
    }

    #[tokio::test]
    async fn test_balance_trail_reconstruction() {
        // Create 20, adjust -20, adjust +5: newest-first trail must read
        // [0,5], [20,0], [0,20].
        let db = test_db().await;
        let id = seeded_item(&db, "Dolo 650", 3200, 20).await;
        adjust_stock(&db, id, -20, None).await.unwrap();
        adjust_stock(&db, id, 5, None).await.unwrap();

        let page = item_ledger(&db, id, LedgerQuery::default()).await.unwrap();
        assert_eq!(page.entries.len(), 3);
        assert!(page.next_offset.is_none());

        let trail: Vec<(i64, i64)> =
            page.entries.iter().map(|e| (e.balance_before, e.balance_after)).collect();
        assert_eq!(trail, vec![(0, 5), (20, 0), (0, 20)]);

        assert_eq!(page.entries[0].reason, MovementReason::Adjust);
        assert_eq!(page.entries[2].reason, MovementReason::Opening);
    }

    #[tokio::test]
    async fn test_reason_filter_keeps_true_balances() {
        let db = test_db().await;
        let id = seeded_item(&db, "Dolo 650", 3200, 20).await;
        adjust_stock(&db, id, -20, None).await.unwrap();
        adjust_stock(&db, id, 5, None).await.unwrap();

        let page = item_ledger(
            &db,
            id,
            LedgerQuery { reason: Some(MovementReason::Opening), ..Default::default() },
        )
        .await
        .unwrap();

        // Only the opening row shows, but its balances come from the full
        // stream: 0 → 20, not 0 → current.
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].balance_before, 0);
        assert_eq!(page.entries[0].balance_after, 20);
    }

    #[tokio::test]
    async fn test_pagination_look_ahead() {
        let db = test_db().await;
        let id = seeded_item(&db, "Dolo 650", 3200, 10).await;
        for _ in 0..4 {
            adjust_stock(&db, id, 1, None).await.unwrap();
        }

        let page = item_ledger(&db, id, LedgerQuery { limit: 2, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.next_offset, Some(2));

        let page2 = item_ledger(&db, id, LedgerQuery { limit: 2, offset: 2, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page2.entries.len(), 2);
        assert_eq!(page2.next_offset, Some(4));

        let page3 = item_ledger(&db, id, LedgerQuery { limit: 2, offset: 4, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page3.entries.len(), 1);
        assert!(page3.next_offset.is_none());
    }

    #[tokio::test]
    async fn test_group_ledger_merges_batches() {
        let db = test_db().await;
        let a = seeded_item(&db, "Dolo 650", 3200, 10).await;
        let b = create_batch(
            &db,
            NewBatch {
                name: "DOLO 650".to_string(),
                brand: None,
                expiry_date: None,
                mrp: Money::from_paise(3500),
                opening_stock: 4,
                rack_number: None,
            },
        )
        .await
        .unwrap()
        .item
        .id;
        assert_ne!(a, b);

        adjust_stock(&db, a, -3, None).await.unwrap();

        let page = group_ledger(&db, "Dolo 650", None, LedgerQuery::default()).await.unwrap();
        // Three movements across the group; anchor = 7 + 4 = 11.
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.entries[0].balance_after, 11);

        let trail: Vec<(i64, i64)> =
            page.entries.iter().map(|e| (e.balance_before, e.balance_after)).collect();
        assert_eq!(trail, vec![(14, 11), (10, 14), (0, 10)]);
    }

    #[tokio::test]
    async fn test_unknown_item_and_group() {
        let db = test_db().await;
        assert!(matches!(
            item_ledger(&db, 999, LedgerQuery::default()).await,
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            group_ledger(&db, "nothing", None, LedgerQuery::default()).await,
            Err(EngineError::NotFound { .. })
        ));
    }
}
