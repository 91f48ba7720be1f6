//! # Ledger Repository
//!
//! Append and query operations for the `stock_movements` table.
//!
//! ## Balance Reconstruction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Only CURRENT stock is persisted, so balances are rebuilt BACKWARD  │
//! │  from it:                                                           │
//! │                                                                     │
//! │    running = current_stock                                          │
//! │    for each movement, newest first (id descending):                 │
//! │        balance_after  = running                                     │
//! │        balance_before = balance_after - delta                       │
//! │        running        = balance_before                              │
//! │                                                                     │
//! │  In SQL that is a window sum of the STRICTLY NEWER deltas:          │
//! │                                                                     │
//! │    balance_after = anchor - SUM(delta) OVER (                       │
//! │        ORDER BY id DESC                                             │
//! │        ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING)            │
//! │                                                                     │
//! │  The window runs over the UNFILTERED movement stream; date/reason   │
//! │  filters apply outside it, so a filtered page still shows true      │
//! │  balances. Correct only when anchor and movements are read in the   │
//! │  same transaction snapshot.                                         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::DbResult;
use bazaar_core::MovementReason;

/// Append payload. `ref_type`/`ref_id` point at the causing record:
/// ("BILL", bill id), ("RETURN", return id), ("EXCHANGE", return/bill id),
/// ("ITEM", item id) for inventory actions, ("MANUAL", None) for ad-hoc
/// adjustments.
#[derive(Debug, Clone)]
pub struct NewMovement<'a> {
    pub item_id: i64,
    pub delta: i64,
    pub reason: MovementReason,
    pub ref_type: &'a str,
    pub ref_id: Option<i64>,
    pub note: Option<String>,
    pub actor: Option<String>,
}

/// Appends one ledger row. Must run in the same transaction as the stock
/// mutation it records; it fails only if that transaction fails.
pub async fn append(
    conn: &mut SqliteConnection,
    m: &NewMovement<'_>,
    ts: DateTime<Utc>,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO stock_movements (item_id, ts, delta, reason, ref_type, ref_id, note, actor)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(m.item_id)
    .bind(ts)
    .bind(m.delta)
    .bind(m.reason)
    .bind(m.ref_type)
    .bind(m.ref_id)
    .bind(&m.note)
    .bind(&m.actor)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// A movement with its reconstructed running balance.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerRow {
    pub id: i64,
    pub item_id: i64,
    pub ts: DateTime<Utc>,
    pub delta: i64,
    pub reason: MovementReason,
    pub ref_type: String,
    pub ref_id: Option<i64>,
    pub note: Option<String>,
    pub actor: Option<String>,
    pub balance_after: i64,
}

/// Filter window for ledger pages. Dates are `YYYY-MM-DD`, inclusive.
#[derive(Debug, Clone, Default)]
pub struct LedgerWindow<'a> {
    pub from_date: Option<&'a str>,
    pub to_date: Option<&'a str>,
    pub reason: Option<MovementReason>,
    pub limit: i64,
    pub offset: i64,
}

/// Newest-first annotated movements for one item. `anchor_stock` is the
/// item's current stock read in the SAME transaction.
pub async fn annotated_for_item(
    conn: &mut SqliteConnection,
    item_id: i64,
    anchor_stock: i64,
    w: &LedgerWindow<'_>,
) -> DbResult<Vec<LedgerRow>> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT * FROM (
            SELECT id, item_id, ts, delta, reason, ref_type, ref_id, note, actor,
                   ?2 - COALESCE(SUM(delta) OVER (
                       ORDER BY id DESC
                       ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING
                   ), 0) AS balance_after
            FROM stock_movements
            WHERE item_id = ?1
        )
        WHERE (?3 IS NULL OR substr(ts, 1, 10) >= ?3)
          AND (?4 IS NULL OR substr(ts, 1, 10) <= ?4)
          AND (?5 IS NULL OR reason = ?5)
        ORDER BY id DESC
        LIMIT ?6 OFFSET ?7
        "#,
    )
    .bind(item_id)
    .bind(anchor_stock)
    .bind(w.from_date)
    .bind(w.to_date)
    .bind(w.reason)
    .bind(w.limit)
    .bind(w.offset)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Newest-first annotated movements across every batch of a (name, brand)
/// group, anchored at the group's summed current stock.
pub async fn annotated_for_group(
    conn: &mut SqliteConnection,
    name_norm: &str,
    brand_norm: &str,
    anchor_stock: i64,
    w: &LedgerWindow<'_>,
) -> DbResult<Vec<LedgerRow>> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT * FROM (
            SELECT id, item_id, ts, delta, reason, ref_type, ref_id, note, actor,
                   ?3 - COALESCE(SUM(delta) OVER (
                       ORDER BY id DESC
                       ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING
                   ), 0) AS balance_after
            FROM stock_movements
            WHERE item_id IN (
                SELECT id FROM items
                WHERE lower(trim(name)) = ?1
                  AND lower(trim(COALESCE(brand, ''))) = ?2
            )
        )
        WHERE (?4 IS NULL OR substr(ts, 1, 10) >= ?4)
          AND (?5 IS NULL OR substr(ts, 1, 10) <= ?5)
          AND (?6 IS NULL OR reason = ?6)
        ORDER BY id DESC
        LIMIT ?7 OFFSET ?8
        "#,
    )
    .bind(name_norm)
    .bind(brand_norm)
    .bind(anchor_stock)
    .bind(w.from_date)
    .bind(w.to_date)
    .bind(w.reason)
    .bind(w.limit)
    .bind(w.offset)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Ledger sum for one item. The reconciliation invariant says this always
/// equals `items.stock`.
pub async fn sum_deltas(conn: &mut SqliteConnection, item_id: i64) -> DbResult<i64> {
    let sum: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(delta), 0) FROM stock_movements WHERE item_id = ?1")
            .bind(item_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(sum)
}
