//! # Return Repository
//!
//! Row-level operations for `returns` and `return_items`, plus the two
//! quantity maps the over-return guard is built on.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;

use crate::error::DbResult;
use bazaar_core::{Return, ReturnItem};

/// Insert payload for a return header.
#[derive(Debug, Clone)]
pub struct NewReturnRow {
    pub source_bill_id: Option<i64>,
    pub subtotal_return_paise: i64,
    pub refund_cash_paise: i64,
    pub refund_online_paise: i64,
    pub rounding_adjustment_paise: i64,
    pub notes: Option<String>,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    row: &NewReturnRow,
    date_time: DateTime<Utc>,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO returns (date_time, source_bill_id, subtotal_return_paise,
                             refund_cash_paise, refund_online_paise,
                             rounding_adjustment_paise, notes)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(date_time)
    .bind(row.source_bill_id)
    .bind(row.subtotal_return_paise)
    .bind(row.refund_cash_paise)
    .bind(row.refund_online_paise)
    .bind(row.rounding_adjustment_paise)
    .bind(&row.notes)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Return>> {
    let row = sqlx::query_as::<_, Return>(
        r#"
        SELECT id, date_time, source_bill_id, subtotal_return_paise,
               refund_cash_paise, refund_online_paise, rounding_adjustment_paise, notes
        FROM returns
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

pub async fn insert_item(
    conn: &mut SqliteConnection,
    return_id: i64,
    item_id: i64,
    item_name: &str,
    mrp_paise: i64,
    quantity: i64,
    line_total_paise: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO return_items (return_id, item_id, item_name, mrp_paise, quantity, line_total_paise)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(return_id)
    .bind(item_id)
    .bind(item_name)
    .bind(mrp_paise)
    .bind(quantity)
    .bind(line_total_paise)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn items_for_return(
    conn: &mut SqliteConnection,
    return_id: i64,
) -> DbResult<Vec<ReturnItem>> {
    let items = sqlx::query_as::<_, ReturnItem>(
        r#"
        SELECT id, return_id, item_id, item_name, mrp_paise, quantity, line_total_paise
        FROM return_items
        WHERE return_id = ?1
        ORDER BY id
        "#,
    )
    .bind(return_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// Newest-first return page, date-filterable.
pub async fn list(
    conn: &mut SqliteConnection,
    from_date: Option<&str>,
    to_date: Option<&str>,
    limit: i64,
    offset: i64,
) -> DbResult<Vec<Return>> {
    let rows = sqlx::query_as::<_, Return>(
        r#"
        SELECT id, date_time, source_bill_id, subtotal_return_paise,
               refund_cash_paise, refund_online_paise, rounding_adjustment_paise, notes
        FROM returns
        WHERE (?1 IS NULL OR substr(date_time, 1, 10) >= ?1)
          AND (?2 IS NULL OR substr(date_time, 1, 10) <= ?2)
        ORDER BY id DESC
        LIMIT ?3 OFFSET ?4
        "#,
    )
    .bind(from_date)
    .bind(to_date)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

// =============================================================================
// Quantity maps (over-return guard)
// =============================================================================

/// item_id → quantity sold on the bill.
pub async fn sold_quantities(
    conn: &mut SqliteConnection,
    bill_id: i64,
) -> DbResult<HashMap<i64, i64>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT item_id, COALESCE(SUM(quantity), 0)
        FROM bill_items
        WHERE bill_id = ?1
        GROUP BY item_id
        "#,
    )
    .bind(bill_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// item_id → quantity already returned against the bill, across ALL of its
/// returns (plain returns and exchanges alike).
pub async fn returned_quantities(
    conn: &mut SqliteConnection,
    bill_id: i64,
) -> DbResult<HashMap<i64, i64>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT ri.item_id, COALESCE(SUM(ri.quantity), 0)
        FROM return_items ri
        JOIN returns r ON r.id = ri.return_id
        WHERE r.source_bill_id = ?1
        GROUP BY ri.item_id
        "#,
    )
    .bind(bill_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().collect())
}
