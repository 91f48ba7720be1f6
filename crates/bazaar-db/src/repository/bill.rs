//! # Bill Repository
//!
//! Row-level operations for `bills`, `bill_items`, and `bill_payments`.
//!
//! Line items are immutable once written except during a full bill edit,
//! which deletes and regenerates the set. Payment receipts are append-only;
//! the single `is_auto` receipt is the only one an edit may replace.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::DbResult;
use bazaar_core::{Bill, BillItem, BillPayment, PaymentMode, PaymentStatus};

const BILL_COLUMNS: &str = "id, date_time, discount_bps, tax_bps, subtotal_paise, \
     total_amount_paise, payment_mode, payment_cash_paise, payment_online_paise, \
     is_credit, payment_status, paid_amount_paise, paid_at, is_deleted, deleted_at, notes";

/// Insert/overwrite payload for a bill row.
#[derive(Debug, Clone)]
pub struct BillRow {
    pub discount_bps: i64,
    pub tax_bps: i64,
    pub subtotal_paise: i64,
    pub total_amount_paise: i64,
    pub payment_mode: PaymentMode,
    pub payment_cash_paise: i64,
    pub payment_online_paise: i64,
    pub is_credit: bool,
    pub payment_status: PaymentStatus,
    pub paid_amount_paise: i64,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Inserts a bill and returns its id.
pub async fn insert(
    conn: &mut SqliteConnection,
    row: &BillRow,
    date_time: DateTime<Utc>,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO bills (date_time, discount_bps, tax_bps, subtotal_paise,
                           total_amount_paise, payment_mode, payment_cash_paise,
                           payment_online_paise, is_credit, payment_status,
                           paid_amount_paise, paid_at, is_deleted, deleted_at, notes)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, NULL, ?13)
        "#,
    )
    .bind(date_time)
    .bind(row.discount_bps)
    .bind(row.tax_bps)
    .bind(row.subtotal_paise)
    .bind(row.total_amount_paise)
    .bind(row.payment_mode)
    .bind(row.payment_cash_paise)
    .bind(row.payment_online_paise)
    .bind(row.is_credit)
    .bind(row.payment_status)
    .bind(row.paid_amount_paise)
    .bind(row.paid_at)
    .bind(&row.notes)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Gets a bill by id (including soft-deleted rows; callers decide).
pub async fn get(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Bill>> {
    let sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = ?1");
    let bill = sqlx::query_as::<_, Bill>(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(bill)
}

/// Overwrites the editable columns of a bill during a full edit.
/// `date_time` is preserved; deletion flags are untouched.
pub async fn update_after_edit(conn: &mut SqliteConnection, id: i64, row: &BillRow) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE bills
        SET discount_bps = ?2, tax_bps = ?3, subtotal_paise = ?4,
            total_amount_paise = ?5, payment_mode = ?6, payment_cash_paise = ?7,
            payment_online_paise = ?8, is_credit = ?9, payment_status = ?10,
            paid_amount_paise = ?11, paid_at = ?12, notes = ?13
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(row.discount_bps)
    .bind(row.tax_bps)
    .bind(row.subtotal_paise)
    .bind(row.total_amount_paise)
    .bind(row.payment_mode)
    .bind(row.payment_cash_paise)
    .bind(row.payment_online_paise)
    .bind(row.is_credit)
    .bind(row.payment_status)
    .bind(row.paid_amount_paise)
    .bind(row.paid_at)
    .bind(&row.notes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Flips the soft-delete overlay.
pub async fn set_deleted(
    conn: &mut SqliteConnection,
    id: i64,
    deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
) -> DbResult<()> {
    sqlx::query("UPDATE bills SET is_deleted = ?2, deleted_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(deleted)
        .bind(deleted_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Writes the derived settlement fields after receipts changed.
pub async fn update_settlement(
    conn: &mut SqliteConnection,
    id: i64,
    paid_amount_paise: i64,
    payment_cash_paise: i64,
    payment_online_paise: i64,
    status: PaymentStatus,
    is_credit: bool,
    paid_at: Option<DateTime<Utc>>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE bills
        SET paid_amount_paise = ?2, payment_cash_paise = ?3, payment_online_paise = ?4,
            payment_status = ?5, is_credit = ?6, paid_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(paid_amount_paise)
    .bind(payment_cash_paise)
    .bind(payment_online_paise)
    .bind(status)
    .bind(is_credit)
    .bind(paid_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Bill items
// =============================================================================

pub async fn insert_item(
    conn: &mut SqliteConnection,
    bill_id: i64,
    item_id: i64,
    item_name: &str,
    mrp_paise: i64,
    quantity: i64,
    line_total_paise: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO bill_items (bill_id, item_id, item_name, mrp_paise, quantity, line_total_paise)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(bill_id)
    .bind(item_id)
    .bind(item_name)
    .bind(mrp_paise)
    .bind(quantity)
    .bind(line_total_paise)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Drops the full line-item set (the first half of an edit's regenerate).
pub async fn delete_items(conn: &mut SqliteConnection, bill_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM bill_items WHERE bill_id = ?1")
        .bind(bill_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn items_for_bill(conn: &mut SqliteConnection, bill_id: i64) -> DbResult<Vec<BillItem>> {
    let items = sqlx::query_as::<_, BillItem>(
        r#"
        SELECT id, bill_id, item_id, item_name, mrp_paise, quantity, line_total_paise
        FROM bill_items
        WHERE bill_id = ?1
        ORDER BY id
        "#,
    )
    .bind(bill_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

// =============================================================================
// Payment receipts
// =============================================================================

/// Insert payload for one receipt row.
#[derive(Debug, Clone)]
pub struct NewPaymentRow {
    pub bill_id: i64,
    pub mode: PaymentMode,
    pub cash_paise: i64,
    pub online_paise: i64,
    pub is_auto: bool,
    pub note: Option<String>,
}

pub async fn insert_payment(
    conn: &mut SqliteConnection,
    row: &NewPaymentRow,
    received_at: DateTime<Utc>,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO bill_payments (bill_id, received_at, mode, cash_paise, online_paise, is_auto, note)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(row.bill_id)
    .bind(received_at)
    .bind(row.mode)
    .bind(row.cash_paise)
    .bind(row.online_paise)
    .bind(row.is_auto)
    .bind(&row.note)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Removes the automatic point-of-sale receipt so an edit can regenerate
/// it. Manual receipts are never deleted.
pub async fn delete_auto_payments(conn: &mut SqliteConnection, bill_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM bill_payments WHERE bill_id = ?1 AND is_auto = 1")
        .bind(bill_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Receipts for a bill, newest first.
pub async fn payments_for_bill(
    conn: &mut SqliteConnection,
    bill_id: i64,
) -> DbResult<Vec<BillPayment>> {
    let payments = sqlx::query_as::<_, BillPayment>(
        r#"
        SELECT id, bill_id, received_at, mode, cash_paise, online_paise, is_auto, note
        FROM bill_payments
        WHERE bill_id = ?1
        ORDER BY id DESC
        "#,
    )
    .bind(bill_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(payments)
}

/// Whether any NON-automatic receipt exists (this is what freezes a bill
/// against editing).
pub async fn has_manual_payments(conn: &mut SqliteConnection, bill_id: i64) -> DbResult<bool> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM bill_payments WHERE bill_id = ?1 AND is_auto = 0)",
    )
    .bind(bill_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(exists != 0)
}

/// Sums ALL receipts for a bill: (cash, online). The settlement rule is
/// always evaluated from this, never from a cached field.
pub async fn payment_totals(conn: &mut SqliteConnection, bill_id: i64) -> DbResult<(i64, i64)> {
    let totals: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(cash_paise), 0), COALESCE(SUM(online_paise), 0)
        FROM bill_payments
        WHERE bill_id = ?1
        "#,
    )
    .bind(bill_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(totals)
}

// =============================================================================
// Listing / reporting
// =============================================================================

/// Filter window for [`list_paged`]. Dates are `YYYY-MM-DD`, inclusive.
#[derive(Debug, Clone, Default)]
pub struct BillListWindow<'a> {
    pub from_date: Option<&'a str>,
    pub to_date: Option<&'a str>,
    /// Free text matched against bill id (when numeric), notes, and line
    /// item names.
    pub query: &'a str,
    pub include_deleted: bool,
    pub limit: i64,
    pub offset: i64,
}

/// Newest-first bill page. Pass `limit + 1` to look ahead for more pages.
pub async fn list_paged(conn: &mut SqliteConnection, w: &BillListWindow<'_>) -> DbResult<Vec<Bill>> {
    let id_query: Option<i64> = w.query.trim().parse().ok();

    let sql = format!(
        r#"
        SELECT {BILL_COLUMNS} FROM bills
        WHERE (?1 IS NULL OR substr(date_time, 1, 10) >= ?1)
          AND (?2 IS NULL OR substr(date_time, 1, 10) <= ?2)
          AND (?3 OR is_deleted = 0)
          AND (
                ?4 = ''
                OR (?5 IS NOT NULL AND id = ?5)
                OR lower(COALESCE(notes, '')) LIKE '%' || lower(?4) || '%'
                OR EXISTS (
                    SELECT 1 FROM bill_items bi
                    WHERE bi.bill_id = bills.id
                      AND lower(bi.item_name) LIKE '%' || lower(?4) || '%'
                )
              )
        ORDER BY id DESC
        LIMIT ?6 OFFSET ?7
        "#
    );

    let bills = sqlx::query_as::<_, Bill>(&sql)
        .bind(w.from_date)
        .bind(w.to_date)
        .bind(w.include_deleted)
        .bind(w.query.trim())
        .bind(id_query)
        .bind(w.limit)
        .bind(w.offset)
        .fetch_all(&mut *conn)
        .await?;

    Ok(bills)
}

/// Sums receipts over a received-at date range: (cash, online, count).
///
/// Aggregates from `bill_payments`, NOT from bills, so money collected
/// later on credit bills lands in the period it was actually received.
pub async fn payments_summary(
    conn: &mut SqliteConnection,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> DbResult<(i64, i64, i64)> {
    let row: (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(cash_paise), 0), COALESCE(SUM(online_paise), 0), COUNT(*)
        FROM bill_payments
        WHERE (?1 IS NULL OR substr(received_at, 1, 10) >= ?1)
          AND (?2 IS NULL OR substr(received_at, 1, 10) <= ?2)
        "#,
    )
    .bind(from_date)
    .bind(to_date)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

/// Per-period sales rollup: (period, bills_count, gross_paise, paid_paise).
/// `prefix_len` is 10 for daily buckets (YYYY-MM-DD), 7 for monthly.
/// Soft-deleted bills are excluded from the sales view.
pub async fn sales_aggregate(
    conn: &mut SqliteConnection,
    from_date: &str,
    to_date: &str,
    prefix_len: i64,
) -> DbResult<Vec<(String, i64, i64, i64)>> {
    let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT substr(date_time, 1, ?3) AS period,
               COUNT(id),
               COALESCE(SUM(total_amount_paise), 0),
               COALESCE(SUM(paid_amount_paise), 0)
        FROM bills
        WHERE is_deleted = 0
          AND substr(date_time, 1, 10) >= ?1
          AND substr(date_time, 1, 10) <= ?2
        GROUP BY period
        ORDER BY period ASC
        "#,
    )
    .bind(from_date)
    .bind(to_date)
    .bind(prefix_len)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}
