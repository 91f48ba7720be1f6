//! # Item Repository
//!
//! Row-level operations for the `items` table (stock batches).
//!
//! ## Stock Mutation Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  try_decrement_stock uses an atomic conditional update:             │
//! │                                                                     │
//! │    UPDATE items SET stock = stock - n                               │
//! │    WHERE id = ? AND stock >= n                                      │
//! │                                                                     │
//! │  Zero affected rows = insufficient stock. Two concurrent sales of   │
//! │  the same batch can never read-modify-write a stale stock value;    │
//! │  the second one simply fails the guard.                             │
//! │                                                                     │
//! │  Callers must pair EVERY stock mutation with a ledger append in     │
//! │  the same transaction (see repository::ledger).                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::DbResult;
use bazaar_core::Item;

/// Insert payload for a new batch row.
#[derive(Debug, Clone)]
pub struct NewItemRow<'a> {
    pub name: &'a str,
    pub brand: Option<&'a str>,
    pub expiry_date: Option<&'a str>,
    pub mrp_paise: i64,
    pub stock: i64,
    pub rack_number: Option<&'a str>,
}

/// Inserts a batch row and returns its id.
pub async fn insert(
    conn: &mut SqliteConnection,
    row: &NewItemRow<'_>,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO items (name, brand, expiry_date, mrp_paise, stock, rack_number,
                           is_archived, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)
        "#,
    )
    .bind(row.name)
    .bind(row.brand)
    .bind(row.expiry_date)
    .bind(row.mrp_paise)
    .bind(row.stock)
    .bind(row.rack_number)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Gets a batch by id.
pub async fn get(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Item>> {
    let item = sqlx::query_as::<_, Item>(
        r#"
        SELECT id, name, brand, expiry_date, mrp_paise, stock, rack_number,
               is_archived, created_at, updated_at
        FROM items
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(item)
}

/// Finds the batch an incoming restock should merge into: identical
/// (name, brand, expiry, price), with name/brand compared case-insensitively
/// and blank brand/expiry treated the same as NULL.
///
/// `brand_norm` / `expiry_norm` are the normalized comparison values
/// (lowercased trimmed brand, trimmed expiry, `""` for none).
pub async fn find_identical(
    conn: &mut SqliteConnection,
    name_norm: &str,
    brand_norm: &str,
    expiry_norm: &str,
    mrp_paise: i64,
) -> DbResult<Option<Item>> {
    let item = sqlx::query_as::<_, Item>(
        r#"
        SELECT id, name, brand, expiry_date, mrp_paise, stock, rack_number,
               is_archived, created_at, updated_at
        FROM items
        WHERE lower(trim(name)) = ?1
          AND lower(trim(COALESCE(brand, ''))) = ?2
          AND trim(COALESCE(expiry_date, '')) = ?3
          AND mrp_paise = ?4
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(name_norm)
    .bind(brand_norm)
    .bind(expiry_norm)
    .bind(mrp_paise)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(item)
}

/// All batches of one (name, brand) group, in id order.
pub async fn group_members(
    conn: &mut SqliteConnection,
    name_norm: &str,
    brand_norm: &str,
) -> DbResult<Vec<Item>> {
    let items = sqlx::query_as::<_, Item>(
        r#"
        SELECT id, name, brand, expiry_date, mrp_paise, stock, rack_number,
               is_archived, created_at, updated_at
        FROM items
        WHERE lower(trim(name)) = ?1
          AND lower(trim(COALESCE(brand, ''))) = ?2
        ORDER BY id
        "#,
    )
    .bind(name_norm)
    .bind(brand_norm)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// Listing filter for [`list`].
#[derive(Debug, Clone, Default)]
pub struct ItemListWindow<'a> {
    /// Free-text search over name/brand; empty matches everything.
    pub query: &'a str,
    pub rack: Option<&'a str>,
    pub include_archived: bool,
    pub limit: i64,
    pub offset: i64,
}

/// Lists batches, name-ordered.
pub async fn list(conn: &mut SqliteConnection, w: &ItemListWindow<'_>) -> DbResult<Vec<Item>> {
    let items = sqlx::query_as::<_, Item>(
        r#"
        SELECT id, name, brand, expiry_date, mrp_paise, stock, rack_number,
               is_archived, created_at, updated_at
        FROM items
        WHERE (?1 = '' OR name LIKE '%' || ?1 || '%' OR COALESCE(brand, '') LIKE '%' || ?1 || '%')
          AND (?2 IS NULL OR rack_number = ?2)
          AND (?3 OR is_archived = 0)
        ORDER BY name COLLATE NOCASE, id
        LIMIT ?4 OFFSET ?5
        "#,
    )
    .bind(w.query)
    .bind(w.rack)
    .bind(w.include_archived)
    .bind(w.limit)
    .bind(w.offset)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// Writes back every user-editable column of a batch. The archive flag is
/// NOT written here; only the visibility engine touches it.
pub async fn update(conn: &mut SqliteConnection, item: &Item, now: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE items
        SET name = ?2, brand = ?3, expiry_date = ?4, mrp_paise = ?5,
            stock = ?6, rack_number = ?7, updated_at = ?8
        WHERE id = ?1
        "#,
    )
    .bind(item.id)
    .bind(&item.name)
    .bind(&item.brand)
    .bind(&item.expiry_date)
    .bind(item.mrp_paise)
    .bind(item.stock)
    .bind(&item.rack_number)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Atomically decrements stock if (and only if) enough is available.
///
/// ## Returns
/// `true` when the decrement was applied; `false` means insufficient
/// stock (or an unknown id).
pub async fn try_decrement_stock(
    conn: &mut SqliteConnection,
    id: i64,
    qty: i64,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE items
        SET stock = stock - ?2, updated_at = ?3
        WHERE id = ?1 AND stock >= ?2
        "#,
    )
    .bind(id)
    .bind(qty)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Increments stock (restocks never fail the non-negative guard).
pub async fn increment_stock(
    conn: &mut SqliteConnection,
    id: i64,
    qty: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE items
        SET stock = stock + ?2, updated_at = ?3
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(qty)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Sets the derived archive flag. Called only by the visibility engine.
pub async fn set_archived(
    conn: &mut SqliteConnection,
    id: i64,
    archived: bool,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE items
        SET is_archived = ?2, updated_at = ?3
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(archived)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Total number of batch rows (used by the seed binary).
pub async fn count(conn: &mut SqliteConnection) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
