//! # Inventory Engine
//!
//! Batch lifecycle: create/merge, explicit field patches, and stock
//! adjustment.
//!
//! ## Create-or-Merge
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  create_batch {name, brand, expiry, price, opening, rack}           │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  identical (name, brand, expiry, price) batch exists?               │
//! │       │                                                             │
//! │       ├── YES → add opening stock to it                             │
//! │       │         ledger: ITEM_MERGE (+opening)                       │
//! │       │                                                             │
//! │       └── NO  → insert new batch row                                │
//! │                 ledger: OPENING (+opening)                          │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  reconcile (name, brand) group visibility                           │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  one commit                                                         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repeated restocking at a new price or expiry creates a NEW batch rather
//! than overwriting the old one; the visibility engine later collapses the
//! sold-out duplicates.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::visibility::reconcile_group;
use crate::error::{EngineError, EngineResult};
use crate::repository::item::{self, ItemListWindow, NewItemRow};
use crate::repository::ledger::{self, NewMovement};
use crate::pool::Database;
use bazaar_core::validation::{
    validate_brand, validate_expiry_date, validate_item_name, validate_mrp, validate_search_query,
    validate_stock,
};
use bazaar_core::{normalize_key, Item, ItemPatch, Money, MovementReason, ValidationError};

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// Input for [`create_batch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub name: String,
    pub brand: Option<String>,
    /// `YYYY-MM-DD`, blank/None for no expiry.
    pub expiry_date: Option<String>,
    pub mrp: Money,
    pub opening_stock: i64,
    pub rack_number: Option<String>,
}

/// Result of a create-or-merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpsert {
    pub item: Item,
    /// `true` when the opening stock was folded into an existing identical
    /// batch instead of creating a new row.
    pub merged: bool,
}

/// Listing filter for [`list_batches`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchQuery {
    pub query: String,
    pub rack: Option<String>,
    pub include_archived: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for BatchQuery {
    fn default() -> Self {
        BatchQuery {
            query: String::new(),
            rack: None,
            include_archived: false,
            limit: 100,
            offset: 0,
        }
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Creates a batch, or merges the opening stock into an existing batch with
/// identical (name, brand, expiry, price).
pub async fn create_batch(db: &Database, input: NewBatch) -> EngineResult<BatchUpsert> {
    validate_item_name(&input.name)?;
    validate_brand(input.brand.as_deref())?;
    validate_expiry_date(input.expiry_date.as_deref())?;
    validate_mrp(input.mrp)?;
    validate_stock(input.opening_stock)?;

    let name = input.name.trim().to_string();
    let brand = blank_to_none(input.brand);
    let expiry = blank_to_none(input.expiry_date);
    let rack = blank_to_none(input.rack_number);

    let name_norm = normalize_key(&name);
    let brand_norm = normalize_key(brand.as_deref().unwrap_or(""));
    let expiry_norm = expiry.as_deref().unwrap_or("").trim().to_string();

    let mut tx = db.begin().await?;
    let now = Utc::now();

    let existing =
        item::find_identical(&mut tx, &name_norm, &brand_norm, &expiry_norm, input.mrp.paise())
            .await?;

    let (id, merged) = match existing {
        Some(batch) => {
            if input.opening_stock > 0 {
                item::increment_stock(&mut tx, batch.id, input.opening_stock, now).await?;
                ledger::append(
                    &mut tx,
                    &NewMovement {
                        item_id: batch.id,
                        delta: input.opening_stock,
                        reason: MovementReason::ItemMerge,
                        ref_type: "ITEM",
                        ref_id: Some(batch.id),
                        note: Some(format!("Merged restock into batch #{}", batch.id)),
                        actor: None,
                    },
                    now,
                )
                .await?;
            }
            debug!(item_id = batch.id, added = input.opening_stock, "Merged into existing batch");
            (batch.id, true)
        }
        None => {
            let id = item::insert(
                &mut tx,
                &NewItemRow {
                    name: &name,
                    brand: brand.as_deref(),
                    expiry_date: expiry.as_deref(),
                    mrp_paise: input.mrp.paise(),
                    stock: input.opening_stock,
                    rack_number: rack.as_deref(),
                },
                now,
            )
            .await?;
            if input.opening_stock > 0 {
                ledger::append(
                    &mut tx,
                    &NewMovement {
                        item_id: id,
                        delta: input.opening_stock,
                        reason: MovementReason::Opening,
                        ref_type: "ITEM",
                        ref_id: Some(id),
                        note: Some("Opening stock".to_string()),
                        actor: None,
                    },
                    now,
                )
                .await?;
            }
            (id, false)
        }
    };

    reconcile_group(&mut tx, &name_norm, &brand_norm, now).await?;

    let batch = item::get(&mut tx, id)
        .await?
        .ok_or_else(|| EngineError::not_found("Item", id))?;
    tx.commit().await?;

    info!(item_id = id, merged, stock = batch.stock, "Batch saved");
    Ok(BatchUpsert { item: batch, merged })
}

/// Applies a set of explicit field updates to a batch.
///
/// A stock patch overwrites the stock level and records the difference as
/// a MANUAL ledger movement. A name/brand patch reconciles the batch's old
/// group as well as its new one.
pub async fn patch_batch(db: &Database, item_id: i64, patches: Vec<ItemPatch>) -> EngineResult<Item> {
    let mut tx = db.begin().await?;
    let now = Utc::now();

    let mut batch = item::get(&mut tx, item_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Item", item_id))?;

    let old_key = batch.group_key();
    let mut stock_target: Option<i64> = None;

    for patch in patches {
        match patch {
            ItemPatch::Name(name) => {
                validate_item_name(&name)?;
                batch.name = name.trim().to_string();
            }
            ItemPatch::Brand(brand) => {
                validate_brand(brand.as_deref())?;
                batch.brand = blank_to_none(brand);
            }
            ItemPatch::ExpiryDate(expiry) => {
                validate_expiry_date(expiry.as_deref())?;
                batch.expiry_date = blank_to_none(expiry);
            }
            ItemPatch::Mrp(mrp) => {
                validate_mrp(mrp)?;
                batch.mrp_paise = mrp.paise();
            }
            ItemPatch::Stock(stock) => {
                validate_stock(stock)?;
                stock_target = Some(stock);
            }
            ItemPatch::RackNumber(rack) => {
                batch.rack_number = blank_to_none(rack);
            }
        }
    }

    if let Some(target) = stock_target {
        let delta = target - batch.stock;
        if delta != 0 {
            ledger::append(
                &mut tx,
                &NewMovement {
                    item_id,
                    delta,
                    reason: MovementReason::Manual,
                    ref_type: "ITEM",
                    ref_id: Some(item_id),
                    note: Some(format!("Stock set to {target} via edit")),
                    actor: None,
                },
                now,
            )
            .await?;
        }
        batch.stock = target;
    }

    item::update(&mut tx, &batch, now).await?;

    let new_key = batch.group_key();
    if new_key != old_key {
        // The batch left its old group; both sides need re-evaluation or
        // the old group can end up entirely hidden.
        reconcile_group(&mut tx, &old_key.0, &old_key.1, now).await?;
    }
    reconcile_group(&mut tx, &new_key.0, &new_key.1, now).await?;

    let batch = item::get(&mut tx, item_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Item", item_id))?;
    tx.commit().await?;

    info!(item_id, "Batch updated");
    Ok(batch)
}

/// Adjusts stock by a signed delta. Rejected if the result would be
/// negative; appends one ADJUST ledger row.
pub async fn adjust_stock(
    db: &Database,
    item_id: i64,
    delta: i64,
    note: Option<String>,
) -> EngineResult<Item> {
    if delta == 0 {
        return Err(ValidationError::MustBeNonZero { field: "delta".to_string() }.into());
    }

    let mut tx = db.begin().await?;
    let now = Utc::now();

    let batch = item::get(&mut tx, item_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Item", item_id))?;

    if delta > 0 {
        item::increment_stock(&mut tx, item_id, delta, now).await?;
    } else if !item::try_decrement_stock(&mut tx, item_id, -delta, now).await? {
        return Err(ValidationError::InsufficientStock {
            name: batch.name.clone(),
            available: batch.stock,
            requested: -delta,
        }
        .into());
    }

    ledger::append(
        &mut tx,
        &NewMovement {
            item_id,
            delta,
            reason: MovementReason::Adjust,
            ref_type: "MANUAL",
            ref_id: None,
            note,
            actor: None,
        },
        now,
    )
    .await?;

    let key = batch.group_key();
    reconcile_group(&mut tx, &key.0, &key.1, now).await?;

    let batch = item::get(&mut tx, item_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Item", item_id))?;
    tx.commit().await?;

    info!(item_id, delta, stock = batch.stock, "Stock adjusted");
    Ok(batch)
}

/// Gets one batch by id.
pub async fn get_batch(db: &Database, item_id: i64) -> EngineResult<Item> {
    let mut conn = db.pool().acquire().await?;
    item::get(&mut conn, item_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Item", item_id))
}

/// Lists batches, name-ordered, filtered by free text / rack / archive
/// state.
pub async fn list_batches(db: &Database, q: BatchQuery) -> EngineResult<Vec<Item>> {
    let query = validate_search_query(&q.query)?;
    let limit = q.limit.clamp(1, 500);
    let offset = q.offset.max(0);

    let mut conn = db.pool().acquire().await?;
    let items = item::list(
        &mut conn,
        &ItemListWindow {
            query: &query,
            rack: q.rack.as_deref(),
            include_archived: q.include_archived,
            limit,
            offset,
        },
    )
    .await?;

    Ok(items)
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let v = v.trim().to_string();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::test_db;
    use crate::repository::ledger::sum_deltas;

    fn batch_input(name: &str, mrp_paise: i64, stock: i64) -> NewBatch {
        NewBatch {
            name: name.to_string(),
            brand: None,
            expiry_date: None,
            mrp: Money::from_paise(mrp_paise),
            opening_stock: stock,
            rack_number: None,
        }
    }

    #[tokio::test]
    async fn test_create_writes_opening_movement() {
        let db = test_db().await;
        let created = create_batch(&db, batch_input("Dolo 650", 3200, 20)).await.unwrap();

        assert!(!created.merged);
        assert_eq!(created.item.stock, 20);

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(sum_deltas(&mut conn, created.item.id).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_identical_batch_merges() {
        let db = test_db().await;
        let first = create_batch(&db, batch_input("Dolo 650", 3200, 10)).await.unwrap();
        // Same name (different case), same price, same (absent) expiry.
        let second = create_batch(&db, batch_input("dolo 650", 3200, 5)).await.unwrap();

        assert!(second.merged);
        assert_eq!(second.item.id, first.item.id);
        assert_eq!(second.item.stock, 15);

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(sum_deltas(&mut conn, first.item.id).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn test_different_price_creates_second_batch() {
        let db = test_db().await;
        let first = create_batch(&db, batch_input("Dolo 650", 3200, 10)).await.unwrap();
        let second = create_batch(&db, batch_input("Dolo 650", 3500, 8)).await.unwrap();

        assert!(!second.merged);
        assert_ne!(second.item.id, first.item.id);
    }

    #[tokio::test]
    async fn test_adjust_round_trip_balance() {
        // Create 20, adjust -20, adjust +5: final stock 5, ledger sums to 5.
        let db = test_db().await;
        let created = create_batch(&db, batch_input("Crocin", 2000, 20)).await.unwrap();
        let id = created.item.id;

        adjust_stock(&db, id, -20, None).await.unwrap();
        let after = adjust_stock(&db, id, 5, Some("recount".to_string())).await.unwrap();
        assert_eq!(after.stock, 5);

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(sum_deltas(&mut conn, id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_adjust_rejects_negative_result() {
        let db = test_db().await;
        let created = create_batch(&db, batch_input("Crocin", 2000, 3)).await.unwrap();

        let err = adjust_stock(&db, created.item.id, -5, None).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::InsufficientStock { .. })
        ));

        // No side effects: stock and ledger untouched.
        let batch = get_batch(&db, created.item.id).await.unwrap();
        assert_eq!(batch.stock, 3);
        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(sum_deltas(&mut conn, created.item.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_adjust_zero_rejected() {
        let db = test_db().await;
        let created = create_batch(&db, batch_input("Crocin", 2000, 3)).await.unwrap();
        let err = adjust_stock(&db, created.item.id, 0, None).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::MustBeNonZero { .. })
        ));
    }

    #[tokio::test]
    async fn test_stock_patch_logs_manual_movement() {
        let db = test_db().await;
        let created = create_batch(&db, batch_input("Zincovit", 9500, 10)).await.unwrap();
        let id = created.item.id;

        let patched = patch_batch(&db, id, vec![ItemPatch::Stock(4)]).await.unwrap();
        assert_eq!(patched.stock, 4);

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(sum_deltas(&mut conn, id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_archive_rule_in_stock_wins() {
        // Group with stocks [0, 0, 5]: only the in-stock batch visible.
        let db = test_db().await;
        let a = create_batch(
            &db,
            NewBatch { expiry_date: Some("2026-01-01".into()), ..batch_input("Dolo 650", 3000, 0) },
        )
        .await
        .unwrap();
        let b = create_batch(
            &db,
            NewBatch { expiry_date: Some("2025-06-01".into()), ..batch_input("Dolo 650", 3200, 0) },
        )
        .await
        .unwrap();
        let c = create_batch(
            &db,
            NewBatch { expiry_date: Some("2027-01-01".into()), ..batch_input("Dolo 650", 3500, 5) },
        )
        .await
        .unwrap();

        let a = get_batch(&db, a.item.id).await.unwrap();
        let b = get_batch(&db, b.item.id).await.unwrap();
        let c = get_batch(&db, c.item.id).await.unwrap();
        assert!(a.is_archived);
        assert!(b.is_archived);
        assert!(!c.is_archived);
    }

    #[tokio::test]
    async fn test_archive_rule_all_sold_out_keeps_earliest_expiry() {
        let db = test_db().await;
        let _a = create_batch(
            &db,
            NewBatch { expiry_date: Some("2026-01-01".into()), ..batch_input("Dolo 650", 3000, 0) },
        )
        .await
        .unwrap();
        let b = create_batch(
            &db,
            NewBatch { expiry_date: Some("2025-06-01".into()), ..batch_input("Dolo 650", 3200, 0) },
        )
        .await
        .unwrap();
        let c = create_batch(
            &db,
            NewBatch { expiry_date: Some("2027-01-01".into()), ..batch_input("Dolo 650", 3500, 5) },
        )
        .await
        .unwrap();

        // Drain the in-stock batch; the earliest expiry (b) becomes the one
        // visible row.
        adjust_stock(&db, c.item.id, -5, None).await.unwrap();

        let visible: Vec<i64> = list_batches(&db, BatchQuery::default())
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(visible, vec![b.item.id]);
    }

    #[tokio::test]
    async fn test_brand_patch_reconciles_old_group() {
        let db = test_db().await;
        // Two zero-stock batches in one group: one visible keeper.
        let a = create_batch(&db, batch_input("Shampoo", 9900, 0)).await.unwrap();
        let b = create_batch(&db, batch_input("Shampoo", 10900, 0)).await.unwrap();

        let a_vis = get_batch(&db, a.item.id).await.unwrap();
        assert!(!a_vis.is_archived);
        let b_vis = get_batch(&db, b.item.id).await.unwrap();
        assert!(b_vis.is_archived);

        // Move the keeper to a different brand; the old group must surface
        // its remaining batch.
        patch_batch(&db, a.item.id, vec![ItemPatch::Brand(Some("Dove".to_string()))])
            .await
            .unwrap();

        let b_after = get_batch(&db, b.item.id).await.unwrap();
        assert!(!b_after.is_archived);
        let a_after = get_batch(&db, a.item.id).await.unwrap();
        assert!(!a_after.is_archived);
    }

    #[tokio::test]
    async fn test_list_filters_and_search() {
        let db = test_db().await;
        create_batch(&db, batch_input("Dolo 650", 3200, 4)).await.unwrap();
        create_batch(&db, batch_input("Crocin Advance", 2500, 2)).await.unwrap();

        let hits = list_batches(&db, BatchQuery { query: "dolo".to_string(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Dolo 650");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let db = test_db().await;
        assert!(create_batch(&db, batch_input("", 3200, 4)).await.is_err());
        assert!(create_batch(&db, batch_input("X", 0, 4)).await.is_err());
        assert!(create_batch(&db, batch_input("X", 100, -1)).await.is_err());
        assert!(create_batch(
            &db,
            NewBatch { expiry_date: Some("soon".into()), ..batch_input("X", 100, 1) }
        )
        .await
        .is_err());
    }
}
