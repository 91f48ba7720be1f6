//! # Billing Engine
//!
//! Sale creation and editing, the soft-delete overlay, and payment
//! settlement.
//!
//! ## Create Bill
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  1. Validate lines, discount, manual final amount    (no writes)    │
//! │  2. Open ONE transaction                                            │
//! │  3. Price each line (custom price or current MRP),                  │
//! │     check stock availability                                        │
//! │  4. total = manual override ?? discounted subtotal                  │
//! │  5. Validate payment breakdown against total (exact paise)          │
//! │  6. Per line, atomically:                                           │
//! │       stock -= qty   +   SALE ledger row   +   bill_items row       │
//! │  7. Reconcile visibility for every touched (name, brand) group      │
//! │  8. Auto receipt row if anything was collected now                  │
//! │  9. Commit                                                          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Settlement
//! Status is ALWAYS re-derived from the sum of all receipt rows
//! (`bazaar_core::billing::settle`), at creation and on every receipt.
//!
//! ## Soft Delete
//! `is_deleted` is a reporting-visibility overlay checked at the top of
//! every mutating operation. It does NOT reverse stock or ledger entries:
//! the inventory already left the building. Use a return to undo a
//! mistaken sale.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::visibility::reconcile_group;
use crate::error::{EngineError, EngineResult};
use crate::pool::Database;
use crate::repository::bill::{self, BillListWindow, BillRow, NewPaymentRow};
use crate::repository::item;
use crate::repository::ledger::{self, NewMovement};
use crate::repository::returns as return_repo;
use bazaar_core::billing::{
    compute_total, effective_unit_price, settle, validate_payment_breakdown,
};
use bazaar_core::validation::{validate_discount_percent, validate_final_amount, validate_quantity};
use bazaar_core::{
    Bill, BillItem, BillPayment, ConflictError, Item, Money, MovementReason, PaymentMode,
    PaymentStatus, Rate, ValidationError,
};

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// One requested sale line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillLine {
    pub item_id: i64,
    pub quantity: i64,
    /// Overrides the item's MRP when positive (price negotiated at the
    /// counter); snapshotted into the bill line.
    pub unit_price: Option<Money>,
}

/// Input for [`create_bill`] and [`edit_bill`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBill {
    pub lines: Vec<BillLine>,
    pub discount_percent: f64,
    pub payment_mode: PaymentMode,
    pub payment_cash: Money,
    pub payment_online: Money,
    /// Split mode only: the portion deliberately left outstanding.
    pub payment_credit: Money,
    /// Manual override of the final amount (operator round-off).
    pub final_amount: Option<Money>,
    pub notes: Option<String>,
}

/// A bill with its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillWithItems {
    pub bill: Bill,
    pub items: Vec<BillItem>,
}

/// Input for [`receive_payment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivePayment {
    pub mode: PaymentMode,
    pub cash: Money,
    pub online: Money,
    pub note: Option<String>,
}

/// Settlement state after a receipt landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub bill_id: i64,
    pub payment_status: PaymentStatus,
    pub paid_amount: Money,
    pub total_amount: Money,
    pub pending_amount: Money,
}

/// Filter for [`list_bills`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillQuery {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    /// Matches bill id (numeric), notes, and line item names.
    pub query: String,
    pub include_deleted: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for BillQuery {
    fn default() -> Self {
        BillQuery {
            from_date: None,
            to_date: None,
            query: String::new(),
            include_deleted: false,
            limit: 100,
            offset: 0,
        }
    }
}

/// One page of bills, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillPage {
    pub bills: Vec<BillWithItems>,
    pub next_offset: Option<i64>,
}

/// Receipts collected over a date range, from `bill_payments` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsSummary {
    pub cash_collected: Money,
    pub online_collected: Money,
    pub total_collected: Money,
    pub count: i64,
}

/// Aggregation bucket size for [`sales_aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatePeriod {
    Day,
    Month,
}

/// One period's sales rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesBucket {
    pub period: String,
    pub bills_count: i64,
    pub gross_sales: Money,
    pub paid_total: Money,
    pub pending_total: Money,
}

// =============================================================================
// Internal helpers
// =============================================================================

/// A line joined with its item and priced.
struct PricedLine {
    item: Item,
    quantity: i64,
    unit_price: Money,
    line_total: Money,
}

/// Loads and prices every requested line inside the transaction, checking
/// existence and (against `extra_available`) cumulative stock sufficiency.
///
/// `extra_available` is the per-item quantity about to be restored by the
/// surrounding operation (an edit restores the old sold quantities) and is
/// counted as sellable.
async fn price_lines(
    tx: &mut sqlx::SqliteConnection,
    lines: &[BillLine],
    extra_available: &HashMap<i64, i64>,
) -> EngineResult<(Vec<PricedLine>, Money)> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal = Money::zero();
    let mut requested: HashMap<i64, i64> = HashMap::new();

    for line in lines {
        let batch = item::get(tx, line.item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Item", line.item_id))?;

        let unit_price = effective_unit_price(batch.mrp(), line.unit_price);
        let line_total = unit_price * line.quantity;
        subtotal += line_total;

        let total_requested = requested.entry(batch.id).or_insert(0);
        *total_requested += line.quantity;

        let available = batch.stock + extra_available.get(&batch.id).copied().unwrap_or(0);
        if *total_requested > available {
            return Err(ValidationError::InsufficientStock {
                name: batch.name.clone(),
                available,
                requested: *total_requested,
            }
            .into());
        }

        priced.push(PricedLine { item: batch, quantity: line.quantity, unit_price, line_total });
    }

    Ok((priced, subtotal))
}

/// Reconciles visibility once per distinct (name, brand) group.
async fn reconcile_touched_groups(
    tx: &mut sqlx::SqliteConnection,
    items: impl Iterator<Item = &Item>,
    now: chrono::DateTime<Utc>,
) -> EngineResult<()> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for batch in items {
        let key = batch.group_key();
        if seen.insert(key.clone()) {
            reconcile_group(tx, &key.0, &key.1, now).await?;
        }
    }
    Ok(())
}

fn validate_bill_input(input: &NewBill) -> EngineResult<(Rate, Option<Money>)> {
    if input.lines.is_empty() {
        return Err(ValidationError::EmptyBill.into());
    }
    let discount = validate_discount_percent(input.discount_percent)?;
    let manual = validate_final_amount(input.final_amount)?;
    for line in &input.lines {
        validate_quantity(line.quantity)?;
    }
    Ok((discount, manual))
}

// =============================================================================
// Create
// =============================================================================

/// Creates a sale: validates, deducts stock, appends SALE ledger rows,
/// reconciles visibility, writes the bill with its initial settlement
/// state, and records the automatic point-of-sale receipt. One commit.
pub async fn create_bill(db: &Database, input: NewBill) -> EngineResult<BillWithItems> {
    let (discount, manual) = validate_bill_input(&input)?;

    let mut tx = db.begin().await?;
    let now = Utc::now();

    let (priced, subtotal) = price_lines(&mut tx, &input.lines, &HashMap::new()).await?;

    let total = compute_total(subtotal, discount, manual);
    let breakdown = validate_payment_breakdown(
        input.payment_mode,
        input.payment_cash,
        input.payment_online,
        input.payment_credit,
        total,
    )?;
    let paid_now = breakdown.paid_now();
    let settlement = settle(paid_now, total);
    let paid_at = (settlement.status == PaymentStatus::Paid).then_some(now);

    let bill_id = bill::insert(
        &mut tx,
        &BillRow {
            discount_bps: discount.bps() as i64,
            tax_bps: 0,
            subtotal_paise: subtotal.paise(),
            total_amount_paise: total.paise(),
            payment_mode: input.payment_mode,
            payment_cash_paise: breakdown.cash.paise(),
            payment_online_paise: breakdown.online.paise(),
            is_credit: settlement.is_credit,
            payment_status: settlement.status,
            paid_amount_paise: paid_now.paise(),
            paid_at,
            notes: input.notes.clone(),
        },
        now,
    )
    .await?;

    for line in &priced {
        if !item::try_decrement_stock(&mut tx, line.item.id, line.quantity, now).await? {
            return Err(ValidationError::InsufficientStock {
                name: line.item.name.clone(),
                available: line.item.stock,
                requested: line.quantity,
            }
            .into());
        }
        ledger::append(
            &mut tx,
            &NewMovement {
                item_id: line.item.id,
                delta: -line.quantity,
                reason: MovementReason::Sale,
                ref_type: "BILL",
                ref_id: Some(bill_id),
                note: Some(format!("Bill #{bill_id}")),
                actor: None,
            },
            now,
        )
        .await?;
        bill::insert_item(
            &mut tx,
            bill_id,
            line.item.id,
            &line.item.name,
            line.unit_price.paise(),
            line.quantity,
            line.line_total.paise(),
        )
        .await?;
    }

    reconcile_touched_groups(&mut tx, priced.iter().map(|l| &l.item), now).await?;

    if paid_now.is_positive() {
        bill::insert_payment(
            &mut tx,
            &NewPaymentRow {
                bill_id,
                mode: input.payment_mode,
                cash_paise: breakdown.cash.paise(),
                online_paise: breakdown.online.paise(),
                is_auto: true,
                note: Some("auto: payment at bill creation".to_string()),
            },
            now,
        )
        .await?;
    }

    let record = load_bill(&mut tx, bill_id).await?;
    tx.commit().await?;

    info!(bill_id, total = %total, lines = record.items.len(), "Bill created");
    Ok(record)
}

// =============================================================================
// Edit
// =============================================================================

/// Replaces a bill's full line-item set and recomputes totals with the
/// same rules as creation.
///
/// Per-item stock deltas (old sold − new sold) are applied and journaled
/// as BILL_EDIT. Rejected once any MANUAL receipt exists: regenerating the
/// totals would invalidate recorded payment history.
pub async fn edit_bill(db: &Database, bill_id: i64, input: NewBill) -> EngineResult<BillWithItems> {
    let (discount, manual) = validate_bill_input(&input)?;

    let mut tx = db.begin().await?;
    let now = Utc::now();

    let existing = bill::get(&mut tx, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
    if existing.is_deleted {
        return Err(ConflictError::BillDeleted { bill_id }.into());
    }
    if bill::has_manual_payments(&mut tx, bill_id).await? {
        return Err(ConflictError::BillHasManualReceipts { bill_id }.into());
    }

    let old_sold = return_repo::sold_quantities(&mut tx, bill_id).await?;

    let (priced, subtotal) = price_lines(&mut tx, &input.lines, &old_sold).await?;

    let total = compute_total(subtotal, discount, manual);
    let breakdown = validate_payment_breakdown(
        input.payment_mode,
        input.payment_cash,
        input.payment_online,
        input.payment_credit,
        total,
    )?;
    let paid_now = breakdown.paid_now();
    let settlement = settle(paid_now, total);
    let paid_at = (settlement.status == PaymentStatus::Paid).then_some(now);

    // Net stock delta per item: positive restores, negative consumes more.
    let mut new_sold: HashMap<i64, i64> = HashMap::new();
    for line in &priced {
        *new_sold.entry(line.item.id).or_insert(0) += line.quantity;
    }
    let touched: HashSet<i64> = old_sold.keys().chain(new_sold.keys()).copied().collect();

    let mut touched_items: Vec<Item> = Vec::new();
    for item_id in touched {
        let old_qty = old_sold.get(&item_id).copied().unwrap_or(0);
        let new_qty = new_sold.get(&item_id).copied().unwrap_or(0);
        let delta = old_qty - new_qty;

        let batch = item::get(&mut tx, item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Item", item_id))?;

        if delta > 0 {
            item::increment_stock(&mut tx, item_id, delta, now).await?;
        } else if delta < 0 && !item::try_decrement_stock(&mut tx, item_id, -delta, now).await? {
            return Err(ValidationError::InsufficientStock {
                name: batch.name.clone(),
                available: batch.stock,
                requested: -delta,
            }
            .into());
        }

        if delta != 0 {
            ledger::append(
                &mut tx,
                &NewMovement {
                    item_id,
                    delta,
                    reason: MovementReason::BillEdit,
                    ref_type: "BILL",
                    ref_id: Some(bill_id),
                    note: Some(format!("Bill #{bill_id} edited")),
                    actor: None,
                },
                now,
            )
            .await?;
        }

        touched_items.push(batch);
    }

    bill::delete_items(&mut tx, bill_id).await?;
    for line in &priced {
        bill::insert_item(
            &mut tx,
            bill_id,
            line.item.id,
            &line.item.name,
            line.unit_price.paise(),
            line.quantity,
            line.line_total.paise(),
        )
        .await?;
    }

    bill::update_after_edit(
        &mut tx,
        bill_id,
        &BillRow {
            discount_bps: discount.bps() as i64,
            tax_bps: existing.tax_bps,
            subtotal_paise: subtotal.paise(),
            total_amount_paise: total.paise(),
            payment_mode: input.payment_mode,
            payment_cash_paise: breakdown.cash.paise(),
            payment_online_paise: breakdown.online.paise(),
            is_credit: settlement.is_credit,
            payment_status: settlement.status,
            paid_amount_paise: paid_now.paise(),
            paid_at,
            notes: input.notes.clone(),
        },
    )
    .await?;

    bill::delete_auto_payments(&mut tx, bill_id).await?;
    if paid_now.is_positive() {
        bill::insert_payment(
            &mut tx,
            &NewPaymentRow {
                bill_id,
                mode: input.payment_mode,
                cash_paise: breakdown.cash.paise(),
                online_paise: breakdown.online.paise(),
                is_auto: true,
                note: Some("auto: payment at bill creation".to_string()),
            },
            now,
        )
        .await?;
    }

    reconcile_touched_groups(&mut tx, touched_items.iter(), now).await?;

    let record = load_bill(&mut tx, bill_id).await?;
    tx.commit().await?;

    info!(bill_id, total = %total, "Bill edited");
    Ok(record)
}

// =============================================================================
// Soft delete / recover
// =============================================================================

/// Hides a bill from reporting. Stock and ledger entries are NOT reversed.
pub async fn delete_bill(db: &Database, bill_id: i64) -> EngineResult<Bill> {
    let mut tx = db.begin().await?;
    let now = Utc::now();

    let existing = bill::get(&mut tx, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
    if existing.is_deleted {
        return Err(ConflictError::BillDeleted { bill_id }.into());
    }

    bill::set_deleted(&mut tx, bill_id, true, Some(now)).await?;
    let updated = bill::get(&mut tx, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
    tx.commit().await?;

    info!(bill_id, "Bill soft-deleted");
    Ok(updated)
}

/// Brings a soft-deleted bill back into reporting.
pub async fn recover_bill(db: &Database, bill_id: i64) -> EngineResult<Bill> {
    let mut tx = db.begin().await?;

    let existing = bill::get(&mut tx, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
    if !existing.is_deleted {
        return Err(ConflictError::BillNotDeleted { bill_id }.into());
    }

    bill::set_deleted(&mut tx, bill_id, false, None).await?;
    let updated = bill::get(&mut tx, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
    tx.commit().await?;

    info!(bill_id, "Bill recovered");
    Ok(updated)
}

// =============================================================================
// Settlement
// =============================================================================

/// Records a payment receipt against a bill and re-derives its settlement
/// state from the sum of ALL receipts.
pub async fn receive_payment(
    db: &Database,
    bill_id: i64,
    input: ReceivePayment,
) -> EngineResult<PaymentOutcome> {
    if input.mode == PaymentMode::Credit {
        return Err(ValidationError::InvalidReceiptMode.into());
    }
    if input.cash.is_negative() {
        return Err(ValidationError::NegativeAmount { field: "cash_amount".to_string() }.into());
    }
    if input.online.is_negative() {
        return Err(ValidationError::NegativeAmount { field: "online_amount".to_string() }.into());
    }
    if input.mode == PaymentMode::Cash && !input.online.is_zero() {
        return Err(ValidationError::CashModeHasOnline.into());
    }
    if input.mode == PaymentMode::Online && !input.cash.is_zero() {
        return Err(ValidationError::OnlineModeHasCash.into());
    }
    if !(input.cash + input.online).is_positive() {
        return Err(ValidationError::NonPositivePayment.into());
    }

    let mut tx = db.begin().await?;
    let now = Utc::now();

    let existing = bill::get(&mut tx, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
    if existing.is_deleted {
        return Err(ConflictError::BillDeleted { bill_id }.into());
    }

    bill::insert_payment(
        &mut tx,
        &NewPaymentRow {
            bill_id,
            mode: input.mode,
            cash_paise: input.cash.paise(),
            online_paise: input.online.paise(),
            is_auto: false,
            note: input.note.clone(),
        },
        now,
    )
    .await?;

    let (cash_total, online_total) = bill::payment_totals(&mut tx, bill_id).await?;
    let total_paid = Money::from_paise(cash_total + online_total);
    let settlement = settle(total_paid, existing.total_amount());
    let paid_at = (settlement.status == PaymentStatus::Paid).then_some(now);

    bill::update_settlement(
        &mut tx,
        bill_id,
        total_paid.paise(),
        cash_total,
        online_total,
        settlement.status,
        settlement.is_credit,
        paid_at,
    )
    .await?;

    tx.commit().await?;

    let total_amount = existing.total_amount();
    let pending = Money::from_paise((total_amount.paise() - total_paid.paise()).max(0));
    debug!(bill_id, paid = %total_paid, status = ?settlement.status, "Payment received");

    Ok(PaymentOutcome {
        bill_id,
        payment_status: settlement.status,
        paid_amount: total_paid,
        total_amount,
        pending_amount: pending,
    })
}

// =============================================================================
// Reads
// =============================================================================

async fn load_bill(tx: &mut sqlx::SqliteConnection, bill_id: i64) -> EngineResult<BillWithItems> {
    let bill = bill::get(tx, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
    let items = bill::items_for_bill(tx, bill_id).await?;
    Ok(BillWithItems { bill, items })
}

/// Gets one bill with its lines (soft-deleted bills included).
pub async fn get_bill(db: &Database, bill_id: i64) -> EngineResult<BillWithItems> {
    let mut conn = db.pool().acquire().await?;
    load_bill(&mut conn, bill_id).await
}

/// Newest-first page of bills with their lines.
pub async fn list_bills(db: &Database, q: BillQuery) -> EngineResult<BillPage> {
    let limit = q.limit.clamp(1, 500);
    let offset = q.offset.max(0);

    let mut conn = db.pool().acquire().await?;
    let rows = bill::list_paged(
        &mut conn,
        &BillListWindow {
            from_date: q.from_date.as_deref(),
            to_date: q.to_date.as_deref(),
            query: &q.query,
            include_deleted: q.include_deleted,
            limit: limit + 1,
            offset,
        },
    )
    .await?;

    let has_more = rows.len() as i64 > limit;
    let mut bills = Vec::with_capacity(rows.len().min(limit as usize));
    for bill_row in rows.into_iter().take(limit as usize) {
        let items = bill::items_for_bill(&mut conn, bill_row.id).await?;
        bills.push(BillWithItems { bill: bill_row, items });
    }

    Ok(BillPage { bills, next_offset: has_more.then_some(offset + limit) })
}

/// Receipts for a bill, newest first.
pub async fn list_payments(db: &Database, bill_id: i64) -> EngineResult<Vec<BillPayment>> {
    let mut conn = db.pool().acquire().await?;
    bill::get(&mut conn, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
    Ok(bill::payments_for_bill(&mut conn, bill_id).await?)
}

/// "Collected today": sums receipts by received-at date, counting the
/// auto creation receipt and later credit collections identically.
pub async fn payments_summary(
    db: &Database,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> EngineResult<PaymentsSummary> {
    let mut conn = db.pool().acquire().await?;
    let (cash, online, count) = bill::payments_summary(&mut conn, from_date, to_date).await?;

    Ok(PaymentsSummary {
        cash_collected: Money::from_paise(cash),
        online_collected: Money::from_paise(online),
        total_collected: Money::from_paise(cash + online),
        count,
    })
}

/// Daily or monthly sales rollup over a date range (sales view, based on
/// bills; soft-deleted bills excluded).
pub async fn sales_aggregate(
    db: &Database,
    from_date: &str,
    to_date: &str,
    period: AggregatePeriod,
) -> EngineResult<Vec<SalesBucket>> {
    let prefix_len = match period {
        AggregatePeriod::Day => 10,
        AggregatePeriod::Month => 7,
    };

    let mut conn = db.pool().acquire().await?;
    let rows = bill::sales_aggregate(&mut conn, from_date, to_date, prefix_len).await?;

    Ok(rows
        .into_iter()
        .map(|(period, bills_count, gross, paid)| SalesBucket {
            period,
            bills_count,
            gross_sales: Money::from_paise(gross),
            paid_total: Money::from_paise(paid),
            pending_total: Money::from_paise((gross - paid).max(0)),
        })
        .collect())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::inventory::{create_batch, get_batch, NewBatch};
    use crate::engine::testutil::test_db;
    use crate::repository::ledger::sum_deltas;

    async fn seeded_item(db: &Database, name: &str, mrp_paise: i64, stock: i64) -> i64 {
        create_batch(
            db,
            NewBatch {
                name: name.to_string(),
                brand: None,
                expiry_date: None,
                mrp: Money::from_paise(mrp_paise),
                opening_stock: stock,
                rack_number: None,
            },
        )
        .await
        .unwrap()
        .item
        .id
    }

    fn cash_bill(item_id: i64, quantity: i64, total: Money) -> NewBill {
        NewBill {
            lines: vec![BillLine { item_id, quantity, unit_price: None }],
            discount_percent: 0.0,
            payment_mode: PaymentMode::Cash,
            payment_cash: total,
            payment_online: Money::zero(),
            payment_credit: Money::zero(),
            final_amount: None,
            notes: None,
        }
    }

    fn credit_bill(lines: Vec<BillLine>, discount_percent: f64) -> NewBill {
        NewBill {
            lines,
            discount_percent,
            payment_mode: PaymentMode::Credit,
            payment_cash: Money::zero(),
            payment_online: Money::zero(),
            payment_credit: Money::zero(),
            final_amount: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_deducts_stock_and_journals_sale() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 3200, 10).await;

        let record = create_bill(&db, cash_bill(item_id, 4, Money::from_paise(12800)))
            .await
            .unwrap();

        assert_eq!(record.bill.subtotal_paise, 12800);
        assert_eq!(record.bill.total_amount_paise, 12800);
        assert_eq!(record.bill.payment_status, PaymentStatus::Paid);
        assert!(!record.bill.is_credit);
        assert!(record.bill.paid_at.is_some());

        let batch = get_batch(&db, item_id).await.unwrap();
        assert_eq!(batch.stock, 6);

        // Exactly one SALE movement of delta -4; ledger still reconciles.
        {
            let mut conn = db.pool().acquire().await.unwrap();
            assert_eq!(sum_deltas(&mut conn, item_id).await.unwrap(), 6);
        }
        let page = crate::engine::ledger::item_ledger(
            &db,
            item_id,
            crate::engine::ledger::LedgerQuery {
                reason: Some(MovementReason::Sale),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].delta, -4);
        assert_eq!(page.entries[0].ref_id, Some(record.bill.id));

        let payments = list_payments(&db, record.bill.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert!(payments[0].is_auto);
        assert_eq!(payments[0].cash_paise, 12800);
    }

    #[tokio::test]
    async fn test_split_validation_spec_case() {
        // Subtotal 1000.00, discount 10% → total 900.00.
        let db = test_db().await;
        let item_id = seeded_item(&db, "Tonic", 100000, 10).await;

        let base = NewBill {
            lines: vec![BillLine { item_id, quantity: 1, unit_price: None }],
            discount_percent: 10.0,
            payment_mode: PaymentMode::Split,
            payment_cash: Money::from_rupees(500),
            payment_online: Money::from_rupees(400),
            payment_credit: Money::zero(),
            final_amount: None,
            notes: None,
        };

        // cash 500 + online 400 = 900 → accepted
        let ok = create_bill(&db, base.clone()).await.unwrap();
        assert_eq!(ok.bill.total_amount_paise, 90000);
        assert_eq!(ok.bill.payment_status, PaymentStatus::Paid);

        // cash 500 + online 399 → rejected, nothing written
        let stock_before = get_batch(&db, item_id).await.unwrap().stock;
        let bad = NewBill { payment_online: Money::from_rupees(399), ..base };
        let err = create_bill(&db, bad).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::SplitMustEqualTotal)
        ));
        assert_eq!(get_batch(&db, item_id).await.unwrap().stock, stock_before);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rejected_before_any_write() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 3200, 3).await;

        let err = create_bill(&db, cash_bill(item_id, 5, Money::from_paise(16000)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::InsufficientStock { available: 3, .. })
        ));

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(sum_deltas(&mut conn, item_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_lines_checked_cumulatively() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 1000, 5).await;

        let input = NewBill {
            lines: vec![
                BillLine { item_id, quantity: 3, unit_price: None },
                BillLine { item_id, quantity: 3, unit_price: None },
            ],
            discount_percent: 0.0,
            payment_mode: PaymentMode::Cash,
            payment_cash: Money::from_paise(6000),
            payment_online: Money::zero(),
            payment_credit: Money::zero(),
            final_amount: None,
            notes: None,
        };
        assert!(create_bill(&db, input).await.is_err());
    }

    #[tokio::test]
    async fn test_custom_unit_price_snapshot() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 3200, 10).await;

        let input = NewBill {
            lines: vec![BillLine {
                item_id,
                quantity: 2,
                unit_price: Some(Money::from_paise(3000)),
            }],
            discount_percent: 0.0,
            payment_mode: PaymentMode::Cash,
            payment_cash: Money::from_paise(6000),
            payment_online: Money::zero(),
            payment_credit: Money::zero(),
            final_amount: None,
            notes: None,
        };
        let record = create_bill(&db, input).await.unwrap();
        assert_eq!(record.items[0].mrp_paise, 3000);
        assert_eq!(record.items[0].line_total_paise, 6000);

        // The batch's own MRP is untouched.
        assert_eq!(get_batch(&db, item_id).await.unwrap().mrp_paise, 3200);
    }

    #[tokio::test]
    async fn test_manual_final_amount_overrides_total() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 3200, 10).await;

        let input = NewBill {
            final_amount: Some(Money::from_paise(6000)),
            ..cash_bill(item_id, 2, Money::from_paise(6000))
        };
        let record = create_bill(&db, input).await.unwrap();
        assert_eq!(record.bill.subtotal_paise, 6400);
        assert_eq!(record.bill.total_amount_paise, 6000);
    }

    #[tokio::test]
    async fn test_credit_settlement_transitions() {
        // Total 1000: receipts of 300, then 400 (still PARTIAL), then 300
        // (PAID with paid_at set).
        let db = test_db().await;
        let item_id = seeded_item(&db, "Tonic", 100000, 5).await;

        let record = create_bill(
            &db,
            credit_bill(vec![BillLine { item_id, quantity: 1, unit_price: None }], 0.0),
        )
        .await
        .unwrap();
        let bill_id = record.bill.id;
        assert_eq!(record.bill.payment_status, PaymentStatus::Unpaid);
        assert!(record.bill.is_credit);
        assert!(record.bill.paid_at.is_none());

        let pay = |amount: i64| ReceivePayment {
            mode: PaymentMode::Cash,
            cash: Money::from_rupees(amount),
            online: Money::zero(),
            note: None,
        };

        let o1 = receive_payment(&db, bill_id, pay(300)).await.unwrap();
        assert_eq!(o1.payment_status, PaymentStatus::Partial);
        assert_eq!(o1.paid_amount, Money::from_rupees(300));

        let o2 = receive_payment(&db, bill_id, pay(400)).await.unwrap();
        assert_eq!(o2.payment_status, PaymentStatus::Partial);
        assert_eq!(o2.pending_amount, Money::from_rupees(300));

        let o3 = receive_payment(&db, bill_id, pay(300)).await.unwrap();
        assert_eq!(o3.payment_status, PaymentStatus::Paid);
        assert_eq!(o3.pending_amount, Money::zero());

        let settled = get_bill(&db, bill_id).await.unwrap().bill;
        assert!(settled.paid_at.is_some());
        assert!(!settled.is_credit);
        assert_eq!(settled.paid_amount_paise, 100000);
    }

    #[tokio::test]
    async fn test_receive_payment_mode_rules() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Tonic", 50000, 5).await;
        let record = create_bill(
            &db,
            credit_bill(vec![BillLine { item_id, quantity: 1, unit_price: None }], 0.0),
        )
        .await
        .unwrap();

        let bad = ReceivePayment {
            mode: PaymentMode::Cash,
            cash: Money::from_rupees(100),
            online: Money::from_rupees(50),
            note: None,
        };
        assert!(matches!(
            receive_payment(&db, record.bill.id, bad).await,
            Err(EngineError::Validation(ValidationError::CashModeHasOnline))
        ));

        let zero = ReceivePayment {
            mode: PaymentMode::Split,
            cash: Money::zero(),
            online: Money::zero(),
            note: None,
        };
        assert!(matches!(
            receive_payment(&db, record.bill.id, zero).await,
            Err(EngineError::Validation(ValidationError::NonPositivePayment))
        ));
    }

    #[tokio::test]
    async fn test_edit_restores_and_consumes_stock() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 1000, 10).await;

        let record = create_bill(&db, cash_bill(item_id, 5, Money::from_paise(5000)))
            .await
            .unwrap();
        assert_eq!(get_batch(&db, item_id).await.unwrap().stock, 5);

        // 5 → 2: restores 3 units with one BILL_EDIT movement of +3.
        let edited = edit_bill(&db, record.bill.id, cash_bill(item_id, 2, Money::from_paise(2000)))
            .await
            .unwrap();
        assert_eq!(edited.bill.total_amount_paise, 2000);
        assert_eq!(edited.items.len(), 1);
        assert_eq!(edited.items[0].quantity, 2);
        assert_eq!(get_batch(&db, item_id).await.unwrap().stock, 8);

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(sum_deltas(&mut conn, item_id).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_edit_rejects_increase_beyond_stock() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 1000, 5).await;

        let record = create_bill(&db, cash_bill(item_id, 5, Money::from_paise(5000)))
            .await
            .unwrap();

        // Sold 5 of 5; raising to 11 needs one more than ever existed.
        let err = edit_bill(&db, record.bill.id, cash_bill(item_id, 11, Money::from_paise(11000)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::InsufficientStock { .. })
        ));

        // Nothing changed.
        assert_eq!(get_batch(&db, item_id).await.unwrap().stock, 0);
        let unchanged = get_bill(&db, record.bill.id).await.unwrap();
        assert_eq!(unchanged.items[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_edit_rejected_after_manual_receipt() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Tonic", 50000, 5).await;
        let record = create_bill(
            &db,
            credit_bill(vec![BillLine { item_id, quantity: 1, unit_price: None }], 0.0),
        )
        .await
        .unwrap();

        receive_payment(
            &db,
            record.bill.id,
            ReceivePayment {
                mode: PaymentMode::Cash,
                cash: Money::from_rupees(100),
                online: Money::zero(),
                note: None,
            },
        )
        .await
        .unwrap();

        let err = edit_bill(&db, record.bill.id, cash_bill(item_id, 1, Money::from_paise(50000)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Conflict(ConflictError::BillHasManualReceipts { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_receipt_alone_does_not_block_edit() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 1000, 10).await;
        let record = create_bill(&db, cash_bill(item_id, 2, Money::from_paise(2000)))
            .await
            .unwrap();

        let edited = edit_bill(&db, record.bill.id, cash_bill(item_id, 3, Money::from_paise(3000)))
            .await
            .unwrap();
        assert_eq!(edited.bill.total_amount_paise, 3000);

        // Still exactly one auto receipt, regenerated at the new amount.
        let payments = list_payments(&db, record.bill.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert!(payments[0].is_auto);
        assert_eq!(payments[0].cash_paise, 3000);
    }

    #[tokio::test]
    async fn test_soft_delete_blocks_mutations_keeps_stock() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 1000, 10).await;
        let record = create_bill(&db, cash_bill(item_id, 4, Money::from_paise(4000)))
            .await
            .unwrap();

        let deleted = delete_bill(&db, record.bill.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(deleted.deleted_at.is_some());

        // Deletion is a reporting flag: inventory is NOT restored.
        assert_eq!(get_batch(&db, item_id).await.unwrap().stock, 6);

        let err = receive_payment(
            &db,
            record.bill.id,
            ReceivePayment {
                mode: PaymentMode::Cash,
                cash: Money::from_rupees(1),
                online: Money::zero(),
                note: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(ConflictError::BillDeleted { .. })));

        let recovered = recover_bill(&db, record.bill.id).await.unwrap();
        assert!(!recovered.is_deleted);
        assert!(recovered.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_list_bills_search_and_paging() {
        let db = test_db().await;
        let dolo = seeded_item(&db, "Dolo 650", 1000, 50).await;
        let crocin = seeded_item(&db, "Crocin", 2000, 50).await;

        create_bill(&db, cash_bill(dolo, 1, Money::from_paise(1000))).await.unwrap();
        create_bill(&db, cash_bill(crocin, 1, Money::from_paise(2000))).await.unwrap();
        let deleted = create_bill(&db, cash_bill(dolo, 1, Money::from_paise(1000)))
            .await
            .unwrap();
        delete_bill(&db, deleted.bill.id).await.unwrap();

        // Deleted bills are hidden by default.
        let page = list_bills(&db, BillQuery::default()).await.unwrap();
        assert_eq!(page.bills.len(), 2);
        assert!(page.next_offset.is_none());

        // Free text matches line item names.
        let page = list_bills(&db, BillQuery { query: "crocin".to_string(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.bills.len(), 1);
        assert_eq!(page.bills[0].items[0].item_name, "Crocin");

        let page = list_bills(&db, BillQuery { include_deleted: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.bills.len(), 3);
    }

    #[tokio::test]
    async fn test_payments_summary_counts_auto_and_manual_receipts() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 1000, 50).await;

        create_bill(&db, cash_bill(item_id, 2, Money::from_paise(2000))).await.unwrap();
        let credit = create_bill(
            &db,
            credit_bill(vec![BillLine { item_id, quantity: 3, unit_price: None }], 0.0),
        )
        .await
        .unwrap();
        receive_payment(
            &db,
            credit.bill.id,
            ReceivePayment {
                mode: PaymentMode::Online,
                cash: Money::zero(),
                online: Money::from_paise(1500),
                note: None,
            },
        )
        .await
        .unwrap();

        let summary = payments_summary(&db, None, None).await.unwrap();
        assert_eq!(summary.cash_collected, Money::from_paise(2000));
        assert_eq!(summary.online_collected, Money::from_paise(1500));
        assert_eq!(summary.total_collected, Money::from_paise(3500));
        assert_eq!(summary.count, 2);
    }

    #[tokio::test]
    async fn test_sales_aggregate_clamps_pending() {
        let db = test_db().await;
        let item_id = seeded_item(&db, "Dolo 650", 1000, 50).await;
        create_bill(&db, cash_bill(item_id, 2, Money::from_paise(2000))).await.unwrap();
        create_bill(
            &db,
            credit_bill(vec![BillLine { item_id, quantity: 1, unit_price: None }], 0.0),
        )
        .await
        .unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let buckets = sales_aggregate(&db, &today, &today, AggregatePeriod::Day).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].bills_count, 2);
        assert_eq!(buckets[0].gross_sales, Money::from_paise(3000));
        assert_eq!(buckets[0].paid_total, Money::from_paise(2000));
        assert_eq!(buckets[0].pending_total, Money::from_paise(1000));
    }
}
