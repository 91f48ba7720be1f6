//! # Return / Exchange Engine
//!
//! Refund proration, the over-return guard, and the composed
//! return-plus-new-bill exchange operation.
//!
//! ## Refund Proration
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  With a source bill:                                                │
//! │                                                                     │
//! │    factor   = bill.total_amount / theoretical total                 │
//! │    per line = mrp × qty × (1 − disc%) × (1 + tax%) × factor         │
//! │                                                                     │
//! │  The factor corrects for a manually overridden bill total; the      │
//! │  whole chain is integer math with one rounding per line             │
//! │  (bazaar_core::proration).                                          │
//! │                                                                     │
//! │  Without a source bill: plain mrp × qty, no proration.              │
//! │                                                                     │
//! │  remaining = sold on bill − already returned (across ALL returns    │
//! │  of the bill, exchanges included, plus earlier lines of THIS        │
//! │  request). Exceeding it is rejected regardless of refund amounts.   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Plain returns accept a declared refund within ±₹5 of the computed
//! subtotal (register round-off). Exchange net dues are exact to the
//! paisa; the asymmetry is intentional, the net is computed server-side.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::billing::BillLine;
use crate::engine::visibility::reconcile_group;
use crate::error::{EngineError, EngineResult};
use crate::pool::Database;
use crate::repository::bill::{self, BillRow, NewPaymentRow};
use crate::repository::item;
use crate::repository::ledger::{self, NewMovement};
use crate::repository::returns as return_repo;
use bazaar_core::billing::effective_unit_price;
use bazaar_core::proration::{prorated_line_total, ProrationFactor};
use bazaar_core::validation::{validate_discount_percent, validate_quantity};
use bazaar_core::{
    Bill, BillItem, ConflictError, Item, Money, MovementReason, PaymentMode, PaymentStatus, Rate,
    Return, ReturnItem, ValidationError, REFUND_ROUND_TOLERANCE,
};

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// One returned line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLine {
    pub item_id: i64,
    pub quantity: i64,
}

/// Input for [`create_return`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReturn {
    /// `None` = no originating bill: refunds at plain MRP.
    pub source_bill_id: Option<i64>,
    pub items: Vec<ReturnLine>,
    pub refund_mode: PaymentMode,
    pub refund_cash: Money,
    pub refund_online: Money,
    pub notes: Option<String>,
}

/// A return with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnWithItems {
    pub record: Return,
    pub items: Vec<ReturnItem>,
}

/// Input for [`create_exchange`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExchange {
    pub source_bill_id: Option<i64>,
    /// What the customer gives back.
    pub return_items: Vec<ReturnLine>,
    /// What the customer takes.
    pub new_items: Vec<BillLine>,
    /// Applies only to the new items.
    pub discount_percent: f64,
    pub payment_mode: PaymentMode,
    pub payment_cash: Money,
    pub payment_online: Money,
    pub refund_cash: Money,
    pub refund_online: Money,
    /// Operator round-off applied to the theoretical net.
    pub rounding_adjustment: Money,
    pub notes: Option<String>,
}

/// Result of an exchange: the return, the new bill, and the settled net.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOutcome {
    pub net_due: Money,
    pub theoretical_net: Money,
    pub rounding_adjustment: Money,
    pub return_record: ReturnWithItems,
    pub bill: crate::engine::billing::BillWithItems,
}

/// Per-item return headroom on a bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSummaryRow {
    pub item_id: i64,
    pub item_name: String,
    pub mrp: Money,
    pub sold: i64,
    pub already_returned: i64,
    pub remaining: i64,
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Proration context derived from a source bill.
struct BillContext {
    bill: Bill,
    sold: HashMap<i64, i64>,
    returned: HashMap<i64, i64>,
    discount: Rate,
    tax: Rate,
    factor: ProrationFactor,
}

async fn load_bill_context(
    tx: &mut sqlx::SqliteConnection,
    bill_id: i64,
) -> EngineResult<BillContext> {
    let bill_row = bill::get(tx, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;

    let sold = return_repo::sold_quantities(tx, bill_id).await?;
    let returned = return_repo::returned_quantities(tx, bill_id).await?;

    let discount = Rate::from_bps(bill_row.discount_bps.max(0) as u32);
    let tax = Rate::from_bps(bill_row.tax_bps.max(0) as u32);
    let factor =
        ProrationFactor::for_bill(bill_row.subtotal(), discount, tax, bill_row.total_amount());

    Ok(BillContext { bill: bill_row, sold, returned, discount, tax, factor })
}

/// A validated, priced return line.
struct ReturnLinePlan {
    item: Item,
    quantity: i64,
    line_total: Money,
}

/// Validates quantities against the remaining-returnable headroom and
/// prices each line (prorated when a bill context exists).
///
/// Duplicate lines for one item are counted cumulatively, so a single
/// request can never slip past the per-bill return cap.
async fn plan_return_lines(
    tx: &mut sqlx::SqliteConnection,
    lines: &[ReturnLine],
    ctx: Option<&BillContext>,
) -> EngineResult<(Vec<ReturnLinePlan>, Money)> {
    let mut plans = Vec::with_capacity(lines.len());
    let mut subtotal = Money::zero();
    let mut pending: HashMap<i64, i64> = HashMap::new();

    for line in lines {
        validate_quantity(line.quantity)?;
        let batch = item::get(tx, line.item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Item", line.item_id))?;

        if let Some(ctx) = ctx {
            let sold = ctx.sold.get(&batch.id).copied().unwrap_or(0);
            if sold == 0 {
                return Err(ConflictError::NotOnBill {
                    item_name: batch.name.clone(),
                    bill_id: ctx.bill.id,
                }
                .into());
            }
            let already = ctx.returned.get(&batch.id).copied().unwrap_or(0)
                + pending.get(&batch.id).copied().unwrap_or(0);
            let remaining = (sold - already).max(0);
            if remaining <= 0 {
                return Err(ConflictError::NothingToReturn { item_name: batch.name.clone() }.into());
            }
            if line.quantity > remaining {
                return Err(ConflictError::ReturnExceedsRemaining {
                    item_name: batch.name.clone(),
                    remaining,
                }
                .into());
            }
        }

        let (discount, tax, factor) = match ctx {
            Some(ctx) => (ctx.discount, ctx.tax, ctx.factor),
            None => (Rate::zero(), Rate::zero(), ProrationFactor::unity()),
        };
        let line_total = prorated_line_total(batch.mrp(), line.quantity, discount, tax, factor);
        subtotal += line_total;

        *pending.entry(batch.id).or_insert(0) += line.quantity;
        plans.push(ReturnLinePlan { item: batch, quantity: line.quantity, line_total });
    }

    Ok((plans, subtotal))
}

/// Restocks every planned line: stock increment + ledger row + return_items
/// row, all through the caller's transaction.
async fn apply_return_lines(
    tx: &mut sqlx::SqliteConnection,
    return_id: i64,
    plans: &[ReturnLinePlan],
    reason: MovementReason,
    ref_type: &str,
    note: &str,
    now: chrono::DateTime<Utc>,
) -> EngineResult<()> {
    for plan in plans {
        item::increment_stock(tx, plan.item.id, plan.quantity, now).await?;
        ledger::append(
            tx,
            &NewMovement {
                item_id: plan.item.id,
                delta: plan.quantity,
                reason,
                ref_type,
                ref_id: Some(return_id),
                note: Some(note.to_string()),
                actor: None,
            },
            now,
        )
        .await?;
        return_repo::insert_item(
            tx,
            return_id,
            plan.item.id,
            &plan.item.name,
            plan.item.mrp_paise,
            plan.quantity,
            plan.line_total.paise(),
        )
        .await?;
    }
    Ok(())
}

async fn reconcile_groups(
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

// =============================================================================
// Return
// =============================================================================

/// Creates a return: prorates the refund against the source bill (when
/// given), enforces the remaining-quantity cap, restocks, and journals a
/// RETURN movement per line. One commit.
pub async fn create_return(db: &Database, input: NewReturn) -> EngineResult<ReturnWithItems> {
    if input.items.is_empty() {
        return Err(ValidationError::EmptyReturn.into());
    }
    if input.refund_mode == PaymentMode::Credit {
        return Err(ValidationError::InvalidRefundMode.into());
    }
    for (field, amount) in [("refund_cash", input.refund_cash), ("refund_online", input.refund_online)] {
        if amount.is_negative() {
            return Err(ValidationError::NegativeAmount { field: field.to_string() }.into());
        }
    }

    let mut tx = db.begin().await?;
    let now = Utc::now();

    let ctx = match input.source_bill_id {
        Some(bill_id) => Some(load_bill_context(&mut tx, bill_id).await?),
        None => None,
    };

    let (plans, subtotal_return) = plan_return_lines(&mut tx, &input.items, ctx.as_ref()).await?;

    // Declared refund must land within the register round-off tolerance.
    let (refund_cash, refund_online) = match input.refund_mode {
        PaymentMode::Cash => {
            check_tolerance("refund_cash", input.refund_cash, subtotal_return)?;
            (input.refund_cash, Money::zero())
        }
        PaymentMode::Online => {
            check_tolerance("refund_online", input.refund_online, subtotal_return)?;
            (Money::zero(), input.refund_online)
        }
        PaymentMode::Split => {
            check_tolerance(
                "refund_cash + refund_online",
                input.refund_cash + input.refund_online,
                subtotal_return,
            )?;
            (input.refund_cash, input.refund_online)
        }
        PaymentMode::Credit => unreachable!("rejected above"),
    };

    let return_id = return_repo::insert(
        &mut tx,
        &return_repo::NewReturnRow {
            source_bill_id: input.source_bill_id,
            subtotal_return_paise: subtotal_return.paise(),
            refund_cash_paise: refund_cash.paise(),
            refund_online_paise: refund_online.paise(),
            rounding_adjustment_paise: 0,
            notes: input.notes.clone(),
        },
        now,
    )
    .await?;

    apply_return_lines(
        &mut tx,
        return_id,
        &plans,
        MovementReason::Return,
        "RETURN",
        &format!("Return #{return_id}"),
        now,
    )
    .await?;

    reconcile_groups(&mut tx, plans.iter().map(|p| &p.item), now).await?;

    let record = load_return(&mut tx, return_id).await?;
    tx.commit().await?;

    info!(return_id, refund = %subtotal_return, "Return created");
    Ok(record)
}

fn check_tolerance(field: &str, declared: Money, computed: Money) -> EngineResult<()> {
    if (declared - computed).abs() > REFUND_ROUND_TOLERANCE {
        return Err(ValidationError::RefundOutsideTolerance {
            field: field.to_string(),
            tolerance: REFUND_ROUND_TOLERANCE,
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Exchange
// =============================================================================

/// Creates a return AND a new bill in one transaction, settled against
/// each other.
///
/// `net_due = (new bill total − return subtotal) + rounding_adjustment`.
/// Positive nets must be paid exactly; negative nets refunded exactly.
pub async fn create_exchange(db: &Database, input: NewExchange) -> EngineResult<ExchangeOutcome> {
    if input.return_items.is_empty() || input.new_items.is_empty() {
        return Err(ValidationError::EmptyExchange.into());
    }
    if input.payment_mode == PaymentMode::Credit {
        return Err(ValidationError::InvalidExchangeMode.into());
    }
    let discount = validate_discount_percent(input.discount_percent)?;
    for (field, amount) in [
        ("payment_cash", input.payment_cash),
        ("payment_online", input.payment_online),
        ("refund_cash", input.refund_cash),
        ("refund_online", input.refund_online),
    ] {
        if amount.is_negative() {
            return Err(ValidationError::NegativeAmount { field: field.to_string() }.into());
        }
    }

    let mut tx = db.begin().await?;
    let now = Utc::now();

    let ctx = match input.source_bill_id {
        Some(bill_id) => Some(load_bill_context(&mut tx, bill_id).await?),
        None => None,
    };

    // 1) Return side: headroom + proration.
    let (return_plans, return_subtotal) =
        plan_return_lines(&mut tx, &input.return_items, ctx.as_ref()).await?;

    // Units coming back in THIS exchange count as sellable for the new
    // side; they are restocked before the deduction in the same commit.
    let mut incoming: HashMap<i64, i64> = HashMap::new();
    for plan in &return_plans {
        *incoming.entry(plan.item.id).or_insert(0) += plan.quantity;
    }

    // 2) New side: price and check availability.
    struct NewLinePlan {
        item: Item,
        quantity: i64,
        unit_price: Money,
        line_total: Money,
    }
    let mut new_plans: Vec<NewLinePlan> = Vec::with_capacity(input.new_items.len());
    let mut bill_subtotal = Money::zero();
    let mut requested: HashMap<i64, i64> = HashMap::new();
    for line in &input.new_items {
        validate_quantity(line.quantity)?;
        let batch = item::get(&mut tx, line.item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Item", line.item_id))?;

        let unit_price = effective_unit_price(batch.mrp(), line.unit_price);
        let line_total = unit_price * line.quantity;
        bill_subtotal += line_total;

        let total_requested = requested.entry(batch.id).or_insert(0);
        *total_requested += line.quantity;
        let available = batch.stock + incoming.get(&batch.id).copied().unwrap_or(0);
        if *total_requested > available {
            return Err(ValidationError::InsufficientStock {
                name: batch.name.clone(),
                available,
                requested: *total_requested,
            }
            .into());
        }

        new_plans.push(NewLinePlan { item: batch, quantity: line.quantity, unit_price, line_total });
    }

    let bill_total = bill_subtotal.apply_discount(discount);

    // 3) Net settlement, exact to the paisa.
    let theoretical_net = bill_total - return_subtotal;
    let net_due = theoretical_net + input.rounding_adjustment;

    let (bill_cash, bill_online, refund_cash, refund_online) = if net_due.is_positive() {
        let ok = match input.payment_mode {
            PaymentMode::Cash => input.payment_cash == net_due,
            PaymentMode::Online => input.payment_online == net_due,
            PaymentMode::Split => input.payment_cash + input.payment_online == net_due,
            PaymentMode::Credit => unreachable!("rejected above"),
        };
        if !ok {
            return Err(ConflictError::ExchangePaymentMismatch { net_due }.into());
        }
        let (cash, online) = match input.payment_mode {
            PaymentMode::Cash => (net_due, Money::zero()),
            PaymentMode::Online => (Money::zero(), net_due),
            _ => (input.payment_cash, input.payment_online),
        };
        (cash, online, Money::zero(), Money::zero())
    } else if net_due.is_negative() {
        if input.refund_cash + input.refund_online != net_due.abs() {
            return Err(ConflictError::ExchangeRefundMismatch { refund_due: net_due.abs() }.into());
        }
        (Money::zero(), Money::zero(), input.refund_cash, input.refund_online)
    } else {
        (Money::zero(), Money::zero(), Money::zero(), Money::zero())
    };

    // 4) Writes: return + restock, then bill + deduction, one commit.
    let return_id = return_repo::insert(
        &mut tx,
        &return_repo::NewReturnRow {
            source_bill_id: input.source_bill_id,
            subtotal_return_paise: return_subtotal.paise(),
            refund_cash_paise: refund_cash.paise(),
            refund_online_paise: refund_online.paise(),
            rounding_adjustment_paise: input.rounding_adjustment.paise(),
            notes: input.notes.clone(),
        },
        now,
    )
    .await?;

    apply_return_lines(
        &mut tx,
        return_id,
        &return_plans,
        MovementReason::ExchangeIn,
        "EXCHANGE",
        &format!("Exchange return #{return_id}"),
        now,
    )
    .await?;

    // The exchange bill is settled in kind: goods credit plus the money
    // collected cover it exactly, so it is born PAID. paid_amount records
    // the full settled value; the receipt row records only the money part.
    let paid_now = bill_cash + bill_online;
    let bill_id = bill::insert(
        &mut tx,
        &BillRow {
            discount_bps: discount.bps() as i64,
            tax_bps: 0,
            subtotal_paise: bill_subtotal.paise(),
            total_amount_paise: bill_total.paise(),
            payment_mode: input.payment_mode,
            payment_cash_paise: bill_cash.paise(),
            payment_online_paise: bill_online.paise(),
            is_credit: false,
            payment_status: PaymentStatus::Paid,
            paid_amount_paise: bill_total.paise(),
            paid_at: Some(now),
            notes: input.notes.clone(),
        },
        now,
    )
    .await?;

    for plan in &new_plans {
        if !item::try_decrement_stock(&mut tx, plan.item.id, plan.quantity, now).await? {
            return Err(ValidationError::InsufficientStock {
                name: plan.item.name.clone(),
                available: plan.item.stock,
                requested: plan.quantity,
            }
            .into());
        }
        ledger::append(
            &mut tx,
            &NewMovement {
                item_id: plan.item.id,
                delta: -plan.quantity,
                reason: MovementReason::ExchangeOut,
                ref_type: "EXCHANGE",
                ref_id: Some(bill_id),
                note: Some(format!("Exchange bill #{bill_id}")),
                actor: None,
            },
            now,
        )
        .await?;
        bill::insert_item(
            &mut tx,
            bill_id,
            plan.item.id,
            &plan.item.name,
            plan.unit_price.paise(),
            plan.quantity,
            plan.line_total.paise(),
        )
        .await?;
    }

    if paid_now.is_positive() {
        bill::insert_payment(
            &mut tx,
            &NewPaymentRow {
                bill_id,
                mode: input.payment_mode,
                cash_paise: bill_cash.paise(),
                online_paise: bill_online.paise(),
                is_auto: true,
                note: Some("auto: payment at exchange".to_string()),
            },
            now,
        )
        .await?;
    }

    reconcile_groups(
        &mut tx,
        return_plans.iter().map(|p| &p.item).chain(new_plans.iter().map(|p| &p.item)),
        now,
    )
    .await?;

    let return_record = load_return(&mut tx, return_id).await?;
    let bill_record = {
        let bill_row = bill::get(&mut tx, bill_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;
        let items = bill::items_for_bill(&mut tx, bill_id).await?;
        crate::engine::billing::BillWithItems { bill: bill_row, items }
    };
    tx.commit().await?;

    info!(return_id, bill_id, net_due = %net_due, "Exchange created");
    Ok(ExchangeOutcome {
        net_due,
        theoretical_net,
        rounding_adjustment: input.rounding_adjustment,
        return_record,
        bill: bill_record,
    })
}

// =============================================================================
// Reads
// =============================================================================

async fn load_return(tx: &mut sqlx::SqliteConnection, return_id: i64) -> EngineResult<ReturnWithItems> {
    let record = return_repo::get(tx, return_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Return", return_id))?;
    let items = return_repo::items_for_return(tx, return_id).await?;
    Ok(ReturnWithItems { record, items })
}

/// Gets one return with its lines.
pub async fn get_return(db: &Database, return_id: i64) -> EngineResult<ReturnWithItems> {
    let mut conn = db.pool().acquire().await?;
    load_return(&mut conn, return_id).await
}

/// Newest-first returns, date-filterable.
pub async fn list_returns(
    db: &Database,
    from_date: Option<&str>,
    to_date: Option<&str>,
    limit: i64,
    offset: i64,
) -> EngineResult<Vec<ReturnWithItems>> {
    let limit = limit.clamp(1, 500);
    let offset = offset.max(0);

    let mut conn = db.pool().acquire().await?;
    let rows = return_repo::list(&mut conn, from_date, to_date, limit, offset).await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let items = return_repo::items_for_return(&mut conn, row.id).await?;
        out.push(ReturnWithItems { record: row, items });
    }
    Ok(out)
}

/// Per-item sold / already-returned / remaining for a bill. Backs the
/// over-return guard in the UI.
pub async fn bill_return_summary(db: &Database, bill_id: i64) -> EngineResult<Vec<ReturnSummaryRow>> {
    let mut conn = db.pool().acquire().await?;

    bill::get(&mut conn, bill_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Bill", bill_id))?;

    let bill_items: Vec<BillItem> = bill::items_for_bill(&mut conn, bill_id).await?;
    let sold = return_repo::sold_quantities(&mut conn, bill_id).await?;
    let returned = return_repo::returned_quantities(&mut conn, bill_id).await?;

    let mut seen: HashSet<i64> = HashSet::new();
    let mut out = Vec::new();
    for line in bill_items {
        if !seen.insert(line.item_id) {
            continue;
        }
        let sold_qty = sold.get(&line.item_id).copied().unwrap_or(0);
        let already = returned.get(&line.item_id).copied().unwrap_or(0);
        let mrp = line.mrp();
        out.push(ReturnSummaryRow {
            item_id: line.item_id,
            item_name: line.item_name,
            mrp,
            sold: sold_qty,
            already_returned: already,
            remaining: (sold_qty - already).max(0),
        });
    }
    Ok(out)
}

// =============================================================================
// Unit Tests
// =============================================================================
