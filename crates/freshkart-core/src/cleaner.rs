use std::collections::HashSet;

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::{PipelineConfig, RunDate};
use crate::error::Result;
use crate::frames::{without_source_row, IS_ACTIVE, ORDER_ID, PAYMENT_STATUS, UNIT_PRICE};
use crate::model::PAID;
use crate::sink;

/// How many rows each silent filter removed. Purely diagnostic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub inactive_customers: usize,
    pub unpaid_orders: usize,
    pub unpaid_items: usize,
    pub duplicate_orders: usize,
    pub duplicate_order_items: usize,
    pub unmatched_customer_items: usize,
    pub rejected_items: usize,
}

#[derive(Debug, Clone)]
pub struct CleanedData {
    pub customers: DataFrame,
    pub orders: DataFrame,
    pub valid_items: DataFrame,
    pub rejected_items: DataFrame,
    pub drops: DropCounts,
}

/// Items split on `unit_price`: negatives are rejected, zero is valid.
#[derive(Debug, Clone)]
pub struct PriceSplit {
    pub valid: DataFrame,
    pub rejected: DataFrame,
}

pub fn filter_active_customers(customers: &DataFrame) -> PolarsResult<DataFrame> {
    customers
        .clone()
        .lazy()
        .filter(col(IS_ACTIVE).eq(lit(true)))
        .collect()
}

pub fn filter_paid_orders(orders: &DataFrame) -> PolarsResult<DataFrame> {
    filter_paid(orders)
}

pub fn filter_paid_items(items: &DataFrame) -> PolarsResult<DataFrame> {
    filter_paid(items)
}

fn filter_paid(df: &DataFrame) -> PolarsResult<DataFrame> {
    df.clone()
        .lazy()
        .filter(col(PAYMENT_STATUS).eq(lit(PAID)))
        .collect()
}

/// Keeps the first row seen for each `order_id`, preserving input order.
pub fn dedup_orders(orders: &DataFrame) -> PolarsResult<DataFrame> {
    let order_ids = orders.column(ORDER_ID)?.str()?;
    let mut seen = HashSet::with_capacity(orders.height());
    let keep: Vec<bool> = order_ids.into_iter().map(|id| seen.insert(id)).collect();
    orders.filter(&BooleanChunked::new("keep".into(), keep))
}

pub fn split_items_by_price(items: &DataFrame) -> PolarsResult<PriceSplit> {
    let prices = items.column(UNIT_PRICE)?.f64()?;
    let valid_mask: Vec<bool> = prices
        .into_iter()
        .map(|price| matches!(price, Some(value) if value >= 0.0))
        .collect();
    let rejected_mask: Vec<bool> = valid_mask.iter().map(|valid| !valid).collect();

    Ok(PriceSplit {
        valid: items.filter(&BooleanChunked::new("valid".into(), valid_mask))?,
        rejected: items.filter(&BooleanChunked::new("rejected".into(), rejected_mask))?,
    })
}

/// Applies every cleaning rule. No joins happen here.
pub fn clean(
    customers: &DataFrame,
    orders: &DataFrame,
    items: &DataFrame,
) -> PolarsResult<CleanedData> {
    let active_customers = filter_active_customers(customers)?;
    let paid_orders = filter_paid_orders(orders)?;
    let paid_items = filter_paid_items(items)?;
    let unique_orders = dedup_orders(&paid_orders)?;
    let split = split_items_by_price(&paid_items)?;

    let drops = DropCounts {
        inactive_customers: customers.height() - active_customers.height(),
        unpaid_orders: orders.height() - paid_orders.height(),
        unpaid_items: items.height() - paid_items.height(),
        duplicate_orders: paid_orders.height() - unique_orders.height(),
        rejected_items: split.rejected.height(),
        ..DropCounts::default()
    };

    info!(
        customers = active_customers.height(),
        orders = unique_orders.height(),
        valid_items = split.valid.height(),
        rejected_items = split.rejected.height(),
        "cleaning complete"
    );

    Ok(CleanedData {
        customers: active_customers,
        orders: unique_orders,
        valid_items: split.valid,
        rejected_items: split.rejected,
        drops,
    })
}

/// Writes the rejected items audit file when there is anything to audit.
/// Returns the path written, if any.
pub fn persist_rejected_items(
    rejected: &DataFrame,
    config: &PipelineConfig,
    date: RunDate,
) -> Result<Option<std::path::PathBuf>> {
    if rejected.height() == 0 {
        info!("no rejected items");
        return Ok(None);
    }

    let path = config.rejected_items_path(date);
    let mut audit = without_source_row(rejected)?;
    sink::write_snapshot(&mut audit, &path)?;
    info!(rows = audit.height(), path = %path.display(), "rejected items written");
    Ok(Some(path))
}
