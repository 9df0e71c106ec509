use polars::prelude::*;
use tracing::info;

use crate::frames::{
    without_source_row, AMOUNT, CHANNEL, CITY, CREATED_AT, CUSTOMER_ID, GROSS_REVENUE, LINE_TOTAL,
    NET_REVENUE, ORDER_ID, QTY, REFUNDS_AMOUNT, SOURCE_ROW, UNIT_PRICE,
};

const ROW_INDEX: &str = "__row_index";

#[derive(Debug, Clone)]
pub struct EnrichedData {
    /// Valid items with `city` and `line_total` attached.
    pub items: DataFrame,
    /// One row per order: gross revenue, refunds and net revenue.
    pub order_revenue: DataFrame,
    /// Items discarded because their order record lost deduplication.
    pub duplicate_order_items: usize,
    /// Items discarded because their customer is inactive or unknown.
    pub unmatched_customer_items: usize,
}

/// Drops items whose originating order record was not retained. When the item frame has no
/// `source_row` column the match falls back to `order_id` alone.
pub fn restrict_to_retained_orders(items: &DataFrame, orders: &DataFrame) -> PolarsResult<DataFrame> {
    let has_position = [items, orders].iter().all(|df| {
        df.get_column_names()
            .iter()
            .any(|name| name.as_str() == SOURCE_ROW)
    });
    let keys = if has_position {
        vec![col(ORDER_ID), col(SOURCE_ROW)]
    } else {
        vec![col(ORDER_ID)]
    };

    items
        .clone()
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(
            orders.clone().lazy().select(keys.clone()),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Semi),
        )
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?
        .drop(ROW_INDEX)
}

/// Attaches the customer's city (inner join: unknown or inactive customers drop out) and the
/// per-line total.
pub fn attach_customer_city(items: &DataFrame, customers: &DataFrame) -> PolarsResult<DataFrame> {
    items
        .clone()
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(
            customers.clone().lazy().select([col(CUSTOMER_ID), col(CITY)]),
            [col(CUSTOMER_ID)],
            [col(CUSTOMER_ID)],
            JoinArgs::new(JoinType::Inner),
        )
        .with_column((col(QTY).cast(DataType::Float64) * col(UNIT_PRICE)).alias(LINE_TOTAL))
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?
        .drop(ROW_INDEX)
}

/// Items whose `customer_id` has no row in `customers`. Repeated customer rows never change
/// the result.
pub fn items_without_customer(items: &DataFrame, customers: &DataFrame) -> PolarsResult<DataFrame> {
    items
        .clone()
        .lazy()
        .join(
            customers.clone().lazy().select([col(CUSTOMER_ID)]),
            [col(CUSTOMER_ID)],
            [col(CUSTOMER_ID)],
            JoinArgs::new(JoinType::Anti),
        )
        .collect()
}

/// Folds item rows to one row per order. Order-level fields take their first-seen value.
pub fn order_gross_revenue(items: &DataFrame) -> PolarsResult<DataFrame> {
    items
        .clone()
        .lazy()
        .group_by_stable([col(ORDER_ID)])
        .agg([
            col(LINE_TOTAL).sum().alias(GROSS_REVENUE),
            col(CUSTOMER_ID).first(),
            col(CHANNEL).first(),
            col(CITY).first(),
            col(CREATED_AT).first(),
        ])
        .sort([ORDER_ID], SortMultipleOptions::default())
        .collect()
}

/// Sums refunds per order, considering only orders present in `order_revenue`.
pub fn refunds_by_order(refunds: &DataFrame, order_revenue: &DataFrame) -> PolarsResult<DataFrame> {
    refunds
        .clone()
        .lazy()
        .join(
            order_revenue.clone().lazy().select([col(ORDER_ID)]),
            [col(ORDER_ID)],
            [col(ORDER_ID)],
            JoinArgs::new(JoinType::Semi),
        )
        .group_by_stable([col(ORDER_ID)])
        .agg([col(AMOUNT).sum().alias(REFUNDS_AMOUNT)])
        .collect()
}

/// Left-joins refund totals (missing means zero) and derives `net_revenue`.
pub fn apply_refunds(order_revenue: &DataFrame, refunds: &DataFrame) -> PolarsResult<DataFrame> {
    let refund_totals = refunds_by_order(refunds, order_revenue)?;

    order_revenue
        .clone()
        .lazy()
        .join(
            refund_totals.lazy(),
            [col(ORDER_ID)],
            [col(ORDER_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(col(REFUNDS_AMOUNT).fill_null(lit(0.0)))
        .with_column((col(GROSS_REVENUE) + col(REFUNDS_AMOUNT)).alias(NET_REVENUE))
        .sort([ORDER_ID], SortMultipleOptions::default())
        .collect()
}

/// Runs the enrichment steps in order: order restriction, customer join, line totals,
/// per-order gross revenue, refunds and net revenue.
pub fn enrich(
    valid_items: &DataFrame,
    customers: &DataFrame,
    orders: &DataFrame,
    refunds: &DataFrame,
) -> PolarsResult<EnrichedData> {
    let retained = restrict_to_retained_orders(valid_items, orders)?;
    let retained = without_source_row(&retained)?;
    let items = attach_customer_city(&retained, customers)?;
    let gross = order_gross_revenue(&items)?;
    let order_revenue = apply_refunds(&gross, refunds)?;

    let duplicate_order_items = valid_items.height().saturating_sub(retained.height());
    let unmatched_customer_items = items_without_customer(&retained, customers)?.height();

    info!(
        items = items.height(),
        orders = order_revenue.height(),
        unmatched_customer_items,
        "enrichment complete"
    );

    Ok(EnrichedData {
        items,
        order_revenue,
        duplicate_order_items,
        unmatched_customer_items,
    })
}
