use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::frames::{
    CHANNEL, CITY, CREATED_AT, CUSTOMER_ID, DAILY_SUMMARY_COLUMNS, DATE, GROSS_REVENUE,
    GROSS_REVENUE_EUR, ITEMS_SOLD, NET_REVENUE, NET_REVENUE_EUR, ORDERS_COUNT, ORDER_FACT_COLUMNS,
    ORDER_ID, QTY, REFUNDS_AMOUNT, REFUNDS_EUR, UNIQUE_CUSTOMERS,
};

const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone)]
pub struct DailyAggregation {
    /// One row per (date, city, channel), sorted by those keys.
    pub daily_summary: DataFrame,
    /// Order revenue rows now carrying `date` and `items_sold`, sorted by `order_id`.
    pub order_revenue: DataFrame,
}

/// Truncates a timestamp to its calendar date. Offsets are kept as written: no conversion.
pub fn order_date(created_at: &str) -> Option<NaiveDate> {
    let value = created_at.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.date_naive());
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|timestamp| timestamp.date())
        .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
}

pub fn attach_order_date(order_revenue: &DataFrame) -> Result<DataFrame> {
    let order_ids = order_revenue.column(ORDER_ID)?.str()?;
    let created_at = order_revenue.column(CREATED_AT)?.str()?;

    let mut dates = Vec::with_capacity(order_revenue.height());
    for idx in 0..order_revenue.height() {
        let value = created_at.get(idx).unwrap_or_default();
        let date = order_date(value).ok_or_else(|| PipelineError::InvalidTimestamp {
            order_id: order_ids.get(idx).unwrap_or_default().to_string(),
            value: value.to_string(),
        })?;
        dates.push(date.format("%Y-%m-%d").to_string());
    }

    let mut output = order_revenue.clone();
    output.with_column(Series::new(DATE.into(), dates))?;
    Ok(output)
}

pub fn items_sold_by_order(items: &DataFrame) -> PolarsResult<DataFrame> {
    items
        .clone()
        .lazy()
        .group_by_stable([col(ORDER_ID)])
        .agg([col(QTY).sum().alias(ITEMS_SOLD)])
        .collect()
}

/// Left-joins item counts; an order without surviving items keeps `items_sold = 0`.
pub fn attach_items_sold(order_revenue: &DataFrame, items: &DataFrame) -> PolarsResult<DataFrame> {
    let counts = items_sold_by_order(items)?;

    order_revenue
        .clone()
        .lazy()
        .join(
            counts.lazy(),
            [col(ORDER_ID)],
            [col(ORDER_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            col(ITEMS_SOLD).fill_null(lit(Scalar::new(DataType::Int64, AnyValue::Int64(0)))),
        )
        .select(
            ORDER_FACT_COLUMNS
                .iter()
                .map(|name| col(*name))
                .collect::<Vec<_>>(),
        )
        .sort([ORDER_ID], SortMultipleOptions::default())
        .collect()
}

pub fn summarize_by_city_channel(order_revenue: &DataFrame) -> PolarsResult<DataFrame> {
    order_revenue
        .clone()
        .lazy()
        .group_by([col(DATE), col(CITY), col(CHANNEL)])
        .agg([
            col(ORDER_ID).count().cast(DataType::Int64).alias(ORDERS_COUNT),
            col(CUSTOMER_ID)
                .n_unique()
                .cast(DataType::Int64)
                .alias(UNIQUE_CUSTOMERS),
            col(ITEMS_SOLD).sum().alias(ITEMS_SOLD),
            col(GROSS_REVENUE).sum().alias(GROSS_REVENUE_EUR),
            col(REFUNDS_AMOUNT).sum().alias(REFUNDS_EUR),
            col(NET_REVENUE).sum().alias(NET_REVENUE_EUR),
        ])
        .select(
            DAILY_SUMMARY_COLUMNS
                .iter()
                .map(|name| col(*name))
                .collect::<Vec<_>>(),
        )
        .sort([DATE, CITY, CHANNEL], SortMultipleOptions::default())
        .collect()
}

pub fn aggregate_daily(order_revenue: &DataFrame, items: &DataFrame) -> Result<DailyAggregation> {
    let dated = attach_order_date(order_revenue)?;
    let order_revenue = attach_items_sold(&dated, items)?;
    let daily_summary = summarize_by_city_channel(&order_revenue)?;

    info!(
        orders = order_revenue.height(),
        summary_rows = daily_summary.height(),
        "aggregation complete"
    );

    Ok(DailyAggregation {
        daily_summary,
        order_revenue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn truncates_naive_timestamps() {
        assert_eq!(order_date("2024-01-15T10:00:00"), Some(ymd(2024, 1, 15)));
        assert_eq!(order_date("2024-01-15 23:59:59.250"), Some(ymd(2024, 1, 15)));
        assert_eq!(order_date("2024-01-15T08:30"), Some(ymd(2024, 1, 15)));
        assert_eq!(order_date("2024-01-15"), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn keeps_offset_local_date() {
        // 23:30 at -05:00 is already the next day in UTC; the written date wins.
        assert_eq!(
            order_date("2024-01-15T23:30:00-05:00"),
            Some(ymd(2024, 1, 15))
        );
        assert_eq!(order_date("2024-01-15T00:10:00Z"), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(order_date("yesterday"), None);
        assert_eq!(order_date(""), None);
    }
}
