//! Column vocabulary shared by every stage, plus conversions between typed records and
//! polars frames.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::model::{
    attribute_text, Customer, DailySummaryFact, Order, OrderItem, OrderRevenueFact, Refund,
};

pub const CUSTOMER_ID: &str = "customer_id";
pub const CITY: &str = "city";
pub const IS_ACTIVE: &str = "is_active";

pub const ORDER_ID: &str = "order_id";
pub const CHANNEL: &str = "channel";
pub const CREATED_AT: &str = "created_at";
pub const PAYMENT_STATUS: &str = "payment_status";
pub const SOURCE_ROW: &str = "source_row";

pub const QTY: &str = "qty";
pub const UNIT_PRICE: &str = "unit_price";
pub const LINE_TOTAL: &str = "line_total";

pub const AMOUNT: &str = "amount";

pub const GROSS_REVENUE: &str = "gross_revenue";
pub const REFUNDS_AMOUNT: &str = "refunds_amount";
pub const NET_REVENUE: &str = "net_revenue";
pub const DATE: &str = "date";
pub const ITEMS_SOLD: &str = "items_sold";

pub const ORDERS_COUNT: &str = "orders_count";
pub const UNIQUE_CUSTOMERS: &str = "unique_customers";
pub const GROSS_REVENUE_EUR: &str = "gross_revenue_eur";
pub const REFUNDS_EUR: &str = "refunds_eur";
pub const NET_REVENUE_EUR: &str = "net_revenue_eur";

/// Column order of `orders_clean`.
pub const ORDER_FACT_COLUMNS: [&str; 10] = [
    ORDER_ID,
    CUSTOMER_ID,
    CHANNEL,
    CITY,
    CREATED_AT,
    DATE,
    ITEMS_SOLD,
    GROSS_REVENUE,
    REFUNDS_AMOUNT,
    NET_REVENUE,
];

/// Column order of the daily summary snapshot and `daily_city_sales`.
pub const DAILY_SUMMARY_COLUMNS: [&str; 9] = [
    DATE,
    CITY,
    CHANNEL,
    ORDERS_COUNT,
    UNIQUE_CUSTOMERS,
    ITEMS_SOLD,
    GROSS_REVENUE_EUR,
    REFUNDS_EUR,
    NET_REVENUE_EUR,
];

/// Order-level or derived columns; item keys with these names are ignored.
const ITEM_RESERVED: [&str; 8] = [
    ORDER_ID,
    CUSTOMER_ID,
    CHANNEL,
    CREATED_AT,
    PAYMENT_STATUS,
    SOURCE_ROW,
    CITY,
    LINE_TOTAL,
];

pub fn customers_frame(customers: &[Customer]) -> PolarsResult<DataFrame> {
    df![
        CUSTOMER_ID => customers.iter().map(|c| c.customer_id.as_str()).collect::<Vec<_>>(),
        CITY => customers.iter().map(|c| c.city.as_str()).collect::<Vec<_>>(),
        IS_ACTIVE => customers.iter().map(|c| c.is_active).collect::<Vec<_>>(),
    ]
}

/// Order-level rows (without line items), tagged with their position in the file.
pub fn orders_frame(orders: &[Order]) -> PolarsResult<DataFrame> {
    df![
        ORDER_ID => orders.iter().map(|o| o.order_id.as_str()).collect::<Vec<_>>(),
        CUSTOMER_ID => orders.iter().map(|o| o.customer_id.as_str()).collect::<Vec<_>>(),
        CHANNEL => orders.iter().map(|o| o.channel.as_str()).collect::<Vec<_>>(),
        CREATED_AT => orders.iter().map(|o| o.created_at.as_str()).collect::<Vec<_>>(),
        PAYMENT_STATUS => orders.iter().map(|o| o.payment_status.as_str()).collect::<Vec<_>>(),
        SOURCE_ROW => (0..orders.len() as i64).collect::<Vec<_>>(),
    ]
}

/// Item rows: the item keys in first-seen file order (`qty` and `unit_price` typed, everything
/// else as text), then the copied order fields and `source_row`.
pub fn items_frame(items: &[OrderItem]) -> PolarsResult<DataFrame> {
    let item_columns = item_columns(items);

    let mut columns: Vec<Column> = Vec::with_capacity(item_columns.len() + 6);
    for name in item_columns {
        let column: Column = match name {
            QTY => Series::new(QTY.into(), items.iter().map(|i| i.qty).collect::<Vec<_>>()).into(),
            UNIT_PRICE => Series::new(
                UNIT_PRICE.into(),
                items.iter().map(|i| i.unit_price).collect::<Vec<_>>(),
            )
            .into(),
            key => {
                let values: Vec<Option<String>> = items
                    .iter()
                    .map(|item| item.attributes.get(key).and_then(attribute_text))
                    .collect();
                Series::new(key.into(), values).into()
            }
        };
        columns.push(column);
    }

    columns.push(text_column(ORDER_ID, items, |i| &i.order_id));
    columns.push(text_column(CUSTOMER_ID, items, |i| &i.customer_id));
    columns.push(text_column(CHANNEL, items, |i| &i.channel));
    columns.push(text_column(CREATED_AT, items, |i| &i.created_at));
    columns.push(text_column(PAYMENT_STATUS, items, |i| &i.payment_status));
    columns.push(
        Series::new(
            SOURCE_ROW.into(),
            items.iter().map(|i| i.source_row).collect::<Vec<_>>(),
        )
        .into(),
    );

    DataFrame::new(columns)
}

pub fn refunds_frame(refunds: &[Refund]) -> PolarsResult<DataFrame> {
    df![
        ORDER_ID => refunds.iter().map(|r| r.order_id.as_str()).collect::<Vec<_>>(),
        AMOUNT => refunds.iter().map(|r| r.amount).collect::<Vec<_>>(),
    ]
}

/// Strips the file-position helper column before a frame leaves the pipeline.
pub fn without_source_row(df: &DataFrame) -> PolarsResult<DataFrame> {
    if df
        .get_column_names()
        .iter()
        .any(|name| name.as_str() == SOURCE_ROW)
    {
        df.drop(SOURCE_ROW)
    } else {
        Ok(df.clone())
    }
}

/// Union of the item keys, ordered by first appearance. Items built in code without the raw
/// object still contribute `qty` and `unit_price` up front.
fn item_columns(items: &[OrderItem]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for item in items {
        let implicit = [QTY, UNIT_PRICE]
            .into_iter()
            .filter(|key| !item.attributes.contains_key(*key));
        let written = item.attributes.keys().map(String::as_str);
        for key in implicit.chain(written) {
            if !ITEM_RESERVED.contains(&key) && !names.contains(&key) {
                names.push(key);
            }
        }
    }
    for key in [QTY, UNIT_PRICE] {
        if !names.contains(&key) {
            names.push(key);
        }
    }
    names
}

fn text_column<F>(name: &str, items: &[OrderItem], field: F) -> Column
where
    F: Fn(&OrderItem) -> &String,
{
    let values: Vec<&str> = items.iter().map(|item| field(item).as_str()).collect();
    Series::new(name.into(), values).into()
}

pub fn order_revenue_facts(df: &DataFrame) -> PolarsResult<Vec<OrderRevenueFact>> {
    let order_ids = df.column(ORDER_ID)?.str()?;
    let customer_ids = df.column(CUSTOMER_ID)?.str()?;
    let channels = df.column(CHANNEL)?.str()?;
    let cities = df.column(CITY)?.str()?;
    let created_at = df.column(CREATED_AT)?.str()?;
    let dates = df.column(DATE)?.str()?;
    let items_sold = df.column(ITEMS_SOLD)?.i64()?;
    let gross = df.column(GROSS_REVENUE)?.f64()?;
    let refunds = df.column(REFUNDS_AMOUNT)?.f64()?;
    let net = df.column(NET_REVENUE)?.f64()?;

    (0..df.height())
        .map(|idx| -> PolarsResult<OrderRevenueFact> {
            Ok(OrderRevenueFact {
                order_id: required(order_ids.get(idx), ORDER_ID, idx)?.to_string(),
                customer_id: required(customer_ids.get(idx), CUSTOMER_ID, idx)?.to_string(),
                channel: required(channels.get(idx), CHANNEL, idx)?.to_string(),
                city: required(cities.get(idx), CITY, idx)?.to_string(),
                created_at: required(created_at.get(idx), CREATED_AT, idx)?.to_string(),
                date: parse_date(required(dates.get(idx), DATE, idx)?)?,
                items_sold: items_sold.get(idx).unwrap_or(0),
                gross_revenue: required(gross.get(idx), GROSS_REVENUE, idx)?,
                refunds_amount: refunds.get(idx).unwrap_or(0.0),
                net_revenue: required(net.get(idx), NET_REVENUE, idx)?,
            })
        })
        .collect()
}

pub fn daily_summary_facts(df: &DataFrame) -> PolarsResult<Vec<DailySummaryFact>> {
    let dates = df.column(DATE)?.str()?;
    let cities = df.column(CITY)?.str()?;
    let channels = df.column(CHANNEL)?.str()?;
    let orders = df.column(ORDERS_COUNT)?.i64()?;
    let customers = df.column(UNIQUE_CUSTOMERS)?.i64()?;
    let items_sold = df.column(ITEMS_SOLD)?.i64()?;
    let gross = df.column(GROSS_REVENUE_EUR)?.f64()?;
    let refunds = df.column(REFUNDS_EUR)?.f64()?;
    let net = df.column(NET_REVENUE_EUR)?.f64()?;

    (0..df.height())
        .map(|idx| -> PolarsResult<DailySummaryFact> {
            Ok(DailySummaryFact {
                date: parse_date(required(dates.get(idx), DATE, idx)?)?,
                city: required(cities.get(idx), CITY, idx)?.to_string(),
                channel: required(channels.get(idx), CHANNEL, idx)?.to_string(),
                orders_count: required(orders.get(idx), ORDERS_COUNT, idx)?,
                unique_customers: required(customers.get(idx), UNIQUE_CUSTOMERS, idx)?,
                items_sold: items_sold.get(idx).unwrap_or(0),
                gross_revenue_eur: required(gross.get(idx), GROSS_REVENUE_EUR, idx)?,
                refunds_eur: refunds.get(idx).unwrap_or(0.0),
                net_revenue_eur: required(net.get(idx), NET_REVENUE_EUR, idx)?,
            })
        })
        .collect()
}

fn required<T>(value: Option<T>, column: &str, idx: usize) -> PolarsResult<T> {
    value.ok_or_else(|| {
        PolarsError::ComputeError(format!("unexpected null in column {column} at row {idx}").into())
    })
}

fn parse_date(value: &str) -> PolarsResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| {
        PolarsError::ComputeError(format!("invalid date {value:?}: {err}").into())
    })
}
