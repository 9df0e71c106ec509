use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::{PipelineConfig, RunDate};
use crate::error::{PipelineError, Result, SourceError};
use crate::model::{Customer, Order, OrderItem, Refund};

/// Everything one run reads: full reference tables plus a single day of orders.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub customers: Vec<Customer>,
    pub orders: Vec<Order>,
    pub items: Vec<OrderItem>,
    pub refunds: Vec<Refund>,
}

/// Loads the four sources for `date`. Any missing or unreadable file aborts the run.
pub fn load_sources(config: &PipelineConfig, date: RunDate) -> Result<SourceBatch> {
    let customers = load_customers(&config.customers_path())?;
    let orders = load_orders(&config.orders_path(date))?;
    let items = expand_items(&orders);
    let refunds = load_refunds(&config.refunds_path())?;

    info!(
        customers = customers.len(),
        orders = orders.len(),
        items = items.len(),
        refunds = refunds.len(),
        "sources loaded"
    );

    Ok(SourceBatch {
        customers,
        orders,
        items,
        refunds,
    })
}

pub fn load_customers(path: &Path) -> Result<Vec<Customer>> {
    let file = open(path)?;
    read_csv_records(file).map_err(|err| PipelineError::source_unavailable(path, err))
}

pub fn load_refunds(path: &Path) -> Result<Vec<Refund>> {
    let file = open(path)?;
    read_csv_records(file).map_err(|err| PipelineError::source_unavailable(path, err))
}

pub fn load_orders(path: &Path) -> Result<Vec<Order>> {
    let file = open(path)?;
    read_orders(BufReader::new(file)).map_err(|err| PipelineError::source_unavailable(path, err))
}

/// Parses a comma-delimited file with a header row into typed records.
pub fn read_csv_records<T, R>(reader: R) -> std::result::Result<Vec<T>, SourceError>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    debug!(rows = records.len(), "parsed CSV records");
    Ok(records)
}

/// Parses the JSON array of daily orders.
pub fn read_orders<R: Read>(reader: R) -> std::result::Result<Vec<Order>, SourceError> {
    Ok(serde_json::from_reader(reader)?)
}

/// One row per line item, in file order, carrying the order-level fields.
pub fn expand_items(orders: &[Order]) -> Vec<OrderItem> {
    orders
        .iter()
        .enumerate()
        .flat_map(|(row, order)| order.line_items(row as i64))
        .collect()
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|err| PipelineError::source_unavailable(path, err))
}
