//! Persistence of run outputs: semicolon CSV snapshots and the SQLite cumulative store.
//!
//! The store only ever appends. Nothing is keyed, so processing the same date twice leaves
//! duplicate history rows behind; [`CumulativeStore::rows_for_date`] lets callers detect that.

use std::fs::{self, File};
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use polars::prelude::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::SinkError;
use crate::model::{DailySummaryFact, OrderRevenueFact};

pub const ORDERS_TABLE: &str = "orders_clean";
pub const DAILY_SALES_TABLE: &str = "daily_city_sales";

const CSV_SEPARATOR: u8 = b';';

/// Writes `df` as UTF-8, `;`-delimited CSV with a header row and `.` as decimal point.
pub fn write_snapshot(df: &mut DataFrame, path: &Path) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SinkError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut file = File::create(path).map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(CSV_SEPARATOR)
        .finish(df)
        .map_err(|source| SinkError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(rows = df.height(), path = %path.display(), "snapshot written");
    Ok(())
}

/// Append-only history of order facts and daily summaries.
#[derive(Debug, Clone)]
pub struct CumulativeStore {
    pool: SqlitePool,
}

impl CumulativeStore {
    /// Opens (creating if needed) the SQLite file at `path` and ensures both tables exist.
    pub async fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect_with(options, &path.display().to_string()).await
    }

    /// A private in-memory store, mostly useful for tests.
    pub async fn in_memory() -> Result<Self, SinkError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|source| store_error("sqlite::memory:", source))?;
        Self::connect_with(options, "sqlite::memory:").await
    }

    async fn connect_with(options: SqliteConnectOptions, label: &str) -> Result<Self, SinkError> {
        // One connection: the run is strictly sequential and an in-memory database lives
        // and dies with its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| store_error(label, source))?;

        let store = Self { pool };
        store.ensure_tables().await?;
        debug!(store = label, "cumulative store ready");
        Ok(store)
    }

    async fn ensure_tables(&self) -> Result<(), SinkError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders_clean (
                order_id TEXT,
                customer_id TEXT,
                channel TEXT,
                city TEXT,
                created_at TEXT,
                date TEXT,
                items_sold INTEGER,
                gross_revenue REAL,
                refunds_amount REAL,
                net_revenue REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|source| store_error(ORDERS_TABLE, source))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_city_sales (
                date TEXT,
                city TEXT,
                channel TEXT,
                orders_count INTEGER,
                unique_customers INTEGER,
                items_sold INTEGER,
                gross_revenue_eur REAL,
                refunds_eur REAL,
                net_revenue_eur REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|source| store_error(DAILY_SALES_TABLE, source))?;

        Ok(())
    }

    /// Number of `daily_city_sales` rows already stored for `date`.
    pub async fn rows_for_date(&self, date: NaiveDate) -> Result<i64, SinkError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM daily_city_sales WHERE date = ?1")
            .bind(date)
            .fetch_one(&self.pool)
            .await
            .map_err(|source| store_error(DAILY_SALES_TABLE, source))
    }

    pub async fn append_order_facts(&self, facts: &[OrderRevenueFact]) -> Result<u64, SinkError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| store_error(ORDERS_TABLE, source))?;

        let mut inserted = 0;
        for fact in facts {
            inserted += sqlx::query(
                r#"
                INSERT INTO orders_clean (
                    order_id, customer_id, channel, city, created_at, date,
                    items_sold, gross_revenue, refunds_amount, net_revenue
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&fact.order_id)
            .bind(&fact.customer_id)
            .bind(&fact.channel)
            .bind(&fact.city)
            .bind(&fact.created_at)
            .bind(fact.date)
            .bind(fact.items_sold)
            .bind(fact.gross_revenue)
            .bind(fact.refunds_amount)
            .bind(fact.net_revenue)
            .execute(tx.as_mut())
            .await
            .map_err(|source| store_error(ORDERS_TABLE, source))?
            .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|source| store_error(ORDERS_TABLE, source))?;

        info!(rows = inserted, table = ORDERS_TABLE, "appended to cumulative store");
        Ok(inserted)
    }

    pub async fn append_daily_summary(&self, facts: &[DailySummaryFact]) -> Result<u64, SinkError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| store_error(DAILY_SALES_TABLE, source))?;

        let mut inserted = 0;
        for fact in facts {
            inserted += sqlx::query(
                r#"
                INSERT INTO daily_city_sales (
                    date, city, channel, orders_count, unique_customers,
                    items_sold, gross_revenue_eur, refunds_eur, net_revenue_eur
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(fact.date)
            .bind(&fact.city)
            .bind(&fact.channel)
            .bind(fact.orders_count)
            .bind(fact.unique_customers)
            .bind(fact.items_sold)
            .bind(fact.gross_revenue_eur)
            .bind(fact.refunds_eur)
            .bind(fact.net_revenue_eur)
            .execute(tx.as_mut())
            .await
            .map_err(|source| store_error(DAILY_SALES_TABLE, source))?
            .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|source| store_error(DAILY_SALES_TABLE, source))?;

        info!(rows = inserted, table = DAILY_SALES_TABLE, "appended to cumulative store");
        Ok(inserted)
    }

    pub async fn order_facts(&self) -> Result<Vec<OrderRevenueFact>, SinkError> {
        let rows: Vec<OrderFactRow> = sqlx::query_as(
            r#"
            SELECT order_id, customer_id, channel, city, created_at, date,
                   items_sold, gross_revenue, refunds_amount, net_revenue
            FROM orders_clean
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|source| store_error(ORDERS_TABLE, source))?;

        Ok(rows.into_iter().map(OrderRevenueFact::from).collect())
    }

    pub async fn daily_summaries(&self) -> Result<Vec<DailySummaryFact>, SinkError> {
        let rows: Vec<DailySummaryRow> = sqlx::query_as(
            r#"
            SELECT date, city, channel, orders_count, unique_customers,
                   items_sold, gross_revenue_eur, refunds_eur, net_revenue_eur
            FROM daily_city_sales
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|source| store_error(DAILY_SALES_TABLE, source))?;

        Ok(rows.into_iter().map(DailySummaryFact::from).collect())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[derive(sqlx::FromRow)]
struct OrderFactRow {
    order_id: String,
    customer_id: String,
    channel: String,
    city: String,
    created_at: String,
    date: NaiveDate,
    items_sold: i64,
    gross_revenue: f64,
    refunds_amount: f64,
    net_revenue: f64,
}

impl From<OrderFactRow> for OrderRevenueFact {
    fn from(row: OrderFactRow) -> Self {
        Self {
            order_id: row.order_id,
            customer_id: row.customer_id,
            channel: row.channel,
            city: row.city,
            created_at: row.created_at,
            date: row.date,
            items_sold: row.items_sold,
            gross_revenue: row.gross_revenue,
            refunds_amount: row.refunds_amount,
            net_revenue: row.net_revenue,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DailySummaryRow {
    date: NaiveDate,
    city: String,
    channel: String,
    orders_count: i64,
    unique_customers: i64,
    items_sold: i64,
    gross_revenue_eur: f64,
    refunds_eur: f64,
    net_revenue_eur: f64,
}

impl From<DailySummaryRow> for DailySummaryFact {
    fn from(row: DailySummaryRow) -> Self {
        Self {
            date: row.date,
            city: row.city,
            channel: row.channel,
            orders_count: row.orders_count,
            unique_customers: row.unique_customers,
            items_sold: row.items_sold,
            gross_revenue_eur: row.gross_revenue_eur,
            refunds_eur: row.refunds_eur,
            net_revenue_eur: row.net_revenue_eur,
        }
    }
}

fn store_error(target: &str, source: sqlx::Error) -> SinkError {
    SinkError::Store {
        target: target.to_string(),
        source,
    }
}
