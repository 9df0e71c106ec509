use std::path::PathBuf;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::{self, DailyAggregation};
use crate::cleaner::{self, DropCounts};
use crate::config::{PipelineConfig, RunDate};
use crate::enricher;
use crate::error::Result;
use crate::frames;
use crate::sink::{self, CumulativeStore};
use crate::sources::{self, SourceBatch};

/// What one run read, dropped and wrote.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub run_id: Uuid,
    pub date: String,
    pub customers_loaded: usize,
    pub orders_loaded: usize,
    pub items_loaded: usize,
    pub refunds_loaded: usize,
    pub drops: DropCounts,
    pub rejected_items_path: Option<PathBuf>,
    pub daily_summary_path: PathBuf,
    pub order_facts_appended: u64,
    pub summary_rows_appended: u64,
}

/// In-memory result of the transformation stages, before anything is persisted
/// (the rejected items audit file excepted).
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub aggregation: DailyAggregation,
    pub enriched_items: DataFrame,
    pub drops: DropCounts,
    pub rejected_items_path: Option<PathBuf>,
}

/// Clean, enrich and aggregate an already-loaded batch.
pub fn transform(
    batch: &SourceBatch,
    config: &PipelineConfig,
    date: RunDate,
) -> Result<TransformOutput> {
    let customers = frames::customers_frame(&batch.customers)?;
    let orders = frames::orders_frame(&batch.orders)?;
    let items = frames::items_frame(&batch.items)?;
    let refunds = frames::refunds_frame(&batch.refunds)?;

    let cleaned = cleaner::clean(&customers, &orders, &items)?;
    let rejected_items_path = cleaner::persist_rejected_items(&cleaned.rejected_items, config, date)?;

    let enriched = enricher::enrich(
        &cleaned.valid_items,
        &cleaned.customers,
        &cleaned.orders,
        &refunds,
    )?;

    let drops = DropCounts {
        duplicate_order_items: enriched.duplicate_order_items,
        unmatched_customer_items: enriched.unmatched_customer_items,
        ..cleaned.drops
    };
    info!(?drops, "silent drops");

    let aggregation = aggregator::aggregate_daily(&enriched.order_revenue, &enriched.items)?;

    Ok(TransformOutput {
        aggregation,
        enriched_items: enriched.items,
        drops,
        rejected_items_path,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub daily_summary_path: PathBuf,
    pub order_facts_appended: u64,
    pub summary_rows_appended: u64,
}

/// Writes the daily snapshot and appends both fact sets to the cumulative store.
pub async fn export(
    aggregation: &DailyAggregation,
    store: &CumulativeStore,
    config: &PipelineConfig,
    date: RunDate,
) -> Result<ExportReport> {
    let snapshot_path = config.daily_summary_path(date);
    let mut snapshot = aggregation.daily_summary.clone();
    sink::write_snapshot(&mut snapshot, &snapshot_path)?;
    info!(path = %snapshot_path.display(), rows = snapshot.height(), "daily summary written");

    let order_facts = frames::order_revenue_facts(&aggregation.order_revenue)?;
    let summary_facts = frames::daily_summary_facts(&aggregation.daily_summary)?;

    let existing = store.rows_for_date(date.as_naive()).await?;
    if existing > 0 {
        warn!(
            %date,
            existing,
            "date already present in the cumulative store; appending duplicate history rows"
        );
    }

    let order_facts_appended = store.append_order_facts(&order_facts).await?;
    let summary_rows_appended = store.append_daily_summary(&summary_facts).await?;

    Ok(ExportReport {
        daily_summary_path: snapshot_path,
        order_facts_appended,
        summary_rows_appended,
    })
}

/// Processes one date end to end. Any fatal error aborts immediately; nothing is rolled back.
pub async fn run(config: &PipelineConfig, date: RunDate) -> Result<PipelineSummary> {
    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id, %date);
    run_date(config, date, run_id).instrument(span).await
}

async fn run_date(config: &PipelineConfig, date: RunDate, run_id: Uuid) -> Result<PipelineSummary> {
    info!("processing {date}");

    let batch = sources::load_sources(config, date)?;
    let output = transform(&batch, config, date)?;

    let store = CumulativeStore::open(config.database_path()).await?;
    let exported = export(&output.aggregation, &store, config, date).await;
    store.close().await;
    let report = exported?;

    info!("pipeline finished for {date}");

    Ok(PipelineSummary {
        run_id,
        date: date.to_string(),
        customers_loaded: batch.customers.len(),
        orders_loaded: batch.orders.len(),
        items_loaded: batch.items.len(),
        refunds_loaded: batch.refunds.len(),
        drops: output.drops,
        rejected_items_path: output.rejected_items_path,
        daily_summary_path: report.daily_summary_path,
        order_facts_appended: report.order_facts_appended,
        summary_rows_appended: report.summary_rows_appended,
    })
}
