pub mod aggregator;
pub mod cleaner;
pub mod config;
pub mod enricher;
pub mod error;
pub mod frames;
pub mod model;
pub mod pipeline;
pub mod sink;
pub mod sources;

pub use config::{PipelineConfig, RunDate};
pub use error::{PipelineError, Result, SinkError, SourceError};
pub use pipeline::{run, PipelineSummary};
