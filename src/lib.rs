//! # training-features: Leakage-Safe Daily Training Features
//!
//! Turns per-event athlete training logs (endurance sessions, strength sets)
//! and per-day metric tables (wellness, jumps) into one per-day feature table
//! for pattern mining against a wellness target.
//!
//! ## Stages
//!
//! - **Aggregate** ([`aggregate`]): events to one row per day (strength also
//!   per category), with load = RPE x duration or weight x repetitions
//! - **Merge** ([`merge`]): full outer join on date, one row per date
//! - **Window** ([`window`]): rolling mean/max/min/std over the `w` rows
//!   strictly before each row
//! - **Derive** ([`derived`]): acute:chronic workload ratio and target lags
//!
//! A feature on day `t` never depends on day `t` itself, so a model trained
//! on the table cannot peek at the value it explains.
//!
//! ## Example
//!
//! ```rust,no_run
//! use training_features::pipeline::{FeaturePipeline, TrainingSources};
//! # use arrow::record_batch::RecordBatch;
//! # fn load(_: &str) -> RecordBatch { unimplemented!() }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sources = TrainingSources::new(load("endurance"), load("strength"))
//!     .with_metrics("wellness", load("wellness"));
//!
//! let pipeline = FeaturePipeline::builder().windows(vec![7, 28]).build()?;
//! let features = pipeline.transform(&sources)?;
//! training_features::storage::export_csv(&features, "features.csv")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod aggregate;
pub mod config;
pub mod derived;
pub mod error;
pub mod merge;
pub mod mining;
pub mod pipeline;
pub mod storage;
pub mod table;
pub mod window;

pub use config::{PipelineConfig, WindowMode};
pub use error::{Error, Result};
pub use pipeline::{FeaturePipeline, TrainingSources};
pub use table::{DailySeries, FeatureTable, MergedTable};
pub use window::AggregateKind;
