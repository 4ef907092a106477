//! Feature pipeline orchestration
//!
//! ```text
//! endurance events ─> aggregate ─┐
//! strength events  ─> aggregate ─┼─> merge ─> window ─> derive ─> FeatureTable
//! per-day metrics  ──────────────┘
//! ```
//!
//! The pipeline is a deterministic function of its sources and its
//! [`PipelineConfig`]: running it twice on the same input yields tables whose
//! CSV exports are byte-identical. Nothing is written to disk here; see
//! [`crate::storage`].

use crate::aggregate::{EnduranceEvent, EventAggregator, StrengthEvent};
use crate::config::{AcwrConfig, PipelineConfig, StrengthGrouping, WindowMode};
use crate::derived::DerivedMetricCalculator;
use crate::merge::{metric_series, SeriesMerger};
use crate::table::{FeatureTable, SeriesKey};
use crate::window::{AggregateKind, TemporalFeatureBuilder};
use crate::Result;
use arrow::record_batch::RecordBatch;
use tracing::{debug, info};

/// Raw inputs of one pipeline run
#[derive(Debug, Clone)]
pub struct TrainingSources {
    /// One row per endurance session
    pub endurance: RecordBatch,
    /// One row per strength set
    pub strength: RecordBatch,
    /// Additional per-day tables (wellness, jump aggregates), by name
    pub metrics: Vec<(String, RecordBatch)>,
}

impl TrainingSources {
    /// Sources with the two event logs and no per-day tables
    #[must_use]
    pub const fn new(endurance: RecordBatch, strength: RecordBatch) -> Self {
        Self {
            endurance,
            strength,
            metrics: Vec::new(),
        }
    }

    /// Add a per-day metric table
    #[must_use]
    pub fn with_metrics(mut self, name: impl Into<String>, table: RecordBatch) -> Self {
        self.metrics.push((name.into(), table));
        self
    }
}

/// Aggregate, merge, window and derive in one call
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    config: PipelineConfig,
    builder: TemporalFeatureBuilder,
    derived: DerivedMetricCalculator,
}

impl FeaturePipeline {
    /// Create a pipeline from a configuration.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidConfig`] if the configuration is invalid
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let builder = TemporalFeatureBuilder::from_config(&config)?;
        let derived = DerivedMetricCalculator::from_config(&config);
        Ok(Self {
            config,
            builder,
            derived,
        })
    }

    /// Start from the default configuration
    #[must_use]
    pub fn builder() -> FeaturePipelineBuilder {
        FeaturePipelineBuilder::default()
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on `sources`.
    ///
    /// # Errors
    /// Returns error if a required input column is missing or mistyped, a
    /// merge conflict or duplicate key is found, or a derived feature
    /// references a column that was not produced
    pub fn transform(&self, sources: &TrainingSources) -> Result<FeatureTable> {
        let columns = &self.config.columns;

        let endurance = EnduranceEvent::from_batch(&sources.endurance, columns)?;
        let strength = StrengthEvent::from_batch(&sources.strength, columns)?;
        debug!(
            endurance = endurance.len(),
            strength = strength.len(),
            "decoded training events"
        );

        let has_category = sources.strength.schema().index_of(&columns.category).is_ok();
        let key = match self.config.strength_grouping {
            StrengthGrouping::PerCategory if has_category => SeriesKey::DateCategory,
            _ => SeriesKey::Date,
        };

        let mut merger = SeriesMerger::new()
            .with_series(EventAggregator::endurance(&endurance)?)
            .with_series(EventAggregator::strength(&strength, key, &columns.category)?);
        for (name, table) in &sources.metrics {
            merger = merger.with_series(metric_series(name, table, &columns.date)?);
        }
        let merged = merger.merge()?;

        let features = self.builder.build(&merged)?;
        let table = self.derived.apply(&features)?;

        info!(
            rows = table.num_rows(),
            columns = table.num_columns(),
            generated = table.generated_column_names().len(),
            "feature pipeline complete"
        );
        Ok(table)
    }
}

/// Fluent overrides on top of [`PipelineConfig::default`]
#[derive(Debug, Clone, Default)]
pub struct FeaturePipelineBuilder {
    config: PipelineConfig,
}

impl FeaturePipelineBuilder {
    /// Replace the window lengths
    #[must_use]
    pub fn windows(mut self, windows: Vec<usize>) -> Self {
        self.config.windows = windows;
        self
    }

    /// Replace the aggregate kinds
    #[must_use]
    pub fn aggregates(mut self, aggregates: Vec<AggregateKind>) -> Self {
        self.config.aggregates = aggregates;
        self
    }

    /// Set the window semantics
    #[must_use]
    pub const fn window_mode(mut self, mode: WindowMode) -> Self {
        self.config.window_mode = mode;
        self
    }

    /// Set the strength grouping key
    #[must_use]
    pub const fn strength_grouping(mut self, grouping: StrengthGrouping) -> Self {
        self.config.strength_grouping = grouping;
        self
    }

    /// Set the target column, also making it a pass-through column
    #[must_use]
    pub fn target(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if !self.config.passthrough_columns.contains(&column) {
            self.config.passthrough_columns.push(column.clone());
        }
        self.config.target_column = Some(column);
        self
    }

    /// Replace the lag steps
    #[must_use]
    pub fn lags(mut self, lags: Vec<usize>) -> Self {
        self.config.lags = lags;
        self
    }

    /// Set or disable the workload ratio
    #[must_use]
    pub fn acwr(mut self, acwr: Option<AcwrConfig>) -> Self {
        self.config.acwr = acwr;
        self
    }

    /// Validate and build the pipeline.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidConfig`] if the configuration is invalid
    pub fn build(self) -> Result<FeaturePipeline> {
        FeaturePipeline::new(self.config)
    }
}
