//! Temporal feature building: leakage-safe rolling aggregates
//!
//! For every windowed column `c`, window length `w` and aggregate `g`, the
//! builder appends a column `c_g_wd` whose value on row `i` is `g` over rows
//! `i-w .. i-1` of `c`. The current row never contributes, so a feature for
//! day `t` only sees days before `t`:
//!
//! ```text
//! value      1    2    3    4    5    6    7
//! mean_3d    -    -    -   2.0  3.0  4.0  5.0
//!            └── insufficient history ──┘
//! ```
//!
//! The first `w` rows of every feature are undefined, and a window holding
//! an undefined value is undefined.
//!
//! ## Example
//!
//! ```rust
//! use training_features::window::{AggregateKind, TemporalFeatureBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let builder = TemporalFeatureBuilder::new(vec![3, 7], vec![AggregateKind::Mean])?;
//! assert_eq!(builder.feature_names("total_load"), vec!["total_load_mean_3d", "total_load_mean_7d"]);
//! # Ok(())
//! # }
//! ```

mod kernels;

pub use kernels::{lagged, rolling, window_start};

use crate::config::{PipelineConfig, WindowMode};
use crate::table::{metric_array, metric_field, FeatureTable, MergedTable};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Date32Array};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Aggregate applied over a rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    /// Arithmetic mean
    #[serde(rename = "mean")]
    Mean,
    /// Maximum value
    #[serde(rename = "max")]
    Max,
    /// Minimum value
    #[serde(rename = "min")]
    Min,
    /// Standard deviation with divisor `n`
    #[serde(rename = "std")]
    PopulationStdDev,
}

impl AggregateKind {
    /// All kinds, in feature column order
    pub const ALL: [Self; 4] = [Self::Mean, Self::Max, Self::Min, Self::PopulationStdDev];

    /// Name used in feature column names
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Max => "max",
            Self::Min => "min",
            Self::PopulationStdDev => "std",
        }
    }

    /// Apply to a complete window (callers never pass an empty slice)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn apply(self, window: &[f64]) -> f64 {
        match self {
            Self::Mean => window.iter().sum::<f64>() / window.len() as f64,
            Self::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
            Self::PopulationStdDev => {
                let n = window.len() as f64;
                let mean = window.iter().sum::<f64>() / n;
                let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
                variance.sqrt()
            }
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deterministic feature column name: `<column>_<aggregate>_<window>d`
#[must_use]
pub fn feature_name(column: &str, kind: AggregateKind, window: usize) -> String {
    format!("{column}_{}_{window}d", kind.name())
}

/// Builds rolling-window features over a merged daily table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalFeatureBuilder {
    windows: Vec<usize>,
    aggregates: Vec<AggregateKind>,
    mode: WindowMode,
    passthrough: Vec<String>,
}

impl TemporalFeatureBuilder {
    /// Create a row-mode builder without pass-through columns.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for an empty, zero or duplicate window
    /// length, or an empty or duplicate aggregate list
    pub fn new(windows: Vec<usize>, aggregates: Vec<AggregateKind>) -> Result<Self> {
        let config = PipelineConfig {
            windows,
            aggregates,
            passthrough_columns: Vec::new(),
            lags: Vec::new(),
            acwr: None,
            ..PipelineConfig::default()
        };
        Self::from_config(&config)
    }

    /// Create a builder from the windowing part of a pipeline configuration.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mut passthrough = config.passthrough_columns.clone();
        if let Some(target) = &config.target_column {
            if !passthrough.contains(target) {
                passthrough.push(target.clone());
            }
        }
        Ok(Self {
            windows: config.windows.clone(),
            aggregates: config.aggregates.clone(),
            mode: config.window_mode,
            passthrough,
        })
    }

    /// Set the window semantics
    #[must_use]
    pub const fn with_mode(mut self, mode: WindowMode) -> Self {
        self.mode = mode;
        self
    }

    /// Exclude columns (e.g. the mining target) from feature generation
    #[must_use]
    pub fn with_passthrough<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Configured window lengths
    #[must_use]
    pub fn windows(&self) -> &[usize] {
        &self.windows
    }

    /// Configured aggregate kinds
    #[must_use]
    pub fn aggregates(&self) -> &[AggregateKind] {
        &self.aggregates
    }

    /// Window semantics
    #[must_use]
    pub const fn mode(&self) -> WindowMode {
        self.mode
    }

    /// Feature column names generated for one base column, in output order
    #[must_use]
    pub fn feature_names(&self, column: &str) -> Vec<String> {
        self.windows
            .iter()
            .flat_map(|&w| {
                self.aggregates
                    .iter()
                    .map(move |&kind| feature_name(column, kind, w))
            })
            .collect()
    }

    /// Columns of `table` that receive rolling features: numeric, not the
    /// date, not pass-through
    #[must_use]
    pub fn windowed_columns(&self, table: &MergedTable) -> Vec<String> {
        table
            .batch()
            .schema()
            .fields()
            .iter()
            .skip(1)
            .filter(|f| f.data_type().is_numeric())
            .filter(|f| !self.passthrough.iter().any(|p| p == f.name()))
            .map(|f| f.name().clone())
            .collect()
    }

    /// Append all rolling features to the merged table.
    ///
    /// # Errors
    /// Returns error if a generated name collides with an existing column or
    /// the output batch cannot be assembled
    pub fn build(&self, table: &MergedTable) -> Result<FeatureTable> {
        let batch = table.batch();
        let schema = batch.schema();
        let days: Vec<i32> = batch
            .column(0)
            .as_any()
            .downcast_ref::<Date32Array>()
            .ok_or_else(|| Error::Other("Failed to downcast date column".to_string()))?
            .values()
            .to_vec();

        let targets = self
            .windowed_columns(table)
            .into_iter()
            .map(|name| {
                let values = table
                    .column(&name)
                    .ok_or_else(|| Error::missing_column("merged table", &name))?;
                Ok((name, values.iter().collect::<Vec<_>>()))
            })
            .collect::<Result<Vec<(String, Vec<Option<f64>>)>>>()?;

        #[cfg(feature = "rayon")]
        let blocks: Vec<Vec<(String, Vec<Option<f64>>)>> = targets
            .par_iter()
            .map(|(name, values)| self.column_features(name, values, &days))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let blocks: Vec<Vec<(String, Vec<Option<f64>>)>> = targets
            .iter()
            .map(|(name, values)| self.column_features(name, values, &days))
            .collect();

        let mut names: FxHashSet<String> =
            schema.fields().iter().map(|f| f.name().clone()).collect();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

        for (name, values) in blocks.into_iter().flatten() {
            if !names.insert(name.clone()) {
                return Err(Error::InvalidInput(format!(
                    "generated feature '{name}' collides with an existing column"
                )));
            }
            fields.push(metric_field(&name));
            columns.push(metric_array(values));
        }

        let generated = fields.len() - schema.fields().len();
        let out = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        info!(
            windowed = targets.len(),
            generated,
            rows = out.num_rows(),
            mode = ?self.mode,
            "built temporal features"
        );
        Ok(FeatureTable::from_parts(out, schema.fields().len()))
    }

    /// All features of one column: windows outer, aggregates inner
    fn column_features(
        &self,
        column: &str,
        values: &[Option<f64>],
        days: &[i32],
    ) -> Vec<(String, Vec<Option<f64>>)> {
        let mut out = Vec::with_capacity(self.windows.len() * self.aggregates.len());
        for &w in &self.windows {
            let per_kind = rolling(values, days, w, &self.aggregates, self.mode);
            for (&kind, feature) in self.aggregates.iter().zip(per_kind) {
                out.push((feature_name(column, kind, w), feature));
            }
        }
        out
    }
}
