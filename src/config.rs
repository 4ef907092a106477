//! Pipeline configuration
//!
//! Every knob of the feature pipeline lives in [`PipelineConfig`]. The
//! defaults reproduce the volleyball study setup: windows of 3 to 28 days,
//! all four aggregate kinds, `wellness_total` as the untouched target and an
//! acute:chronic workload ratio over the 7/28-day mean of `total_load`.
//!
//! Configurations are plain serde structs, so they can be stored next to the
//! exported feature table and reloaded with [`PipelineConfig::from_json_str`].
//!
//! ```rust
//! use training_features::config::{PipelineConfig, WindowMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_json_str(r#"{ "windows": [7, 28], "window_mode": "calendar" }"#)?;
//! assert_eq!(config.windows, vec![7, 28]);
//! assert_eq!(config.window_mode, WindowMode::Calendar);
//! # Ok(())
//! # }
//! ```

use crate::window::AggregateKind;
use crate::{Error, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default rolling window lengths (days)
pub const DEFAULT_WINDOWS: [usize; 6] = [3, 5, 7, 14, 21, 28];

/// Default target column of the pattern-mining stage
pub const DEFAULT_TARGET: &str = "wellness_total";

/// How a window of length `w` is laid over the daily index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// The `w` rows preceding the current row, whatever dates they carry.
    ///
    /// A gap in the merged table (a day with no data from any source) makes
    /// the window reach further back than `w` calendar days.
    #[default]
    Rows,
    /// The `w` calendar days preceding the current date.
    ///
    /// A day without a row counts as undefined, so a window that spans a gap
    /// is undefined.
    Calendar,
}

/// Grouping key for strength events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthGrouping {
    /// One row per day, all categories pooled
    PerDay,
    /// One row per (day, category); pivoted to `<category>_<column>` on merge
    #[default]
    PerCategory,
}

/// Acute:chronic workload ratio settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcwrConfig {
    /// Base load column whose rolling means form the ratio
    pub column: String,
    /// Short (acute) window length
    pub acute_window: usize,
    /// Long (chronic) window length
    pub chronic_window: usize,
    /// Output column name
    pub name: String,
}

impl Default for AcwrConfig {
    fn default() -> Self {
        Self {
            column: "total_load".to_string(),
            acute_window: 7,
            chronic_window: 28,
            name: "ACWR".to_string(),
        }
    }
}

/// Names of the input columns produced by the preprocessing stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceColumns {
    /// Event / day date (all sources)
    pub date: String,
    /// Strength: lifted weight
    pub weight: String,
    /// Strength: repetitions in the set
    pub repetitions: String,
    /// Strength: category label (exercise / body part)
    pub category: String,
    /// Endurance: session RPE
    pub rpe: String,
    /// Endurance: session duration in minutes
    pub duration: String,
}

impl Default for SourceColumns {
    fn default() -> Self {
        Self {
            date: "Date".to_string(),
            weight: "Weight".to_string(),
            repetitions: "Reps".to_string(),
            category: "Exercise".to_string(),
            rpe: "RPE".to_string(),
            duration: "Duration".to_string(),
        }
    }
}

/// Complete feature pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rolling window lengths, in rows or days depending on `window_mode`
    pub windows: Vec<usize>,
    /// Aggregates computed for every window
    pub aggregates: Vec<AggregateKind>,
    /// Window semantics
    pub window_mode: WindowMode,
    /// Numeric columns carried through without rolling features; the
    /// target column is always carried through as well
    pub passthrough_columns: Vec<String>,
    /// Target of the pattern-mining stage; source of lag features
    pub target_column: Option<String>,
    /// Lag steps applied to the target column
    pub lags: Vec<usize>,
    /// Workload ratio; `None` disables it
    pub acwr: Option<AcwrConfig>,
    /// Grouping key for strength events
    pub strength_grouping: StrengthGrouping,
    /// Input column names
    pub columns: SourceColumns,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            windows: DEFAULT_WINDOWS.to_vec(),
            aggregates: AggregateKind::ALL.to_vec(),
            window_mode: WindowMode::default(),
            passthrough_columns: vec![DEFAULT_TARGET.to_string()],
            target_column: Some(DEFAULT_TARGET.to_string()),
            lags: vec![1],
            acwr: Some(AcwrConfig::default()),
            strength_grouping: StrengthGrouping::default(),
            columns: SourceColumns::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the configuration is invalid
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Serialize the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject configurations that cannot produce a well-formed feature table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for:
    /// - an empty window or aggregate list
    /// - a zero window length or lag
    /// - duplicate windows, aggregates or lags (duplicate column names)
    /// - lags without a target column
    /// - a workload ratio whose windows are not configured, or without `mean`
    pub fn validate(&self) -> Result<()> {
        if self.windows.is_empty() {
            return Err(Error::InvalidConfig("at least one window length is required".to_string()));
        }
        if let Some(w) = self.windows.iter().find(|&&w| w == 0) {
            return Err(Error::InvalidConfig(format!("window length must be positive, got {w}")));
        }
        ensure_unique("window length", &self.windows)?;

        if self.aggregates.is_empty() {
            return Err(Error::InvalidConfig("at least one aggregate kind is required".to_string()));
        }
        ensure_unique("aggregate", &self.aggregates)?;

        if self.lags.contains(&0) {
            return Err(Error::InvalidConfig(
                "lag must be at least 1 (lag 0 is the same-day target)".to_string(),
            ));
        }
        ensure_unique("lag", &self.lags)?;
        if !self.lags.is_empty() && self.target_column.is_none() {
            return Err(Error::InvalidConfig("lags require a target column".to_string()));
        }

        if let Some(acwr) = &self.acwr {
            if !self.aggregates.contains(&AggregateKind::Mean) {
                return Err(Error::InvalidConfig(
                    "workload ratio requires the 'mean' aggregate".to_string(),
                ));
            }
            for w in [acwr.acute_window, acwr.chronic_window] {
                if !self.windows.contains(&w) {
                    return Err(Error::InvalidConfig(format!(
                        "workload ratio window {w} is not among the configured windows {:?}",
                        self.windows
                    )));
                }
            }
            if self.passthrough_columns.contains(&acwr.column)
                || self.target_column.as_ref() == Some(&acwr.column)
            {
                return Err(Error::InvalidConfig(format!(
                    "workload ratio column '{}' is a pass-through column and has no rolling means",
                    acwr.column
                )));
            }
        }

        Ok(())
    }
}

fn ensure_unique<T: std::hash::Hash + Eq + std::fmt::Debug>(what: &str, items: &[T]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for item in items {
        if !seen.insert(item) {
            return Err(Error::InvalidConfig(format!("duplicate {what}: {item:?}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.windows, vec![3, 5, 7, 14, 21, 28]);
        assert_eq!(config.aggregates.len(), 4);
        assert_eq!(config.window_mode, WindowMode::Rows);
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = PipelineConfig {
            windows: vec![3, 0],
            acwr: None,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("window length must be positive"));
    }

    #[test]
    fn test_empty_windows_rejected() {
        let config = PipelineConfig {
            windows: vec![],
            acwr: None,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_window_rejected() {
        let config = PipelineConfig {
            windows: vec![7, 7, 28],
            ..PipelineConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_acwr_window_must_be_configured() {
        let config = PipelineConfig {
            windows: vec![3, 7],
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("28"));
    }

    #[test]
    fn test_acwr_requires_mean() {
        let config = PipelineConfig {
            aggregates: vec![AggregateKind::Max],
            ..PipelineConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("mean"));
    }

    #[test]
    fn test_lag_zero_rejected() {
        let config = PipelineConfig {
            lags: vec![0],
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_lags_need_target() {
        let config = PipelineConfig {
            target_column: None,
            ..PipelineConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("target"));
    }

    #[test]
    fn test_json_partial_override() {
        let config = PipelineConfig::from_json_str(
            r#"{ "windows": [7, 28], "aggregates": ["mean", "std"], "lags": [1, 2] }"#,
        )
        .unwrap();
        assert_eq!(config.windows, vec![7, 28]);
        assert_eq!(
            config.aggregates,
            vec![AggregateKind::Mean, AggregateKind::PopulationStdDev]
        );
        assert_eq!(config.lags, vec![1, 2]);
        assert_eq!(config.columns.date, "Date");
    }

    #[test]
    fn test_acwr_column_cannot_be_target() {
        let config = PipelineConfig {
            target_column: Some("total_load".to_string()),
            passthrough_columns: vec![],
            ..PipelineConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("pass-through"));
    }

    #[test]
    fn test_json_negative_window_rejected() {
        let result = PipelineConfig::from_json_str(r#"{ "windows": [-3] }"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_json_unknown_aggregate_rejected() {
        let result = PipelineConfig::from_json_str(r#"{ "aggregates": ["median"] }"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_json_roundtrip_preserves_config() {
        let config = PipelineConfig {
            window_mode: WindowMode::Calendar,
            strength_grouping: StrengthGrouping::PerDay,
            ..PipelineConfig::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(PipelineConfig::from_json_str(&json).unwrap(), config);
    }
}
