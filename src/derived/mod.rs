//! Derived metrics over built features
//!
//! Row-wise arithmetic on columns the temporal builder already produced, so
//! no derived value can see more than the features it is made of:
//!
//! - **ACWR** `= <col>_mean_<acute>d / <col>_mean_<chronic>d`. Both operands
//!   already exclude the current day; the ratio is not shifted again.
//! - **Lag** `<target>_lag_<k>d` = the target `k` rows (or, in calendar
//!   mode, `k` days) back. The same-day target column stays untouched.
//!
//! Undefined operands, and a zero denominator, give an undefined ratio.
//! The target comes from an optional metric table, so a target column that
//! is absent yields no lag columns rather than an error.

use crate::config::{AcwrConfig, PipelineConfig, WindowMode};
use crate::table::{metric_array, metric_field, FeatureTable};
use crate::window::{feature_name, lagged, AggregateKind};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Date32Array};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use tracing::{debug, info};

/// Lag column name: `<target>_lag_<k>d`
#[must_use]
pub fn lag_name(target: &str, k: usize) -> String {
    format!("{target}_lag_{k}d")
}

/// Row-wise `numerator / denominator`, undefined when either side is
/// undefined or the denominator is zero
#[must_use]
pub fn ratio(numerator: &[Option<f64>], denominator: &[Option<f64>]) -> Vec<Option<f64>> {
    numerator
        .iter()
        .zip(denominator)
        .map(|(n, d)| match (n, d) {
            (Some(n), Some(d)) if *d != 0.0 => Some(n / d),
            _ => None,
        })
        .collect()
}

/// Appends workload ratio and lag columns to a feature table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedMetricCalculator {
    acwr: Option<AcwrConfig>,
    target: Option<String>,
    lags: Vec<usize>,
    mode: WindowMode,
}

impl DerivedMetricCalculator {
    /// Calculator that derives nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ratio, lag and window-mode settings from a pipeline configuration
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            acwr: config.acwr.clone(),
            target: config.target_column.clone(),
            lags: config.lags.clone(),
            mode: config.window_mode,
        }
    }

    /// Enable the workload ratio
    #[must_use]
    pub fn with_acwr(mut self, acwr: AcwrConfig) -> Self {
        self.acwr = Some(acwr);
        self
    }

    /// Lag a target column by each of `lags`
    #[must_use]
    pub fn with_lags(mut self, target: impl Into<String>, lags: Vec<usize>) -> Self {
        self.target = Some(target.into());
        self.lags = lags;
        self
    }

    /// Window semantics used for lags
    #[must_use]
    pub const fn with_mode(mut self, mode: WindowMode) -> Self {
        self.mode = mode;
        self
    }

    /// Return a new table with the derived columns appended.
    ///
    /// # Errors
    /// Returns error if a ratio operand column is missing, a lag step is zero,
    /// or a derived name collides with an existing column
    pub fn apply(&self, table: &FeatureTable) -> Result<FeatureTable> {
        let mut derived: Vec<(String, Vec<Option<f64>>)> = Vec::new();

        if let Some(acwr) = &self.acwr {
            let acute = table.values(&feature_name(&acwr.column, AggregateKind::Mean, acwr.acute_window))?;
            let chronic =
                table.values(&feature_name(&acwr.column, AggregateKind::Mean, acwr.chronic_window))?;
            let values = ratio(&acute, &chronic);
            debug!(
                column = %acwr.name,
                defined = values.iter().flatten().count(),
                "computed workload ratio"
            );
            derived.push((acwr.name.clone(), values));
        }

        if let Some(target) = self.target.as_ref().filter(|_| !self.lags.is_empty()) {
            if table.column(target).is_none() {
                debug!(target = %target, "target column not in table, no lag features");
            } else {
                let values = table.values(target)?;
                let days = dates(table.batch())?;
                for &k in &self.lags {
                    if k == 0 {
                        return Err(Error::InvalidConfig(
                            "lag must be at least 1 (lag 0 is the same-day target)".to_string(),
                        ));
                    }
                    derived.push((lag_name(target, k), lagged(&values, &days, k, self.mode)));
                }
            }
        }

        let batch = table.batch();
        let schema = batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
        for (name, values) in derived {
            if fields.iter().any(|f| f.name() == &name) {
                return Err(Error::InvalidInput(format!(
                    "derived column '{name}' collides with an existing column"
                )));
            }
            fields.push(metric_field(&name));
            columns.push(metric_array(values));
        }

        let added = fields.len() - schema.fields().len();
        let out = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        info!(added, "derived ratio and lag features");
        Ok(FeatureTable::from_parts(out, table.base_columns()))
    }
}

fn dates(batch: &RecordBatch) -> Result<Vec<i32>> {
    Ok(batch
        .column(0)
        .as_any()
        .downcast_ref::<Date32Array>()
        .ok_or_else(|| Error::Other("Failed to downcast date column".to_string()))?
        .values()
        .to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{date_array, date_field, MergedTable};
    use crate::window::TemporalFeatureBuilder;

    fn features(load: Vec<Option<f64>>, target: Vec<Option<f64>>, windows: Vec<usize>) -> FeatureTable {
        let n = load.len();
        let schema = Arc::new(Schema::new(vec![
            date_field(),
            metric_field("total_load"),
            metric_field("wellness_total"),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                date_array((0..n as i32).collect()),
                metric_array(load),
                metric_array(target),
            ],
        )
        .unwrap();
        TemporalFeatureBuilder::new(windows, vec![AggregateKind::Mean])
            .unwrap()
            .with_passthrough(["wellness_total"])
            .build(&MergedTable::try_new(batch).unwrap())
            .unwrap()
    }

    #[test]
    fn test_ratio_undefined_cases() {
        let num = [Some(1.0), None, Some(3.0), Some(4.0)];
        let den = [Some(2.0), Some(2.0), Some(0.0), None];
        assert_eq!(ratio(&num, &den), vec![Some(0.5), None, None, None]);
    }

    #[test]
    fn test_acwr_is_ratio_of_rolling_means() {
        let load: Vec<Option<f64>> = (1..=8).map(|v| Some(f64::from(v))).collect();
        let table = features(load, vec![None; 8], vec![2, 4]);
        let acwr = AcwrConfig {
            acute_window: 2,
            chronic_window: 4,
            ..AcwrConfig::default()
        };
        let out = DerivedMetricCalculator::new().with_acwr(acwr).apply(&table).unwrap();

        let acute = out.values("total_load_mean_2d").unwrap();
        let chronic = out.values("total_load_mean_4d").unwrap();
        let values = out.values("ACWR").unwrap();
        for i in 0..8 {
            match (acute[i], chronic[i]) {
                (Some(a), Some(c)) if c != 0.0 => assert_eq!(values[i], Some(a / c)),
                _ => assert_eq!(values[i], None),
            }
        }
        // row 4: mean(3,4) / mean(1,2,3,4)
        assert_eq!(values[4], Some(3.5 / 2.5));
    }

    #[test]
    fn test_acwr_zero_chronic_load_undefined() {
        let table = features(vec![Some(0.0); 6], vec![None; 6], vec![1, 2]);
        let acwr = AcwrConfig {
            acute_window: 1,
            chronic_window: 2,
            ..AcwrConfig::default()
        };
        let out = DerivedMetricCalculator::new().with_acwr(acwr).apply(&table).unwrap();
        assert!(out.values("ACWR").unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn test_lag_reads_previous_row_and_keeps_target() {
        let target = vec![Some(20.0), Some(22.0), Some(19.0)];
        let table = features(vec![Some(1.0); 3], target.clone(), vec![1]);
        let out = DerivedMetricCalculator::new()
            .with_lags("wellness_total", vec![1, 2])
            .apply(&table)
            .unwrap();

        assert_eq!(out.values("wellness_total").unwrap(), target);
        assert_eq!(
            out.values("wellness_total_lag_1d").unwrap(),
            vec![None, Some(20.0), Some(22.0)]
        );
        assert_eq!(
            out.values("wellness_total_lag_2d").unwrap(),
            vec![None, None, Some(20.0)]
        );
        let names = out.column_names();
        assert_eq!(names[names.len() - 2], "wellness_total_lag_1d");
    }

    #[test]
    fn test_missing_acwr_operand_named() {
        let table = features(vec![Some(1.0); 3], vec![None; 3], vec![1]);
        let err = DerivedMetricCalculator::new()
            .with_acwr(AcwrConfig::default())
            .apply(&table)
            .unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
        assert!(err.to_string().contains("total_load_mean_7d"));
    }

    #[test]
    fn test_absent_target_adds_no_lags() {
        let table = features(vec![Some(1.0); 3], vec![None; 3], vec![1]);
        let out = DerivedMetricCalculator::new()
            .with_lags("sleep_hours", vec![1])
            .apply(&table)
            .unwrap();
        assert_eq!(out.column_names(), table.column_names());
    }
}
