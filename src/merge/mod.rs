//! Series merging: full outer join of daily tables on date
//!
//! The merged table holds exactly one row per date that appears in any input,
//! sorted ascending. Row order is the windowing axis of the next stage, so
//! both properties are checked on construction of the [`MergedTable`].
//!
//! Two inputs can leave more than one row per date if merged naively, and
//! both are normalized before the join:
//!
//! - **Category-keyed series** (strength per body part) are pivoted: every
//!   category contributes its own `<category>_<column>` block and the label
//!   column disappears.
//! - **Non-numeric metric columns** (free-text notes, identifiers) are
//!   stripped from additional per-day tables with a warning.
//!
//! A column name shared by several inputs is unified rather than suffixed:
//! on each date the defined value wins, and two different defined values are
//! a [`Error::ConflictingValues`]. Merging a series with itself is therefore
//! idempotent.

use crate::table::{
    date_array, date_field, days_to_date, downcast, metric_array, metric_field, numeric_values,
    read_dates, DailySeries, MergedTable, SeriesKey,
};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Date32Array, Float64Array, StringArray};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Column label used for strength sets without a category
pub const UNCATEGORIZED: &str = "uncategorized";

/// A daily table flattened to one row per date
struct DateKeyed {
    days: Vec<i32>,
    columns: Vec<(String, Vec<Option<f64>>)>,
}

/// Outer-joins daily series on date
#[derive(Debug, Default)]
pub struct SeriesMerger {
    inputs: Vec<DailySeries>,
}

impl SeriesMerger {
    /// Create an empty merger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series to the join
    #[must_use]
    pub fn with_series(mut self, series: DailySeries) -> Self {
        self.inputs.push(series);
        self
    }

    /// Join all inputs into one date-indexed table.
    ///
    /// # Errors
    /// Returns error if:
    /// - two category labels collapse to the same column prefix
    /// - two inputs define different values for a shared column and date
    /// - the result breaks the one-row-per-date invariant
    pub fn merge(&self) -> Result<MergedTable> {
        let keyed = self
            .inputs
            .iter()
            .map(flatten)
            .collect::<Result<Vec<_>>>()?;

        let all_days: BTreeSet<i32> = keyed.iter().flat_map(|k| k.days.iter().copied()).collect();
        let days: Vec<i32> = all_days.into_iter().collect();
        let row_of: FxHashMap<i32, usize> = days.iter().enumerate().map(|(i, &d)| (d, i)).collect();

        let mut out: Vec<(String, Vec<Option<f64>>)> = Vec::new();
        let mut position: FxHashMap<String, usize> = FxHashMap::default();

        for input in &keyed {
            for (name, values) in &input.columns {
                let slot = *position.entry(name.clone()).or_insert_with(|| {
                    out.push((name.clone(), vec![None; days.len()]));
                    out.len() - 1
                });
                let target = &mut out[slot].1;
                for (&day, value) in input.days.iter().zip(values) {
                    let Some(v) = *value else { continue };
                    let row = row_of[&day];
                    match target[row] {
                        None => target[row] = Some(v),
                        Some(existing) if existing == v => {}
                        Some(_) => {
                            return Err(Error::ConflictingValues {
                                column: name.clone(),
                                date: days_to_date(day).to_string(),
                            })
                        }
                    }
                }
            }
        }

        let mut fields = vec![date_field()];
        let mut columns: Vec<ArrayRef> = vec![date_array(days)];
        for (name, values) in out {
            fields.push(metric_field(&name));
            columns.push(metric_array(values));
        }
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        let merged = MergedTable::try_new(batch)?;

        info!(
            inputs = self.inputs.len(),
            rows = merged.num_rows(),
            columns = merged.batch().num_columns(),
            "merged daily series"
        );
        Ok(merged)
    }
}

/// Join daily series on date (see [`SeriesMerger::merge`]).
///
/// # Errors
/// Returns error if the inputs cannot be joined into one row per date
pub fn merge(series: impl IntoIterator<Item = DailySeries>) -> Result<MergedTable> {
    series
        .into_iter()
        .fold(SeriesMerger::new(), SeriesMerger::with_series)
        .merge()
}

/// Turn an additional per-day metric table (wellness, jump aggregates) into a
/// date-keyed series.
///
/// The date column may be any date-like type. Numeric columns are kept as
/// `Float64` (non-finite values become undefined); every other column is
/// stripped with a warning. Rows are sorted by date.
///
/// # Errors
/// Returns error if the date column is missing or a date repeats
pub fn metric_series(name: &str, batch: &RecordBatch, date_column: &str) -> Result<DailySeries> {
    let days = read_dates(batch, name, date_column)?;
    let mut order: Vec<usize> = (0..days.len()).collect();
    order.sort_by_key(|&i| days[i]);

    let schema = batch.schema();
    let mut fields = vec![date_field()];
    let mut columns: Vec<ArrayRef> = vec![date_array(order.iter().map(|&i| days[i]).collect())];
    let mut stripped = Vec::new();

    for (index, field) in schema.fields().iter().enumerate() {
        if field.name() == date_column {
            continue;
        }
        if !field.data_type().is_numeric() {
            stripped.push(field.name().clone());
            continue;
        }
        let values = numeric_values(batch.column(index), field)?;
        fields.push(metric_field(field.name()));
        columns.push(metric_array(order.iter().map(|&i| values[i]).collect()));
    }

    if !stripped.is_empty() {
        warn!(source = name, columns = ?stripped, "stripped non-numeric columns before merge");
    }

    let sorted = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    DailySeries::try_new(name, SeriesKey::Date, sorted)
}

/// Lowercase `[a-z0-9_]` column prefix for a category label
#[must_use]
pub fn category_prefix(label: Option<&str>) -> String {
    let raw = label.map(str::trim).filter(|l| !l.is_empty());
    let Some(raw) = raw else {
        return UNCATEGORIZED.to_string();
    };
    let mut prefix = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            prefix.push(c.to_ascii_lowercase());
        } else if !prefix.ends_with('_') {
            prefix.push('_');
        }
    }
    let prefix = prefix.trim_matches('_');
    if prefix.is_empty() {
        UNCATEGORIZED.to_string()
    } else {
        prefix.to_string()
    }
}

fn float_columns(series: &DailySeries, skip: usize) -> Result<Vec<(String, Vec<Option<f64>>)>> {
    let batch = series.batch();
    batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(index, field)| {
            let values = downcast::<Float64Array>(batch.column(index), field.name())?;
            Ok((field.name().clone(), values.iter().collect()))
        })
        .collect()
}

fn flatten(series: &DailySeries) -> Result<DateKeyed> {
    let batch = series.batch();
    let days = downcast::<Date32Array>(batch.column(0), "Date")?.values().to_vec();

    match series.key() {
        SeriesKey::Date => Ok(DateKeyed {
            days,
            columns: float_columns(series, 1)?,
        }),
        SeriesKey::DateCategory => pivot(series, &days),
    }
}

fn pivot(series: &DailySeries, days: &[i32]) -> Result<DateKeyed> {
    let batch = series.batch();
    let labels = downcast::<StringArray>(batch.column(1), "category")?;
    let metrics = float_columns(series, 2)?;

    let prefixes: Vec<String> = (0..labels.len())
        .map(|row| category_prefix((!labels.is_null(row)).then(|| labels.value(row))))
        .collect();

    let unique_days: Vec<i32> = days.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let row_of: FxHashMap<i32, usize> = unique_days
        .iter()
        .enumerate()
        .map(|(i, &d)| (d, i))
        .collect();

    // prefix -> per-metric columns over unique days
    let mut blocks: BTreeMap<&str, Vec<Vec<Option<f64>>>> = BTreeMap::new();
    let mut filled: FxHashSet<(&str, i32)> = FxHashSet::default();

    for (row, prefix) in prefixes.iter().enumerate() {
        let day = days[row];
        if !filled.insert((prefix.as_str(), day)) {
            return Err(Error::DuplicateKey {
                table: series.name().to_string(),
                key: format!("{}/{prefix}", days_to_date(day)),
            });
        }
        let block = blocks
            .entry(prefix.as_str())
            .or_insert_with(|| vec![vec![None; unique_days.len()]; metrics.len()]);
        let target = row_of[&day];
        for (column, (_, values)) in block.iter_mut().zip(&metrics) {
            column[target] = values[row];
        }
    }

    let mut columns = Vec::with_capacity(blocks.len() * metrics.len());
    for (prefix, block) in blocks {
        for ((metric, _), values) in metrics.iter().zip(block) {
            columns.push((format!("{prefix}_{metric}"), values));
        }
    }

    Ok(DateKeyed {
        days: unique_days,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{EnduranceEvent, EventAggregator, StrengthEvent};
    use crate::table::date_to_days;
    use arrow::datatypes::{DataType, Field};
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    fn wellness(days: &[u32], scores: &[f64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Date", DataType::Date32, false),
            Field::new("wellness_total", DataType::Float64, true),
            Field::new("notes", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Date32Array::from(
                    days.iter().map(|&d| date_to_days(date(d))).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(scores.to_vec())),
                Arc::new(StringArray::from(vec!["ok"; days.len()])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_category_prefix_sanitizes() {
        assert_eq!(category_prefix(Some("Upper Body")), "upper_body");
        assert_eq!(category_prefix(Some("  Legs/Glutes ")), "legs_glutes");
        assert_eq!(category_prefix(Some("--")), UNCATEGORIZED);
        assert_eq!(category_prefix(None), UNCATEGORIZED);
    }

    #[test]
    fn test_metric_series_strips_text_and_sorts() {
        let series = metric_series("wellness", &wellness(&[3, 1], &[20.0, 25.0]), "Date").unwrap();
        assert_eq!(series.dates(), vec![date(1), date(3)]);
        assert_eq!(series.batch().num_columns(), 2);
        assert_eq!(series.column("wellness_total").unwrap().value(0), 25.0);
    }

    #[test]
    fn test_outer_join_leaves_gaps_undefined() {
        let endurance =
            EventAggregator::endurance(&[EnduranceEvent::new(date(1), 5.0, 60.0)]).unwrap();
        let wellness = metric_series("wellness", &wellness(&[2], &[22.0]), "Date").unwrap();

        let merged = merge([endurance, wellness]).unwrap();
        assert_eq!(merged.dates(), vec![date(1), date(2)]);

        let load = merged.column("total_load").unwrap();
        assert!(load.is_valid(0));
        assert!(load.is_null(1));
        let score = merged.column("wellness_total").unwrap();
        assert!(score.is_null(0));
        assert_eq!(score.value(1), 22.0);
    }

    #[test]
    fn test_pivot_category_series() {
        let events = vec![
            StrengthEvent::new(date(1), 100.0, 5.0).with_category("Legs"),
            StrengthEvent::new(date(1), 40.0, 10.0).with_category("Arms"),
            StrengthEvent::new(date(2), 50.0, 10.0).with_category("Arms"),
        ];
        let strength =
            EventAggregator::strength(&events, SeriesKey::DateCategory, "Exercise").unwrap();
        let merged = merge([strength]).unwrap();

        assert_eq!(merged.num_rows(), 2);
        let names = merged.column_names();
        assert!(!names.contains(&"Exercise".to_string()));
        assert_eq!(names[1], "arms_num_sets");
        assert_eq!(names[9], "legs_num_sets");

        let legs = merged.column("legs_total_strength_load").unwrap();
        assert_eq!(legs.value(0), 500.0);
        assert!(legs.is_null(1));
        assert_eq!(merged.column("arms_total_strength_load").unwrap().value(1), 500.0);
    }

    #[test]
    fn test_colliding_category_labels_rejected() {
        let events = vec![
            StrengthEvent::new(date(1), 100.0, 5.0).with_category("legs"),
            StrengthEvent::new(date(1), 90.0, 5.0).with_category("Legs"),
        ];
        let strength =
            EventAggregator::strength(&events, SeriesKey::DateCategory, "Exercise").unwrap();
        let err = merge([strength]).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));
    }

    #[test]
    fn test_conflicting_shared_column_rejected() {
        let a = metric_series("a", &wellness(&[1], &[20.0]), "Date").unwrap();
        let b = metric_series("b", &wellness(&[1], &[21.0]), "Date").unwrap();
        let err = merge([a, b]).unwrap_err();
        assert!(err.to_string().contains("wellness_total"));
    }

    #[test]
    fn test_no_inputs_gives_empty_table() {
        let merged = SeriesMerger::new().merge().unwrap();
        assert_eq!(merged.num_rows(), 0);
        assert_eq!(merged.column_names(), vec!["Date".to_string()]);
    }
}
