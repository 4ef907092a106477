//! Typed pipeline tables over Arrow record batches
//!
//! Each pipeline stage owns one table type and validates its schema on
//! construction, so a renamed or missing column fails at the boundary where
//! it first matters:
//!
//! ```text
//! RecordBatch (events) ──> DailySeries ──> MergedTable ──> FeatureTable
//!      aggregate              merge           window + derived
//! ```
//!
//! "Undefined" is an Arrow null everywhere. Tables are never mutated after
//! construction; every stage builds a new batch.

use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Date32Array, Float64Array, RecordBatch, StringArray};
use arrow::compute::kernels::cast::cast;
use arrow::datatypes::{DataType, Field, Schema};
use chrono::NaiveDate;
use std::sync::Arc;

/// Name of the date column in every daily table
pub const DATE_COLUMN: &str = "Date";

/// Key layout of a [`DailySeries`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKey {
    /// One row per date
    Date,
    /// One row per (date, category); the category label is column 1
    DateCategory,
}

/// Per-day summary table produced by the aggregation stage
///
/// Column 0 is the `Date32` date, column 1 the `Utf8` category for
/// [`SeriesKey::DateCategory`], every other column is `Float64`.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    name: String,
    key: SeriesKey,
    batch: RecordBatch,
}

impl DailySeries {
    /// Wrap a batch, validating layout and key uniqueness.
    ///
    /// # Errors
    /// Returns error if the layout does not match `key` or a key repeats
    pub fn try_new(name: impl Into<String>, key: SeriesKey, batch: RecordBatch) -> Result<Self> {
        let name = name.into();
        let schema = batch.schema();

        expect_date_field(&schema, &name)?;
        let first_value = match key {
            SeriesKey::Date => 1,
            SeriesKey::DateCategory => {
                let field = schema
                    .fields()
                    .get(1)
                    .ok_or_else(|| Error::missing_column(&name, "category"))?;
                if field.data_type() != &DataType::Utf8 {
                    return Err(type_mismatch(field, "Utf8"));
                }
                2
            }
        };
        for field in schema.fields().iter().skip(first_value) {
            if field.data_type() != &DataType::Float64 {
                return Err(type_mismatch(field, "Float64"));
            }
        }

        let days = date_values(&batch, &name)?;
        let mut seen = rustc_hash::FxHashSet::default();
        match key {
            SeriesKey::Date => {
                for &day in &days {
                    if !seen.insert((day, None)) {
                        return Err(Error::DuplicateKey {
                            table: name,
                            key: days_to_date(day).to_string(),
                        });
                    }
                }
            }
            SeriesKey::DateCategory => {
                let labels = downcast::<StringArray>(batch.column(1), "category")?;
                for (row, &day) in days.iter().enumerate() {
                    let label = (!labels.is_null(row)).then(|| labels.value(row));
                    if !seen.insert((day, label)) {
                        return Err(Error::DuplicateKey {
                            table: name,
                            key: format!("{}/{}", days_to_date(day), label.unwrap_or("<none>")),
                        });
                    }
                }
            }
        }

        Ok(Self { name, key, batch })
    }

    /// Source name (used in error messages and logs)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key layout
    #[must_use]
    pub const fn key(&self) -> SeriesKey {
        self.key
    }

    /// Underlying record batch
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Dates of every row, in row order
    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        dates_of(&self.batch)
    }

    /// Values of a `Float64` column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Float64Array> {
        float_column(&self.batch, name)
    }
}

/// Outer union of all daily series: one row per date, ascending
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable {
    batch: RecordBatch,
}

impl MergedTable {
    /// Wrap a batch, validating the one-row-per-date invariant.
    ///
    /// # Errors
    /// Returns error if column 0 is not a non-null `Date32` column with strictly
    /// increasing values, or any other column is not `Float64`
    pub fn try_new(batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        expect_date_field(&schema, "merged table")?;
        for field in schema.fields().iter().skip(1) {
            if field.data_type() != &DataType::Float64 {
                return Err(type_mismatch(field, "Float64"));
            }
        }

        let days = date_values(&batch, "merged table")?;
        if let Some(pair) = days.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(Error::InvariantViolation(format!(
                "merged table must hold one row per date in ascending order, found {} then {}",
                days_to_date(pair[0]),
                days_to_date(pair[1])
            )));
        }

        Ok(Self { batch })
    }

    /// Underlying record batch
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows (distinct dates)
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Dates of every row, ascending
    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        dates_of(&self.batch)
    }

    /// Column names in order, date first
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        column_names_of(&self.batch)
    }

    /// Values of a metric column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Float64Array> {
        float_column(&self.batch, name)
    }
}

/// Final per-day feature table handed to pattern mining
///
/// Holds the merged columns first, then one block of rolling features per
/// windowed column, then derived ratio and lag columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    batch: RecordBatch,
    base_columns: usize,
}

impl FeatureTable {
    pub(crate) const fn from_parts(batch: RecordBatch, base_columns: usize) -> Self {
        Self {
            batch,
            base_columns,
        }
    }

    /// Underlying record batch
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows (same as the merged table)
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Number of columns including the date
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// Number of leading columns carried over from the merged table
    #[must_use]
    pub const fn base_columns(&self) -> usize {
        self.base_columns
    }

    /// Dates of every row, ascending
    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        dates_of(&self.batch)
    }

    /// Column names in insertion order
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        column_names_of(&self.batch)
    }

    /// Names of the columns added after the merged columns
    #[must_use]
    pub fn generated_column_names(&self) -> Vec<String> {
        column_names_of(&self.batch)
            .into_iter()
            .skip(self.base_columns)
            .collect()
    }

    /// Values of a feature column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Float64Array> {
        float_column(&self.batch, name)
    }

    /// Values of a feature column as options, erroring if absent
    ///
    /// # Errors
    /// Returns [`Error::MissingColumn`] if no `Float64` column has this name
    pub fn values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self
            .column(name)
            .ok_or_else(|| Error::missing_column("feature table", name))?;
        Ok(column.iter().collect())
    }

    /// Average of the defined values of a column (`None` if all undefined)
    ///
    /// # Errors
    /// Returns [`Error::MissingColumn`] if no `Float64` column has this name
    #[allow(clippy::cast_precision_loss)]
    pub fn column_mean(&self, name: &str) -> Result<Option<f64>> {
        let defined: Vec<f64> = self.values(name)?.into_iter().flatten().collect();
        if defined.is_empty() {
            return Ok(None);
        }
        Ok(Some(defined.iter().sum::<f64>() / defined.len() as f64))
    }
}

// ============================================================================
// Column helpers shared by the stages
// ============================================================================

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Convert a calendar date to Arrow `Date32` days since the epoch
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn date_to_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

/// Convert Arrow `Date32` days since the epoch to a calendar date, or
/// `None` outside chrono's supported range
#[must_use]
pub fn checked_days_to_date(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::Duration::days(i64::from(days)))
}

/// Convert Arrow `Date32` days since the epoch to a calendar date.
///
/// Saturates at [`NaiveDate::MIN`] / [`NaiveDate::MAX`]; event dates are
/// range-checked when read, so only hand-built batches can reach the bounds.
#[must_use]
pub fn days_to_date(days: i32) -> NaiveDate {
    checked_days_to_date(days).unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

pub(crate) fn type_mismatch(field: &Field, expected: &str) -> Error {
    Error::TypeMismatch {
        column: field.name().clone(),
        expected: expected.to_string(),
        found: format!("{:?}", field.data_type()),
    }
}

pub(crate) fn downcast<'a, T: 'static>(column: &'a ArrayRef, name: &str) -> Result<&'a T> {
    column
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Other(format!("Failed to downcast column '{name}'")))
}

fn expect_date_field(schema: &Schema, table: &str) -> Result<()> {
    let field = schema
        .fields()
        .first()
        .ok_or_else(|| Error::missing_column(table, DATE_COLUMN))?;
    if field.name() != DATE_COLUMN {
        return Err(Error::missing_column(table, DATE_COLUMN));
    }
    if field.data_type() != &DataType::Date32 {
        return Err(type_mismatch(field, "Date32"));
    }
    Ok(())
}

/// Date32 values of column 0, rejecting nulls
fn date_values(batch: &RecordBatch, table: &str) -> Result<Vec<i32>> {
    let dates = downcast::<Date32Array>(batch.column(0), DATE_COLUMN)?;
    if dates.null_count() > 0 {
        return Err(Error::InvalidInput(format!("null date in {table}")));
    }
    Ok(dates.values().to_vec())
}

fn dates_of(batch: &RecordBatch) -> Vec<NaiveDate> {
    batch
        .column(0)
        .as_any()
        .downcast_ref::<Date32Array>()
        .map(|dates| dates.values().iter().map(|&d| days_to_date(d)).collect())
        .unwrap_or_default()
}

fn column_names_of(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

fn float_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Float64Array> {
    let index = batch.schema().index_of(name).ok()?;
    batch.column(index).as_any().downcast_ref::<Float64Array>()
}

/// Locate a column by name, naming the table in the error
pub(crate) fn find_column<'a>(
    batch: &'a RecordBatch,
    table: &str,
    name: &str,
) -> Result<(&'a ArrayRef, Field)> {
    let schema = batch.schema();
    let index = schema
        .index_of(name)
        .map_err(|_| Error::missing_column(table, name))?;
    Ok((batch.column(index), schema.field(index).clone()))
}

/// Read a date-like column (`Date32`, `Date64`, `Timestamp`, ISO `Utf8`) as
/// `Date32` days; every row must carry a date.
pub(crate) fn read_dates(batch: &RecordBatch, table: &str, name: &str) -> Result<Vec<i32>> {
    let (column, field) = find_column(batch, table, name)?;
    let converted = match field.data_type() {
        DataType::Date32 => column.clone(),
        DataType::Date64 | DataType::Timestamp(_, _) | DataType::Utf8 | DataType::LargeUtf8 => {
            cast(column, &DataType::Date32)?
        }
        _ => return Err(type_mismatch(&field, "Date32, Date64, Timestamp or ISO-8601 Utf8")),
    };
    let dates = downcast::<Date32Array>(&converted, name)?;
    if let Some(row) = (0..dates.len()).find(|&i| dates.is_null(i)) {
        return Err(Error::InvalidInput(format!(
            "{table}: column '{name}' has no date in row {row}"
        )));
    }
    if let Some(row) = dates.values().iter().position(|&d| checked_days_to_date(d).is_none()) {
        return Err(Error::InvalidInput(format!(
            "{table}: column '{name}' has an out-of-range date in row {row} ({} days since 1970-01-01)",
            dates.value(row)
        )));
    }
    Ok(dates.values().to_vec())
}

/// Read a numeric column as `f64`, mapping nulls and non-finite values to `None`
pub(crate) fn read_f64(batch: &RecordBatch, table: &str, name: &str) -> Result<Vec<Option<f64>>> {
    let (column, field) = find_column(batch, table, name)?;
    numeric_values(column, &field)
}

pub(crate) fn numeric_values(column: &ArrayRef, field: &Field) -> Result<Vec<Option<f64>>> {
    if !field.data_type().is_numeric() {
        return Err(type_mismatch(field, "numeric"));
    }
    let converted = cast(column, &DataType::Float64)?;
    let values = downcast::<Float64Array>(&converted, field.name())?;
    Ok(values
        .iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Read a label column as strings
pub(crate) fn read_labels(
    batch: &RecordBatch,
    table: &str,
    name: &str,
) -> Result<Vec<Option<String>>> {
    let (column, _) = find_column(batch, table, name)?;
    let converted = cast(column, &DataType::Utf8)?;
    let labels = downcast::<StringArray>(&converted, name)?;
    Ok(labels.iter().map(|l| l.map(str::to_string)).collect())
}

pub(crate) fn date_field() -> Field {
    Field::new(DATE_COLUMN, DataType::Date32, false)
}

pub(crate) fn metric_field(name: &str) -> Field {
    Field::new(name, DataType::Float64, true)
}

pub(crate) fn date_array(days: Vec<i32>) -> ArrayRef {
    Arc::new(Date32Array::from(days))
}

pub(crate) fn metric_array(values: Vec<Option<f64>>) -> ArrayRef {
    Arc::new(Float64Array::from(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn merged_batch(days: Vec<i32>, values: Vec<Option<f64>>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![date_field(), metric_field("value")]));
        RecordBatch::try_new(schema, vec![date_array(days), metric_array(values)]).unwrap()
    }

    #[test]
    fn test_date_days_roundtrip() {
        assert_eq!(date_to_days(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 1);
        assert_eq!(days_to_date(date_to_days(day(15))), day(15));
    }

    #[test]
    fn test_merged_table_rejects_duplicate_dates() {
        let d = date_to_days(day(1));
        let batch = merged_batch(vec![d, d], vec![Some(1.0), Some(2.0)]);
        let err = MergedTable::try_new(batch).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_merged_table_rejects_unsorted_dates() {
        let batch = merged_batch(
            vec![date_to_days(day(2)), date_to_days(day(1))],
            vec![Some(1.0), Some(2.0)],
        );
        assert!(MergedTable::try_new(batch).is_err());
    }

    #[test]
    fn test_merged_table_rejects_non_float_metric() {
        let schema = Arc::new(Schema::new(vec![
            date_field(),
            Field::new("count", DataType::Int32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![date_array(vec![0]), Arc::new(Int32Array::from(vec![1]))],
        )
        .unwrap();
        let err = MergedTable::try_new(batch).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_daily_series_rejects_duplicate_key() {
        let d = date_to_days(day(3));
        let batch = merged_batch(vec![d, d], vec![Some(1.0), None]);
        let err = DailySeries::try_new("wellness", SeriesKey::Date, batch).unwrap_err();
        assert!(err.to_string().contains("2024-01-03"));
    }

    #[test]
    fn test_read_dates_parses_iso_strings() {
        let schema = Arc::new(Schema::new(vec![Field::new("Date", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["2024-01-01", "2024-01-05"]))],
        )
        .unwrap();
        let days = read_dates(&batch, "test", "Date").unwrap();
        assert_eq!(days, vec![date_to_days(day(1)), date_to_days(day(5))]);
    }

    #[test]
    fn test_read_dates_rejects_out_of_range_day() {
        let schema = Arc::new(Schema::new(vec![Field::new("Date", DataType::Date32, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![date_array(vec![date_to_days(day(1)), 100_000_000])],
        )
        .unwrap();
        let err = read_dates(&batch, "endurance sessions", "Date").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let message = err.to_string();
        assert!(message.contains("endurance sessions"));
        assert!(message.contains("'Date'"));
        assert!(message.contains("row 1"));
    }

    #[test]
    fn test_days_to_date_saturates() {
        assert_eq!(checked_days_to_date(100_000_000), None);
        assert_eq!(days_to_date(i32::MAX), NaiveDate::MAX);
        assert_eq!(days_to_date(i32::MIN), NaiveDate::MIN);
    }

    #[test]
    fn test_read_f64_normalizes_nan() {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Float64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Float64Array::from(vec![Some(1.0), Some(f64::NAN), None]))],
        )
        .unwrap();
        assert_eq!(read_f64(&batch, "test", "x").unwrap(), vec![Some(1.0), None, None]);
    }

    #[test]
    fn test_read_f64_rejects_strings() {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Utf8, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["a"]))]).unwrap();
        assert!(matches!(
            read_f64(&batch, "test", "x"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_column_named() {
        let batch = merged_batch(vec![0], vec![Some(1.0)]);
        let err = read_f64(&batch, "endurance events", "RPE").unwrap_err();
        assert_eq!(err.to_string(), "Missing column 'RPE' in endurance events");
    }
}
