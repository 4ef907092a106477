//! Feature table persistence (CSV / Parquet)
//!
//! Export is always an explicit call after the pipeline has run; no stage
//! writes to disk. CSV is header plus rows in column insertion order, dates
//! as `YYYY-MM-DD` and undefined values as empty fields. Parquet keeps the
//! Arrow schema (`Date32` date, nullable `Float64` features) and can be read
//! back with [`read_parquet`].

use crate::table::FeatureTable;
use crate::{Error, Result};
use arrow::compute::concat_batches;
use arrow::csv::WriterBuilder;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Rows per Parquet row group; a season of daily rows fits in one
pub const ROW_GROUP_SIZE: usize = 8192;

impl FeatureTable {
    /// Write the table as CSV (header plus rows) to any writer.
    ///
    /// # Errors
    /// Returns error if the writer fails
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = WriterBuilder::new().with_header(true).build(writer);
        csv.write(self.batch())?;
        Ok(())
    }

    /// Render the table as a CSV string
    ///
    /// # Errors
    /// Returns error if a value cannot be formatted
    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| Error::StorageError(format!("CSV output is not UTF-8: {e}")))
    }
}

/// Write a feature table to a CSV file, replacing any existing file.
///
/// # Errors
/// Returns error if the file cannot be created or written
pub fn export_csv<P: AsRef<Path>>(table: &FeatureTable, path: P) -> Result<()> {
    let file = File::create(path.as_ref()).map_err(|e| {
        Error::StorageError(format!(
            "Failed to create CSV file {}: {e}",
            path.as_ref().display()
        ))
    })?;
    table.write_csv(file)?;
    info!(path = %path.as_ref().display(), rows = table.num_rows(), "exported feature table as CSV");
    Ok(())
}

/// Write a feature table to a Parquet file, replacing any existing file.
///
/// # Errors
/// Returns error if the file cannot be created or the Parquet writer fails
pub fn write_parquet<P: AsRef<Path>>(table: &FeatureTable, path: P) -> Result<()> {
    let file = File::create(path.as_ref()).map_err(|e| {
        Error::StorageError(format!(
            "Failed to create Parquet file {}: {e}",
            path.as_ref().display()
        ))
    })?;

    let props = WriterProperties::builder()
        .set_max_row_group_size(ROW_GROUP_SIZE)
        .build();
    let mut writer = ArrowWriter::try_new(file, table.batch().schema(), Some(props))
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet writer: {e}")))?;
    writer
        .write(table.batch())
        .map_err(|e| Error::StorageError(format!("Failed to write record batch: {e}")))?;
    writer
        .close()
        .map_err(|e| Error::StorageError(format!("Failed to finalize Parquet file: {e}")))?;

    info!(
        path = %path.as_ref().display(),
        rows = table.num_rows(),
        columns = table.num_columns(),
        "exported feature table as Parquet"
    );
    Ok(())
}

/// Read a Parquet file back into a single record batch.
///
/// # Errors
/// Returns error if the file cannot be opened, parsed or concatenated
pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<RecordBatch> {
    let file = File::open(path.as_ref())
        .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;
    let schema = builder.schema().clone();
    let reader = builder
        .build()
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch =
            batch.map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
        batches.push(batch);
    }

    Ok(concat_batches(&schema, &batches)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{date_array, date_field, metric_array, metric_field};
    use arrow::datatypes::Schema;
    use std::sync::Arc;

    fn table() -> FeatureTable {
        let schema = Arc::new(Schema::new(vec![
            date_field(),
            metric_field("total_load"),
            metric_field("total_load_mean_1d"),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                date_array(vec![19_723, 19_724]),
                metric_array(vec![Some(300.0), Some(150.5)]),
                metric_array(vec![None, Some(300.0)]),
            ],
        )
        .unwrap();
        FeatureTable::from_parts(batch, 2)
    }

    #[test]
    fn test_csv_header_and_empty_undefined() {
        let csv = table().to_csv_string().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,total_load,total_load_mean_1d");

        let first: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(first[0], "2024-01-01");
        assert_eq!(first[1].parse::<f64>().unwrap(), 300.0);
        assert_eq!(first[2], "");

        let second: Vec<&str> = lines[2].split(',').collect();
        assert_eq!(second[1].parse::<f64>().unwrap(), 150.5);
        assert_eq!(second[2].parse::<f64>().unwrap(), 300.0);
    }

    #[test]
    fn test_parquet_roundtrip_keeps_nulls() {
        let path = std::env::temp_dir().join("training_features_storage_unit.parquet");
        let original = table();
        write_parquet(&original, &path).unwrap();
        let restored = read_parquet(&path).unwrap();
        assert_eq!(restored.schema().fields(), original.batch().schema().fields());
        assert_eq!(restored.columns(), original.batch().columns());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_read_missing_parquet_fails() {
        let err = read_parquet("/nonexistent/features.parquet").unwrap_err();
        assert!(matches!(err, Error::StorageError(_)));
    }
}
