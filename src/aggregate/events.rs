//! Raw training events
//!
//! One record per physical event. Decoding from Arrow validates the required
//! columns by name, so a renamed column fails here with
//! [`Error::MissingColumn`](crate::Error::MissingColumn).

use crate::config::SourceColumns;
use crate::table::{days_to_date, read_dates, read_f64, read_labels};
use crate::Result;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;

/// Table name used in errors for strength sources
pub const STRENGTH_SOURCE: &str = "strength events";

/// Table name used in errors for endurance sources
pub const ENDURANCE_SOURCE: &str = "endurance events";

/// A measurement is usable when it is finite and non-zero.
///
/// A zero weight, repetition count, RPE or duration carries no training
/// stress information and is treated as missing.
fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != 0.0)
}

/// Common view of an event for the group-by-reduce
pub trait TrainingEvent {
    /// Calendar day of the event
    fn date(&self) -> NaiveDate;

    /// Category label (strength body part / exercise), if any
    fn category(&self) -> Option<&str> {
        None
    }

    /// Raw measurements summarized per day, in palette order
    fn measurements(&self) -> [Option<f64>; 2];

    /// Scalar training load, undefined if any measurement is
    fn load(&self) -> Option<f64> {
        let [a, b] = self.measurements();
        Some(a? * b?)
    }
}

/// One strength set
#[derive(Debug, Clone, PartialEq)]
pub struct StrengthEvent {
    /// Day of the set
    pub date: NaiveDate,
    /// Exercise / body part label
    pub category: Option<String>,
    /// Lifted weight
    pub weight: Option<f64>,
    /// Repetitions
    pub repetitions: Option<f64>,
}

impl StrengthEvent {
    /// Create an uncategorized set
    #[must_use]
    pub fn new(date: NaiveDate, weight: f64, repetitions: f64) -> Self {
        Self {
            date,
            category: None,
            weight: usable(Some(weight)),
            repetitions: usable(Some(repetitions)),
        }
    }

    /// Attach a category label
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Decode sets from a preprocessed strength table.
    ///
    /// The category column is optional; when absent every set is
    /// uncategorized.
    ///
    /// # Errors
    /// Returns error if the date, weight or repetition column is missing or
    /// has an unusable type
    pub fn from_batch(batch: &RecordBatch, columns: &SourceColumns) -> Result<Vec<Self>> {
        let dates = read_dates(batch, STRENGTH_SOURCE, &columns.date)?;
        let weights = read_f64(batch, STRENGTH_SOURCE, &columns.weight)?;
        let reps = read_f64(batch, STRENGTH_SOURCE, &columns.repetitions)?;
        let categories = if batch.schema().index_of(&columns.category).is_ok() {
            read_labels(batch, STRENGTH_SOURCE, &columns.category)?
        } else {
            vec![None; batch.num_rows()]
        };

        Ok(dates
            .into_iter()
            .zip(weights)
            .zip(reps)
            .zip(categories)
            .map(|(((day, weight), repetitions), category)| Self {
                date: days_to_date(day),
                category,
                weight: usable(weight),
                repetitions: usable(repetitions),
            })
            .collect())
    }
}

impl TrainingEvent for StrengthEvent {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn measurements(&self) -> [Option<f64>; 2] {
        [self.weight, self.repetitions]
    }
}

/// One endurance session
#[derive(Debug, Clone, PartialEq)]
pub struct EnduranceEvent {
    /// Day of the session
    pub date: NaiveDate,
    /// Session RPE (1-10)
    pub rpe: Option<f64>,
    /// Session duration in minutes
    pub duration_minutes: Option<f64>,
}

impl EnduranceEvent {
    /// Create a session
    #[must_use]
    pub fn new(date: NaiveDate, rpe: f64, duration_minutes: f64) -> Self {
        Self {
            date,
            rpe: usable(Some(rpe)),
            duration_minutes: usable(Some(duration_minutes)),
        }
    }

    /// Decode sessions from a preprocessed endurance table.
    ///
    /// # Errors
    /// Returns error if the date, RPE or duration column is missing or has an
    /// unusable type
    pub fn from_batch(batch: &RecordBatch, columns: &SourceColumns) -> Result<Vec<Self>> {
        let dates = read_dates(batch, ENDURANCE_SOURCE, &columns.date)?;
        let rpe = read_f64(batch, ENDURANCE_SOURCE, &columns.rpe)?;
        let duration = read_f64(batch, ENDURANCE_SOURCE, &columns.duration)?;

        Ok(dates
            .into_iter()
            .zip(rpe)
            .zip(duration)
            .map(|((day, rpe), duration)| Self {
                date: days_to_date(day),
                rpe: usable(rpe),
                duration_minutes: usable(duration),
            })
            .collect())
    }
}

impl TrainingEvent for EnduranceEvent {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn measurements(&self) -> [Option<f64>; 2] {
        [self.rpe, self.duration_minutes]
    }
}
