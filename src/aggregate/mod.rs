//! Event aggregation: irregular per-event records to one row per day
//!
//! A pure group-by-reduce. Each event first gets a scalar load, then every
//! (date[, category]) group is summarized with a fixed palette:
//!
//! | column              | value                              |
//! |---------------------|------------------------------------|
//! | `num_*`             | events in the group                |
//! | `total/max/avg_*`   | sum / max / mean of the load       |
//! | `max/avg_<measure>` | max / mean of each raw measurement |
//!
//! An undefined value anywhere in a group makes every summary of that
//! quantity undefined for the group; the event count is always defined.

mod events;

pub use events::{
    EnduranceEvent, StrengthEvent, TrainingEvent, ENDURANCE_SOURCE, STRENGTH_SOURCE,
};

use crate::table::{
    date_array, date_field, date_to_days, metric_array, metric_field, DailySeries, SeriesKey,
};
use crate::Result;
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Output column names for one event type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    /// Event count column
    pub count: &'static str,
    /// Sum / max / mean of the load
    pub load: [&'static str; 3],
    /// Max / mean of each raw measurement, in [`TrainingEvent::measurements`] order
    pub measurements: [[&'static str; 2]; 2],
}

impl Palette {
    /// Strength sets: load = weight x repetitions
    pub const STRENGTH: Self = Self {
        count: "num_sets",
        load: ["total_strength_load", "max_strength_load", "avg_strength_load"],
        measurements: [
            ["max_weight", "avg_weight"],
            ["max_repetitions", "avg_repetitions"],
        ],
    };

    /// Endurance sessions: load = RPE x duration
    pub const ENDURANCE: Self = Self {
        count: "num_sessions",
        load: ["total_load", "max_load", "avg_load"],
        measurements: [["max_RPE", "avg_RPE"], ["max_duration", "avg_duration"]],
    };

    /// Summary column names in output order
    #[must_use]
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut names = vec![self.count];
        names.extend(self.load);
        for pair in self.measurements {
            names.extend(pair);
        }
        names
    }
}

/// Sum, max and mean of a group; `None` if any member is undefined
#[derive(Debug, Clone, Copy, PartialEq)]
struct Summary {
    sum: f64,
    max: f64,
    mean: f64,
}

#[allow(clippy::cast_precision_loss)]
fn summarize(values: impl Iterator<Item = Option<f64>>) -> Option<Summary> {
    let mut sum = 0.0;
    let mut max = f64::NEG_INFINITY;
    let mut n = 0usize;
    for value in values {
        let v = value?;
        sum += v;
        max = max.max(v);
        n += 1;
    }
    (n > 0).then(|| Summary {
        sum,
        max,
        mean: sum / n as f64,
    })
}

/// Group-by-reduce from events to daily series
pub struct EventAggregator;

impl EventAggregator {
    /// Aggregate strength sets, per day or per (day, category).
    ///
    /// # Errors
    /// Returns error if the aggregated series violates its key invariant
    pub fn strength(
        events: &[StrengthEvent],
        key: SeriesKey,
        category_column: &str,
    ) -> Result<DailySeries> {
        Self::aggregate(STRENGTH_SOURCE, events, key, category_column, &Palette::STRENGTH)
    }

    /// Aggregate endurance sessions per day.
    ///
    /// # Errors
    /// Returns error if the aggregated series violates its key invariant
    pub fn endurance(events: &[EnduranceEvent]) -> Result<DailySeries> {
        Self::aggregate(ENDURANCE_SOURCE, events, SeriesKey::Date, "", &Palette::ENDURANCE)
    }

    /// Generic group-by-reduce over any event type.
    ///
    /// Rows come out sorted by date, then category (uncategorized first).
    ///
    /// # Errors
    /// Returns error if the result cannot be assembled or repeats a key
    #[allow(clippy::cast_precision_loss)]
    pub fn aggregate<E: TrainingEvent>(
        name: &str,
        events: &[E],
        key: SeriesKey,
        category_column: &str,
        palette: &Palette,
    ) -> Result<DailySeries> {
        let mut groups: BTreeMap<(i32, Option<&str>), Vec<&E>> = BTreeMap::new();
        for event in events {
            let category = match key {
                SeriesKey::Date => None,
                SeriesKey::DateCategory => event.category(),
            };
            groups
                .entry((date_to_days(event.date()), category))
                .or_default()
                .push(event);
        }

        let rows = groups.len();
        let mut days = Vec::with_capacity(rows);
        let mut labels: Vec<Option<&str>> = Vec::with_capacity(rows);
        let mut stats: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(rows); 7];
        let mut counts = Vec::with_capacity(rows);

        for ((day, category), members) in &groups {
            days.push(*day);
            labels.push(*category);
            counts.push(Some(members.len() as f64));

            let load = summarize(members.iter().map(|e| e.load()));
            stats[0].push(load.map(|s| s.sum));
            stats[1].push(load.map(|s| s.max));
            stats[2].push(load.map(|s| s.mean));

            for m in 0..2 {
                let summary = summarize(members.iter().map(|e| e.measurements()[m]));
                stats[3 + 2 * m].push(summary.map(|s| s.max));
                stats[4 + 2 * m].push(summary.map(|s| s.mean));
            }
        }

        let mut fields = vec![date_field()];
        let mut columns: Vec<ArrayRef> = vec![date_array(days)];
        if key == SeriesKey::DateCategory {
            fields.push(Field::new(category_column, DataType::Utf8, true));
            columns.push(Arc::new(StringArray::from(labels)));
        }
        fields.push(metric_field(palette.count));
        columns.push(metric_array(counts));
        for (name, values) in palette.column_names().into_iter().skip(1).zip(stats) {
            fields.push(metric_field(name));
            columns.push(metric_array(values));
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        debug!(source = name, events = events.len(), rows, "aggregated events per day");
        DailySeries::try_new(name, key, batch)
    }
}
