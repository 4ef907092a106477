//! Volleyball season: training logs to feature table to subgroup report
//!
//! 1. Generate a seeded season of sessions, strength sets and wellness scores
//! 2. Run the feature pipeline
//! 3. Export CSV and Parquet under the system temp directory
//! 4. Rank single-condition subgroups with a naive threshold scan
//!
//! Run with: cargo run --example volleyball_pipeline --release
//! Set `RUST_LOG=training_features=debug` for per-stage logs.

use anyhow::Context;
use arrow::array::{ArrayRef, Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use training_features::config::DEFAULT_TARGET;
use training_features::mining::{
    format_subgroup_report, top_subgroups, SubgroupDescription, SubgroupMiner, SubgroupSearch,
    REPORT_HEADER,
};
use training_features::pipeline::{FeaturePipeline, TrainingSources};
use training_features::{storage, FeatureTable};

const SEASON_DAYS: i32 = 240;
const FIRST_DAY: i32 = 19_600;

/// Scans every feature for `feature >= median` and `feature < median`
struct MedianSplitMiner;

impl SubgroupMiner for MedianSplitMiner {
    #[allow(clippy::cast_precision_loss)]
    fn discover(
        &self,
        table: &FeatureTable,
        target: &str,
        search: &SubgroupSearch,
    ) -> training_features::Result<Vec<SubgroupDescription>> {
        let target_values = table.values(target)?;
        let overall = table.column_mean(target)?.unwrap_or_default();
        let mut found = Vec::new();

        for name in table.generated_column_names() {
            let feature = table.values(&name)?;
            let mut defined: Vec<f64> = feature.iter().flatten().copied().collect();
            if defined.is_empty() {
                continue;
            }
            defined.sort_by(f64::total_cmp);
            let median = defined[defined.len() / 2];

            for (op, above) in [(">=", true), ("<", false)] {
                let members: Vec<f64> = feature
                    .iter()
                    .zip(&target_values)
                    .filter_map(|(f, t)| match (f, t) {
                        (Some(f), Some(t)) if (*f >= median) == above => Some(*t),
                        _ => None,
                    })
                    .collect();
                if members.len() < search.min_coverage || members.len() > search.max_coverage {
                    continue;
                }
                let average = members.iter().sum::<f64>() / members.len() as f64;
                let share = (members.len() as f64 / target_values.len() as f64).sqrt();
                found.push(SubgroupDescription {
                    conditions: format!("{name} {op} {median:.1}"),
                    coverage: members.len(),
                    average,
                    quality: share * (average - overall).abs(),
                });
            }
        }
        Ok(found)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("┌─ STEP 1: SEASON LOGS ─────────────────────────────────────┐");
    let sources = season(&mut StdRng::seed_from_u64(42))?;
    println!("│ Endurance sessions: {}", sources.endurance.num_rows());
    println!("│ Strength sets:      {}", sources.strength.num_rows());
    println!("│ Wellness days:      {}", sources.metrics[0].1.num_rows());
    println!("└────────────────────────────────────────────────────────────┘\n");

    println!("┌─ STEP 2: FEATURE PIPELINE ────────────────────────────────┐");
    let pipeline = FeaturePipeline::builder().build()?;
    let features = pipeline.transform(&sources)?;
    println!("│ Rows:      {}", features.num_rows());
    println!("│ Columns:   {}", features.num_columns());
    println!("│ Generated: {}", features.generated_column_names().len());
    println!("└────────────────────────────────────────────────────────────┘\n");

    println!("┌─ STEP 3: EXPORT ──────────────────────────────────────────┐");
    let dir = std::env::temp_dir();
    let csv = dir.join("volleyball_features.csv");
    let parquet = dir.join("volleyball_features.parquet");
    storage::export_csv(&features, &csv).context("CSV export")?;
    storage::write_parquet(&features, &parquet).context("Parquet export")?;
    println!("│ {}", csv.display());
    println!("│ {}", parquet.display());
    println!("└────────────────────────────────────────────────────────────┘\n");

    println!("┌─ STEP 4: SUBGROUPS ───────────────────────────────────────┐");
    let search = SubgroupSearch {
        min_coverage: 15,
        depth: 1,
        ..SubgroupSearch::default()
    };
    let found = MedianSplitMiner.discover(&features, DEFAULT_TARGET, &search)?;
    println!("{REPORT_HEADER}");
    print!("{}", format_subgroup_report(&top_subgroups(found, 15)));
    println!(
        "\nAverage of entire dataset: {:.3}",
        features.column_mean(DEFAULT_TARGET)?.unwrap_or(f64::NAN)
    );
    println!("└────────────────────────────────────────────────────────────┘");

    Ok(())
}

/// A season with a rest day every seventh day and strength work twice a week
fn season(rng: &mut StdRng) -> anyhow::Result<TrainingSources> {
    let exercises = ["Back Squat", "Bench Press", "Power Clean", "Box Jump"];

    let (mut e_days, mut rpe, mut duration) = (Vec::new(), Vec::new(), Vec::new());
    let (mut s_days, mut weight, mut reps, mut exercise) =
        (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    let (mut w_days, mut wellness) = (Vec::new(), Vec::new());

    for offset in 0..SEASON_DAYS {
        let day = FIRST_DAY + offset;
        if offset % 7 != 6 {
            for _ in 0..rng.gen_range(1..=2) {
                e_days.push(day);
                rpe.push(f64::from(rng.gen_range(3..=9_i32)));
                duration.push(f64::from(rng.gen_range(45..=120_i32)));
            }
        }
        if offset % 7 == 1 || offset % 7 == 4 {
            for _ in 0..rng.gen_range(4..=8) {
                s_days.push(day);
                weight.push(f64::from(rng.gen_range(8..=28_i32)) * 5.0);
                reps.push(f64::from(rng.gen_range(3..=10_i32)));
                exercise.push(exercises[rng.gen_range(0..exercises.len())]);
            }
        }
        // some mornings the questionnaire is skipped
        if rng.gen_bool(0.9) {
            w_days.push(day);
            wellness.push(f64::from(rng.gen_range(12..=25_i32)));
        }
    }

    let endurance = table(vec![
        ("Date", Arc::new(Date32Array::from(e_days)) as ArrayRef),
        ("RPE", Arc::new(Float64Array::from(rpe)) as ArrayRef),
        ("Duration", Arc::new(Float64Array::from(duration)) as ArrayRef),
    ])?;
    let strength = table(vec![
        ("Date", Arc::new(Date32Array::from(s_days)) as ArrayRef),
        ("Weight", Arc::new(Float64Array::from(weight)) as ArrayRef),
        ("Reps", Arc::new(Float64Array::from(reps)) as ArrayRef),
        ("Exercise", Arc::new(StringArray::from(exercise)) as ArrayRef),
    ])?;
    let wellness = table(vec![
        ("Date", Arc::new(Date32Array::from(w_days)) as ArrayRef),
        (DEFAULT_TARGET, Arc::new(Float64Array::from(wellness)) as ArrayRef),
    ])?;

    Ok(TrainingSources::new(endurance, strength).with_metrics("wellness", wellness))
}

fn table(columns: Vec<(&str, ArrayRef)>) -> anyhow::Result<RecordBatch> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| {
            let nullable = array.data_type() != &DataType::Date32;
            Field::new(*name, array.data_type().clone(), nullable)
        })
        .collect();
    Ok(RecordBatch::try_new(
        Arc::new(Schema::new(fields)),
        columns.into_iter().map(|(_, array)| array).collect(),
    )?)
}
