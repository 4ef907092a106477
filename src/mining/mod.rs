//! Pattern-mining hand-off
//!
//! The feature table is consumed by an exceptional-model-mining engine that
//! lives outside this crate. This module fixes the contract on our side: the
//! search and significance settings, the shape of a discovered subgroup,
//! top-K ranking and the plain-text report.
//!
//! Ranking uses a bounded min-heap, so selecting the best `k` of `n`
//! subgroups costs O(n log k) instead of a full sort.

use crate::table::FeatureTable;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Write as _;

/// Header line printed above [`format_subgroup_report`] output
pub const REPORT_HEADER: &str = "Feature(s) and conditions ||| coverage ||| average ||| quality";

/// Beam-search settings for subgroup discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubgroupSearch {
    /// Smallest subgroup worth reporting (rows)
    pub min_coverage: usize,
    /// Largest subgroup worth reporting (rows)
    pub max_coverage: usize,
    /// Maximum number of conjoined conditions
    pub depth: usize,
}

impl Default for SubgroupSearch {
    fn default() -> Self {
        Self {
            min_coverage: 10,
            max_coverage: 100,
            depth: 2,
        }
    }
}

impl SubgroupSearch {
    /// Check the coverage bounds and depth.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `depth` is zero or the coverage
    /// range is empty
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::InvalidConfig("search depth must be at least 1".to_string()));
        }
        if self.min_coverage > self.max_coverage {
            return Err(Error::InvalidConfig(format!(
                "min_coverage {} exceeds max_coverage {}",
                self.min_coverage, self.max_coverage
            )));
        }
        Ok(())
    }
}

/// Swap-randomisation significance settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapRandomisation {
    /// Number of target permutations
    pub runs: usize,
    /// Significance level
    pub alpha: f64,
}

impl Default for SwapRandomisation {
    fn default() -> Self {
        Self {
            runs: 100,
            alpha: 0.05,
        }
    }
}

impl SwapRandomisation {
    /// Check the run count and significance level.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `runs` is zero or `alpha` is not
    /// inside `(0, 1)`
    pub fn validate(&self) -> Result<()> {
        if self.runs == 0 {
            return Err(Error::InvalidConfig("at least one randomisation run is required".to_string()));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// One discovered subgroup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgroupDescription {
    /// Human-readable conjunction of feature conditions
    pub conditions: String,
    /// Rows covered by the subgroup
    pub coverage: usize,
    /// Target average inside the subgroup
    pub average: f64,
    /// Quality score (higher is more exceptional)
    pub quality: f64,
}

impl SubgroupDescription {
    /// Report line: `<conditions> ||| <coverage> ||| <average:.2> ||| <quality:.4>`
    #[must_use]
    pub fn report_line(&self) -> String {
        format!(
            "{} ||| {} ||| {:.2} ||| {:.4}",
            self.conditions, self.coverage, self.average, self.quality
        )
    }
}

/// Subgroup discovery over a feature table
pub trait SubgroupMiner {
    /// Discover subgroups whose target average deviates from the dataset's.
    ///
    /// # Errors
    /// Returns error if the target is missing or the search fails
    fn discover(
        &self,
        table: &FeatureTable,
        target: &str,
        search: &SubgroupSearch,
    ) -> Result<Vec<SubgroupDescription>>;
}

/// Quality threshold above which a subgroup is unlikely to be spurious
pub trait SignificanceEstimator {
    /// Estimate the quality threshold at level `settings.alpha`.
    ///
    /// # Errors
    /// Returns error if the target is missing or estimation fails
    fn quality_threshold(
        &self,
        table: &FeatureTable,
        target: &str,
        settings: &SwapRandomisation,
    ) -> Result<f64>;
}

// Heap entry ordered worst-first: lower quality, then later position
#[derive(Debug)]
struct Ranked {
    quality: f64,
    position: usize,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .quality
            .total_cmp(&self.quality)
            .then(self.position.cmp(&other.position))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `k` highest-quality subgroups, best first.
///
/// Equal qualities keep their input order. NaN qualities rank last.
#[must_use]
pub fn top_subgroups(results: Vec<SubgroupDescription>, k: usize) -> Vec<SubgroupDescription> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(k + 1);
    for (position, subgroup) in results.iter().enumerate() {
        let quality = if subgroup.quality.is_nan() {
            f64::NEG_INFINITY
        } else {
            subgroup.quality
        };
        heap.push(Ranked { quality, position });
        if heap.len() > k {
            heap.pop();
        }
    }

    // ascending order is best first
    let keep = heap.into_sorted_vec();

    let mut slots: Vec<Option<SubgroupDescription>> = results.into_iter().map(Some).collect();
    keep.into_iter()
        .filter_map(|r| slots[r.position].take())
        .collect()
}

/// One report line per subgroup, in the given order
#[must_use]
pub fn format_subgroup_report(subgroups: &[SubgroupDescription]) -> String {
    let mut out = String::new();
    for subgroup in subgroups {
        let _ = writeln!(out, "{}", subgroup.report_line());
    }
    out
}
