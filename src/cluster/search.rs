//! Shared machinery of the partitional analyses: cluster-count selection,
//! random restarts, and object-to-cluster distances in relational form.
//!
//! K-means and fuzzy c-means never see coordinates. A cluster "centroid" is a
//! weight vector `v` over the objects (summing to 1), and with `R` the matrix
//! of squared pairwise distances the squared distance from object `i` to it is
//!
//! ```text
//! d²(i, v) = (R v)ᵢ − vᵀ R v / 2
//! ```
//!
//! which equals the squared Euclidean distance to the weighted mean whenever
//! the distances are Euclidean (Hathaway, Davenport & Bezdek 1989). This
//! lets both analyses run on any [`MapDistanceStrategy`](crate::distance::MapDistanceStrategy)
//! and keeps every object distance behind the cache.

use super::result::ClusteringResult;
use crate::distance::DistanceMatrix;
use crate::error::{Error, Result};
use crate::metrics::silhouette;
use crate::progress::{ProgressSink, Silenced};
use crate::runner::TaskRunner;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::ops::RangeInclusive;
use tracing::debug;

/// How many clusters a partitional analysis produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClusterCount {
    /// Exactly this many clusters.
    Fixed(usize),
    /// The best count in `min..=max` by mean silhouette width.
    Auto {
        /// Smallest candidate, at least 2.
        min: usize,
        /// Largest candidate; clamped to the number of objects.
        max: usize,
    },
}

impl ClusterCount {
    /// A fixed count.
    pub fn fixed(c: usize) -> Self {
        ClusterCount::Fixed(c)
    }

    /// Search `min..=max`.
    pub fn auto(min: usize, max: usize) -> Self {
        ClusterCount::Auto { min, max }
    }

    /// Candidate counts for `n_items` objects.
    pub fn candidates(&self, n_items: usize) -> Result<RangeInclusive<usize>> {
        match *self {
            ClusterCount::Fixed(c) => {
                if c == 0 || c > n_items {
                    return Err(Error::InvalidClusterCount {
                        requested: c,
                        n_items,
                    });
                }
                Ok(c..=c)
            }
            ClusterCount::Auto { min, max } => {
                if min < 2 {
                    let reason = format!("automatic count starts at 2, got {min}");
                    return Err(Error::invalid("min", reason));
                }
                if max < min {
                    return Err(Error::invalid("max", format!("{max} is below min {min}")));
                }
                if min > n_items {
                    return Err(Error::InvalidClusterCount {
                        requested: min,
                        n_items,
                    });
                }
                Ok(min..=max.min(n_items))
            }
        }
    }
}

/// Seed for one restart of one candidate count.
pub(crate) fn restart_rng(seed: u64, clusters: usize, restart: usize) -> StdRng {
    let mixed = seed
        ^ (clusters as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (restart as u64 + 1).wrapping_mul(0xD1B5_4A32_D192_ED03);
    StdRng::seed_from_u64(mixed)
}

/// Candidate counts times restarts, with progress reporting.
#[derive(Debug, Clone)]
pub(crate) struct CountSearch {
    pub candidates: RangeInclusive<usize>,
    pub restarts: usize,
}

impl CountSearch {
    /// Number of fits the search performs.
    pub fn fits(&self) -> usize {
        self.candidates.clone().count() * self.restarts
    }

    /// Run `fit(c, restart)` for every candidate and restart.
    ///
    /// Per candidate, the restart with the lowest objective wins (first on
    /// ties). Across candidates, the highest silhouette of the hardened
    /// partition wins, the smaller count on ties. Progress reports completed
    /// fits starting at `offset`.
    pub fn run<F>(
        &self,
        distances: &DistanceMatrix,
        progress: &dyn ProgressSink,
        offset: usize,
        mut fit: F,
    ) -> Result<ClusteringResult>
    where
        F: FnMut(usize, usize) -> Result<ClusteringResult>,
    {
        let single = self.candidates.start() == self.candidates.end();
        let mut done = 0;
        let mut best: Option<(f64, ClusteringResult)> = None;
        for c in self.candidates.clone() {
            let mut chosen: Option<ClusteringResult> = None;
            for restart in 0..self.restarts.max(1) {
                if progress.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let result = fit(c, restart)?;
                done += 1;
                progress.set_current(offset + done);
                let objective = result.objective().unwrap_or(f64::INFINITY);
                if chosen
                    .as_ref()
                    .map_or(true, |b| objective < b.objective().unwrap_or(f64::INFINITY))
                {
                    chosen = Some(result);
                }
            }
            let Some(result) = chosen else {
                continue;
            };
            if single {
                return Ok(result);
            }
            let score = silhouette(distances.as_array().view(), &result.harden().labels());
            debug!(
                clusters = c,
                silhouette = score,
                objective = ?result.objective(),
                "candidate count"
            );
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, result));
            }
        }
        best.map(|(_, r)| r).ok_or(Error::EmptyInput)
    }
}

/// Squared distances from every object to every weighted centroid.
///
/// `squared` is the `n × n` matrix of squared pairwise distances and
/// `weights` is `c × n` with rows summing to 1. Returns `n × c`, clamped at 0.
pub(crate) fn relational_distances(
    runner: &TaskRunner,
    progress: &dyn ProgressSink,
    squared: &Array2<f64>,
    weights: &Array2<f64>,
) -> Result<Array2<f64>> {
    let (c, n) = weights.dim();
    if squared.dim() != (n, n) {
        return Err(Error::DimensionMismatch {
            expected: n,
            found: squared.nrows(),
        });
    }
    // Row i holds (R v_k)_i for every k.
    let rv: Vec<Array1<f64>> =
        runner.map_range(n, &Silenced(progress), |i| Ok(weights.dot(&squared.row(i))))?;

    let mut half = vec![0.0; c];
    for (i, row) in rv.iter().enumerate() {
        for k in 0..c {
            half[k] += weights[[k, i]] * row[k];
        }
    }
    half.iter_mut().for_each(|h| *h /= 2.0);

    Ok(Array2::from_shape_fn((n, c), |(i, k)| (rv[i][k] - half[k]).max(0.0)))
}
