//! K-means analysis.
//!
//! Partitions maps into k clusters by minimizing **within-cluster sum of
//! squares** (WCSS):
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ d²(i, μₖ)
//! ```
//!
//! # Lloyd's Algorithm, relationally
//!
//! 1. Pick k seed maps via k-means++ and assign every map to the nearest seed
//! 2. **Update**: each centroid becomes the uniform weight vector over its members
//! 3. **Assign**: each map moves to the nearest centroid, using
//!    `d²(i, v) = (R v)ᵢ − vᵀ R v / 2` over the squared cached distances
//! 4. Repeat until no map changes cluster (a fixed point) or the iteration
//!    cap is reached
//!
//! Ties keep a map in its current cluster, which is what makes the fixed
//! point reachable. A cluster left empty takes the map farthest from its own
//! centroid among clusters with more than one member.
//!
//! ## K-means++ Initialization
//!
//! 1. Choose the first seed uniformly at random
//! 2. Choose each next seed with probability proportional to D(x)²
//!    (squared distance to the nearest chosen seed)
//!
//! # Cluster count
//!
//! With [`ClusterCount::Auto`] every candidate k is fitted with several
//! restarts and the partition with the best mean silhouette wins.
//! Non-convergence is reported on the result, not raised.

use super::result::ClusteringResult;
use super::search::{relational_distances, restart_rng, ClusterCount, CountSearch};
use super::traits::{validate_objects, AnalysisContext, ClusterAnalysis};
use crate::error::{Error, Result};
use crate::object::ClusterObject;
use crate::progress::Phase;
use ndarray::Array2;
use rand::prelude::*;
use std::sync::Arc;
use tracing::{debug, info_span, trace, warn};

/// K-means analysis.
#[derive(Debug, Clone)]
pub struct KMeans {
    ctx: AnalysisContext,
    /// Number of clusters, or the range searched.
    count: ClusterCount,
    /// Maximum iterations per fit.
    max_iter: usize,
    /// Random initializations per candidate count.
    restarts: usize,
    /// Random seed.
    seed: Option<u64>,
}

impl KMeans {
    /// Create a new K-means analysis.
    pub fn new(ctx: AnalysisContext, count: ClusterCount) -> Self {
        Self {
            ctx,
            count,
            max_iter: 100,
            restarts: 5,
            seed: None,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set random initializations per candidate count.
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Choose k seed maps with k-means++ over squared distances.
    fn init_seeds(squared: &Array2<f64>, k: usize, rng: &mut impl Rng) -> Vec<usize> {
        let n = squared.nrows();
        let mut seeds = Vec::with_capacity(k);
        seeds.push(rng.random_range(0..n));

        let mut nearest: Vec<f64> = (0..n).map(|j| squared[[j, seeds[0]]]).collect();
        while seeds.len() < k {
            let total: f64 = nearest.iter().sum();
            let selected = if total > 0.0 {
                let threshold = rng.random::<f64>() * total;
                let mut cumsum = 0.0;
                let mut selected = n - 1;
                for (j, &d) in nearest.iter().enumerate() {
                    cumsum += d;
                    if d > 0.0 && cumsum >= threshold {
                        selected = j;
                        break;
                    }
                }
                selected
            } else {
                // Every map coincides with a seed: pick any unused one.
                let unused: Vec<usize> = (0..n).filter(|j| !seeds.contains(j)).collect();
                unused[rng.random_range(0..unused.len())]
            };
            seeds.push(selected);
            for (j, d) in nearest.iter_mut().enumerate() {
                *d = d.min(squared[[j, selected]]);
            }
        }
        seeds
    }

    /// Move maps into empty clusters; `cost[i]` is map i's distance to its
    /// own centroid.
    fn fill_empty(labels: &mut [usize], k: usize, cost: &mut [f64]) -> Result<()> {
        let mut sizes = vec![0usize; k];
        labels.iter().for_each(|&l| sizes[l] += 1);
        for empty in 0..k {
            if sizes[empty] > 0 {
                continue;
            }
            let donor = (0..labels.len())
                .filter(|&i| sizes[labels[i]] > 1)
                .fold(None, |best: Option<usize>, i| match best {
                    Some(b) if cost[b] >= cost[i] => Some(b),
                    _ => Some(i),
                })
                .ok_or_else(|| Error::Other("no map available to fill an empty cluster".into()))?;
            trace!(cluster = empty, map = donor, "refilling empty cluster");
            sizes[labels[donor]] -= 1;
            labels[donor] = empty;
            sizes[empty] = 1;
            cost[donor] = 0.0;
        }
        Ok(())
    }

    fn centroid_weights(labels: &[usize], k: usize) -> Array2<f64> {
        let mut sizes = vec![0usize; k];
        labels.iter().for_each(|&l| sizes[l] += 1);
        let mut weights = Array2::zeros((k, labels.len()));
        for (i, &l) in labels.iter().enumerate() {
            weights[[l, i]] = 1.0 / sizes[l] as f64;
        }
        weights
    }

    fn fit(
        &self,
        objects: &[Arc<ClusterObject>],
        squared: &Array2<f64>,
        k: usize,
        rng: &mut StdRng,
    ) -> Result<ClusteringResult> {
        let n = objects.len();
        let runner = self.ctx.runner();
        let progress = self.ctx.progress();

        let seeds = Self::init_seeds(squared, k, rng);
        let mut labels = vec![0usize; n];
        let mut cost = vec![0.0; n];
        for i in 0..n {
            let (best, d) = seeds
                .iter()
                .enumerate()
                .map(|(c, &s)| (c, squared[[i, s]]))
                .fold((0, f64::INFINITY), |b, (c, d)| if d < b.1 { (c, d) } else { b });
            labels[i] = best;
            cost[i] = d;
        }

        let mut converged = false;
        let mut iterations = 0;
        while iterations < self.max_iter {
            self.ctx.check_cancelled()?;
            iterations += 1;
            Self::fill_empty(&mut labels, k, &mut cost)?;

            let weights = Self::centroid_weights(&labels, k);
            let d = relational_distances(runner, progress, squared, &weights)?;
            let mut changed = 0;
            for (i, row) in d.rows().into_iter().enumerate() {
                let current = labels[i];
                let mut best = (current, row[current]);
                for (c, &dist) in row.iter().enumerate() {
                    if dist < best.1 {
                        best = (c, dist);
                    }
                }
                if best.0 != current {
                    labels[i] = best.0;
                    changed += 1;
                }
                cost[i] = best.1;
            }
            trace!(iteration = iterations, changed, "k-means step");
            if changed == 0 {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(clusters = k, max_iter = self.max_iter, "k-means did not reach a fixed point");
        }

        Self::fill_empty(&mut labels, k, &mut cost)?;
        let weights = Self::centroid_weights(&labels, k);
        let d = relational_distances(runner, progress, squared, &weights)?;
        let wcss: f64 = labels.iter().enumerate().map(|(i, &l)| d[[i, l]]).sum();
        Ok(ClusteringResult::from_labels(objects.to_vec(), &labels)?.with_report(
            converged,
            iterations,
            Some(wcss),
        ))
    }
}

impl ClusterAnalysis for KMeans {
    fn name(&self) -> &'static str {
        "k-means"
    }

    fn analyze(&self, objects: &[Arc<ClusterObject>]) -> Result<ClusteringResult> {
        validate_objects(objects)?;
        let n = objects.len();
        let candidates = self.count.candidates(n)?;
        if self.max_iter == 0 {
            return Err(Error::invalid("max_iter", "must be >= 1"));
        }
        if self.restarts == 0 {
            return Err(Error::invalid("restarts", "must be >= 1"));
        }

        let span = info_span!("analyze", analysis = self.name(), objects = n, count = ?self.count);
        let _enter = span.enter();

        let search = CountSearch {
            candidates,
            restarts: self.restarts,
        };
        let progress = self.ctx.progress();
        let pairs = n * (n - 1) / 2;
        progress.set_total(pairs + search.fits());
        let distances = self.ctx.distance_matrix(objects, &Phase::new(progress, 0))?;
        let squared = distances.squared();
        progress.set_note("k-means");

        let seed = self.seed.unwrap_or_else(rand::random);
        let result = search.run(&distances, progress, pairs, |k, restart| {
            self.fit(objects, &squared, k, &mut restart_rng(seed, k, restart))
        })?;
        debug!(
            clusters = result.cluster_count(),
            iterations = result.iterations(),
            converged = result.converged(),
            "k-means finished"
        );
        Ok(result)
    }
}
