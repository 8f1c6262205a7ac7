//! Fuzzy c-means analysis.
//!
//! Each map gets a membership `uᵢₖ ∈ [0, 1]` in every cluster, with
//! `Σₖ uᵢₖ = 1`. The iteration minimizes
//!
//! ```text
//! J = Σᵢ Σₖ uᵢₖᵐ d²(i, vₖ)
//! ```
//!
//! alternating two steps:
//!
//! 1. **Centroids**: `vₖ` is the weight vector `uᵢₖᵐ / Σⱼ uⱼₖᵐ` over the maps
//! 2. **Memberships**: `uᵢₖ = 1 / Σⱼ (d²(i, vₖ) / d²(i, vⱼ))^(1/(m−1))`
//!
//! Distances to the weighted centroids are computed in relational form from
//! the cached pairwise distances (relational fuzzy c-means, Hathaway et al.
//! 1989), so any distance strategy works.
//!
//! The fuzziness exponent `m > 1` controls overlap: close to 1 the result is
//! nearly hard, large values push memberships towards `1/c`.
//!
//! Iteration stops when no membership moves by `epsilon` or more. At the
//! iteration cap the iterate with the lowest objective is returned and
//! [`ClusteringResult::converged`] is `false`.
//!
//! A map whose distance to a centroid is zero belongs to that centroid
//! alone (the first one, if several coincide).

use super::result::ClusteringResult;
use super::search::{relational_distances, restart_rng, ClusterCount, CountSearch};
use super::traits::{validate_objects, AnalysisContext, ClusterAnalysis};
use crate::error::{Error, Result};
use crate::object::ClusterObject;
use crate::progress::Phase;
use ndarray::{Array2, Zip};
use rand::prelude::*;
use std::sync::Arc;
use tracing::{debug, info_span, trace, warn};

/// Squared distances at or below this are treated as coincidence.
const ZERO_DISTANCE: f64 = 1e-12;

/// Fuzzy c-means analysis.
#[derive(Debug, Clone)]
pub struct FuzzyCMeans {
    ctx: AnalysisContext,
    count: ClusterCount,
    fuzziness: f64,
    epsilon: f64,
    max_iter: usize,
    restarts: usize,
    seed: Option<u64>,
}

impl FuzzyCMeans {
    /// Fuzzy c-means with `m = 2`, `epsilon = 1e-4` and 300 iterations.
    pub fn new(ctx: AnalysisContext, count: ClusterCount) -> Self {
        Self {
            ctx,
            count,
            fuzziness: 2.0,
            epsilon: 1e-4,
            max_iter: 300,
            restarts: 5,
            seed: None,
        }
    }

    /// Set the fuzziness exponent `m`; must exceed 1.
    pub fn with_fuzziness(mut self, m: f64) -> Self {
        self.fuzziness = m;
        self
    }

    /// Set the membership-change tolerance; must be positive.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
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

    fn validate(&self) -> Result<()> {
        if !(self.fuzziness.is_finite() && self.fuzziness > 1.0) {
            let reason = format!("must be finite and > 1, got {}", self.fuzziness);
            return Err(Error::invalid("fuzziness", reason));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            let reason = format!("must be finite and > 0, got {}", self.epsilon);
            return Err(Error::invalid("epsilon", reason));
        }
        if self.max_iter == 0 {
            return Err(Error::invalid("max_iter", "must be >= 1"));
        }
        if self.restarts == 0 {
            return Err(Error::invalid("restarts", "must be >= 1"));
        }
        Ok(())
    }

    /// Centroid weights `c × n` from memberships `n × c`.
    fn centroid_weights(&self, u: &Array2<f64>) -> Array2<f64> {
        let mut weights = u.t().mapv(|x| x.powf(self.fuzziness));
        let n = u.nrows();
        for mut row in weights.rows_mut() {
            let total = row.sum();
            if total > 0.0 {
                row /= total;
            } else {
                row.fill(1.0 / n as f64);
            }
        }
        weights
    }

    /// Memberships from squared object-to-centroid distances.
    fn memberships(&self, d: &Array2<f64>) -> Array2<f64> {
        let exponent = 1.0 / (self.fuzziness - 1.0);
        let mut u = Array2::zeros(d.raw_dim());
        for (mut out, row) in u.rows_mut().into_iter().zip(d.rows()) {
            if let Some(k) = row.iter().position(|&x| x <= ZERO_DISTANCE) {
                out[k] = 1.0;
                continue;
            }
            for k in 0..row.len() {
                let sum: f64 = row.iter().map(|&dj| (row[k] / dj).powf(exponent)).sum();
                out[k] = 1.0 / sum;
            }
        }
        u
    }

    fn objective(&self, u: &Array2<f64>, d: &Array2<f64>) -> f64 {
        Zip::from(u).and(d).fold(0.0, |acc, &uik, &dik| acc + uik.powf(self.fuzziness) * dik)
    }

    fn fit(
        &self,
        objects: &[Arc<ClusterObject>],
        squared: &Array2<f64>,
        c: usize,
        rng: &mut StdRng,
    ) -> Result<ClusteringResult> {
        let n = objects.len();
        let runner = self.ctx.runner();
        let progress = self.ctx.progress();

        let mut u = Array2::from_shape_fn((n, c), |_| rng.random::<f64>() + f64::EPSILON);
        for mut row in u.rows_mut() {
            let total = row.sum();
            row /= total;
        }

        let mut best: Option<(f64, Array2<f64>)> = None;
        let mut converged = false;
        let mut iterations = 0;
        while iterations < self.max_iter {
            self.ctx.check_cancelled()?;
            iterations += 1;

            let d = relational_distances(runner, progress, squared, &self.centroid_weights(&u))?;
            let next = self.memberships(&d);
            let objective = self.objective(&next, &d);
            let change = Zip::from(&next).and(&u).fold(0.0f64, |m, &a, &b| m.max((a - b).abs()));
            trace!(iteration = iterations, objective, change, "fuzzy c-means step");

            if best.as_ref().map_or(true, |(j, _)| objective < *j) {
                best = Some((objective, next.clone()));
            }
            u = next;
            if change < self.epsilon {
                converged = true;
                break;
            }
        }

        let (objective, u) = if converged {
            let d = relational_distances(runner, progress, squared, &self.centroid_weights(&u))?;
            (self.objective(&u, &d), u)
        } else {
            warn!(clusters = c, max_iter = self.max_iter, "fuzzy c-means did not converge");
            best.ok_or_else(|| Error::Other("fuzzy c-means ran no iterations".into()))?
        };
        Ok(ClusteringResult::fuzzy(objects.to_vec(), u)?.with_report(
            converged,
            iterations,
            Some(objective),
        ))
    }
}

impl ClusterAnalysis for FuzzyCMeans {
    fn name(&self) -> &'static str {
        "fuzzy c-means"
    }

    fn analyze(&self, objects: &[Arc<ClusterObject>]) -> Result<ClusteringResult> {
        validate_objects(objects)?;
        let n = objects.len();
        let candidates = self.count.candidates(n)?;
        self.validate()?;

        let span = info_span!(
            "analyze",
            analysis = self.name(),
            objects = n,
            count = ?self.count,
            fuzziness = self.fuzziness
        );
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
        progress.set_note("fuzzy c-means");

        let seed = self.seed.unwrap_or_else(rand::random);
        let result = search.run(&distances, progress, pairs, |c, restart| {
            self.fit(objects, &squared, c, &mut restart_rng(seed, c, restart))
        })?;
        debug!(
            clusters = result.cluster_count(),
            iterations = result.iterations(),
            converged = result.converged(),
            "fuzzy c-means finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{MapDistanceStrategy, StrategyKey};
    use crate::metrics::partition_coefficient;
    use crate::object::ObjectId;
    use crate::runner::TaskRunner;
    use ndarray::array;

    struct Plane;

    impl MapDistanceStrategy for Plane {
        fn key(&self) -> StrategyKey {
            StrategyKey::new("plane", 0)
        }

        fn distance(&self, a: &ClusterObject, b: &ClusterObject) -> Result<f64> {
            crate::distance::euclidean(a.densities(), b.densities())
        }
    }

    fn points(data: &[[f64; 2]]) -> Vec<Arc<ClusterObject>> {
        data.iter()
            .enumerate()
            .map(|(i, p)| Arc::new(ClusterObject::from_densities(ObjectId(i as u64), p.to_vec())))
            .collect()
    }

    fn ctx() -> AnalysisContext {
        AnalysisContext::new(Arc::new(Plane)).with_runner(Arc::new(TaskRunner::with_threads(4)))
    }

    fn analysis() -> FuzzyCMeans {
        FuzzyCMeans::new(ctx(), ClusterCount::fixed(2)).with_seed(5)
    }

    #[test]
    fn test_memberships_sum_to_one() {
        let objs = points(&[[0.0, 0.0], [0.5, 0.0], [3.0, 0.0], [5.5, 0.0], [6.0, 0.0]]);
        let r = analysis().analyze(&objs).unwrap();
        assert!(r.is_fuzzy());
        for o in &objs {
            let sum: f64 = (0..r.cluster_count()).map(|k| r.membership(k, o)).sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
        // The middle point is genuinely shared.
        assert!(r.membership(0, &objs[2]) > 0.2 && r.membership(1, &objs[2]) > 0.2);
    }

    #[test]
    fn test_separated_groups_harden_to_truth() {
        let objs = points(&[
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [9.0, 9.0],
            [9.2, 9.1],
            [9.1, 9.3],
        ]);
        let r = analysis().with_epsilon(1e-4).analyze(&objs).unwrap();
        assert!(r.converged());
        let labels = r.harden().labels();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[3], labels[5]);
        assert_ne!(labels[0], labels[3]);
        assert!(partition_coefficient(r.memberships().unwrap()) > 0.9);
    }

    #[test]
    fn test_zero_distance_takes_full_membership() {
        let f = analysis();
        let d = array![[0.0, 4.0], [1.0, 1.0], [0.0, 0.0]];
        let u = f.memberships(&d);
        assert_eq!(u.row(0).to_vec(), vec![1.0, 0.0]);
        assert!((u[[1, 0]] - 0.5).abs() < 1e-12);
        assert_eq!(u.row(2).to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_iteration_cap_is_not_an_error() {
        let objs = points(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);
        let r = analysis().with_max_iter(1).with_epsilon(1e-12).analyze(&objs).unwrap();
        assert!(!r.converged());
        assert_eq!(r.iterations(), 1);
        assert!(r.objective().is_some());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let objs = points(&[[0.0, 0.0], [1.0, 0.0]]);
        for bad in [
            analysis().with_fuzziness(1.0),
            analysis().with_epsilon(0.0),
            analysis().with_epsilon(-1e-3),
            analysis().with_max_iter(0),
        ] {
            let err = bad.analyze(&objs).unwrap_err();
            assert!(err.is_config(), "{err}");
        }
        let err = analysis().with_epsilon(f64::NAN).analyze(&objs).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "epsilon", .. }));
    }

    #[test]
    fn test_auto_count_picks_three_groups() {
        let objs = points(&[
            [0.0, 0.0],
            [0.2, 0.1],
            [5.0, 5.0],
            [5.1, 5.2],
            [10.0, 0.0],
            [10.2, 0.1],
        ]);
        let r = FuzzyCMeans::new(ctx(), ClusterCount::auto(2, 4))
            .with_seed(9)
            .analyze(&objs)
            .unwrap();
        assert_eq!(r.cluster_count(), 3);
    }
}
