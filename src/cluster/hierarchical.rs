//! Agglomerative hierarchical analysis.
//!
//! Bottom-up clustering: every map starts as its own cluster and the two
//! closest clusters are merged until the termination rule fires or a single
//! cluster remains. The merge history is kept as a [`Dendrogram`] on the
//! result, so the tree can be cut again at other heights.
//!
//! # Determinism
//!
//! Cluster slots are identified by their smallest member index. Candidate
//! pairs are scanned in `(i, j)` order and only a strictly smaller distance
//! replaces the current best, so ties go to the lowest index pair. Results
//! depend only on the distances and the input order, not on how the distance
//! warm-up was scheduled.
//!
//! # Linkage and strategy
//!
//! [`Linkage::Centroid`] and [`Linkage::Ward`] place maps at their
//! covariance samples and are rejected with [`Error::IncompatibleLinkage`]
//! unless the context uses [`CovarianceDistance`](crate::distance::CovarianceDistance).

use super::dendrogram::Dendrogram;
use super::linkage::{Linkage, LinkageMethod, LinkageSpace};
use super::result::ClusteringResult;
use super::termination::Termination;
use super::traits::{validate_objects, AnalysisContext, ClusterAnalysis};
use crate::error::{Error, Result};
use crate::object::ClusterObject;
use crate::progress::{Phase, Silenced};
use ndarray::Array2;
use std::sync::Arc;
use tracing::{debug, info_span, trace};

/// Agglomerative hierarchical analysis.
#[derive(Debug, Clone)]
pub struct HierarchicalAnalysis {
    ctx: AnalysisContext,
    linkage: Linkage,
    termination: Termination,
}

struct Slot {
    members: Vec<usize>,
    node: usize,
}

impl HierarchicalAnalysis {
    /// Create a new hierarchical analysis.
    pub fn new(ctx: AnalysisContext, linkage: Linkage, termination: Termination) -> Self {
        Self {
            ctx,
            linkage,
            termination,
        }
    }

    /// Set linkage method.
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Set termination rule.
    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    /// The linkage method.
    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// The termination rule.
    pub fn termination(&self) -> Termination {
        self.termination
    }

    fn validate(&self, n_items: usize) -> Result<()> {
        self.termination.validate(n_items)?;
        if self.linkage.requires_vector_space() && self.ctx.strategy().covariance().is_none() {
            return Err(Error::IncompatibleLinkage {
                linkage: self.linkage,
            });
        }
        Ok(())
    }

    fn vectors(&self, objects: &[Arc<ClusterObject>]) -> Result<Option<Vec<Arc<[f64]>>>> {
        if !self.linkage.requires_vector_space() {
            return Ok(None);
        }
        let Some(cov) = self.ctx.strategy().covariance() else {
            return Ok(None);
        };
        let progress = Silenced(self.ctx.progress());
        self.ctx
            .runner()
            .map_range(objects.len(), &progress, |i| cov.vector(&objects[i]))
            .map(Some)
    }
}

impl ClusterAnalysis for HierarchicalAnalysis {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    fn analyze(&self, objects: &[Arc<ClusterObject>]) -> Result<ClusteringResult> {
        validate_objects(objects)?;
        let n = objects.len();
        self.validate(n)?;

        let span = info_span!(
            "analyze",
            analysis = self.name(),
            objects = n,
            linkage = ?self.linkage
        );
        let _enter = span.enter();

        let progress = self.ctx.progress();
        let pairs = n * (n - 1) / 2;
        progress.set_total(pairs + n - 1);
        let distances = self.ctx.distance_matrix(objects, &Phase::new(progress, 0))?;
        let vectors = self.vectors(objects)?;
        let space = LinkageSpace {
            distances: &distances,
            vectors: vectors.as_deref(),
        };
        progress.set_note("merging clusters");

        let mut slots: Vec<Option<Slot>> = (0..n)
            .map(|i| {
                Some(Slot {
                    members: vec![i],
                    node: i,
                })
            })
            .collect();
        let mut between = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self.linkage.cluster_distance(&space, &[i], &[j])?;
                between[[i, j]] = d;
                between[[j, i]] = d;
            }
        }

        let mut dendrogram = Dendrogram::new(n);
        let mut criterion = self.termination.criterion();
        let mut active = n;
        while active > 1 {
            self.ctx.check_cancelled()?;

            let mut best: Option<(usize, usize, f64)> = None;
            for i in 0..n {
                if slots[i].is_none() {
                    continue;
                }
                for j in (i + 1)..n {
                    if slots[j].is_none() {
                        continue;
                    }
                    let d = between[[i, j]];
                    if best.map_or(true, |(_, _, b)| d < b) {
                        best = Some((i, j, d));
                    }
                }
            }
            let Some((i, j, distance)) = best else {
                break;
            };
            if criterion.should_stop(active, distance) {
                debug!(clusters = active, next = distance, "termination criterion met");
                break;
            }

            let absorbed = slots[j]
                .take()
                .ok_or_else(|| Error::Other("merge into an empty slot".into()))?;
            let target = slots[i]
                .as_mut()
                .ok_or_else(|| Error::Other("merge into an empty slot".into()))?;
            target.members.extend(absorbed.members);
            target.members.sort_unstable();
            let size = target.members.len();
            target.node = dendrogram.add_merge(target.node, absorbed.node, distance, size);
            active -= 1;
            criterion.record_merge(distance);
            trace!(a = i, b = j, distance, clusters = active, "merge");

            let merged = &slots[i];
            for k in 0..n {
                let (Some(a), Some(b)) = (merged, &slots[k]) else {
                    continue;
                };
                if k == i {
                    continue;
                }
                let d = self.linkage.cluster_distance(&space, &a.members, &b.members)?;
                between[[i, k]] = d;
                between[[k, i]] = d;
            }
            progress.set_current(pairs + dendrogram.n_merges());
        }

        debug!(clusters = active, merges = dendrogram.n_merges(), "agglomeration finished");
        let merges = dendrogram.n_merges();
        let clusters = slots.into_iter().flatten().map(|s| s.members).collect();
        Ok(ClusteringResult::hard(objects.to_vec(), clusters)?
            .with_dendrogram(dendrogram)
            .with_report(true, merges, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{MapDistanceStrategy, OverlapDistance, StrategyKey};
    use crate::object::ObjectId;
    use crate::progress::CancelFlag;
    use crate::runner::TaskRunner;

    /// First density read as a position on a line.
    struct OnLine;

    impl MapDistanceStrategy for OnLine {
        fn key(&self) -> StrategyKey {
            StrategyKey::new("line", 0)
        }

        fn distance(&self, a: &ClusterObject, b: &ClusterObject) -> Result<f64> {
            Ok((a.densities()[0] - b.densities()[0]).abs())
        }
    }

    fn at(xs: &[f64]) -> Vec<Arc<ClusterObject>> {
        xs.iter()
            .enumerate()
            .map(|(i, &x)| Arc::new(ClusterObject::from_densities(ObjectId(i as u64), vec![x])))
            .collect()
    }

    fn ctx() -> AnalysisContext {
        AnalysisContext::new(Arc::new(OnLine)).with_runner(Arc::new(TaskRunner::with_threads(4)))
    }

    #[test]
    fn test_two_groups_single_linkage() {
        let objs = at(&[0.0, 0.1, 0.2, 5.0, 5.1, 5.2]);
        let h = HierarchicalAnalysis::new(ctx(), Linkage::Single, Termination::cluster_count(2));
        let r = h.analyze(&objs).unwrap();
        assert_eq!(r.cluster_count(), 2);
        assert_eq!(r.cluster_indices(0), &[0, 1, 2]);
        assert_eq!(r.cluster_indices(1), &[3, 4, 5]);
        assert_eq!(r.dendrogram().map(|d| d.n_merges()), Some(4));
        assert_eq!(r.iterations(), 4);
    }

    #[test]
    fn test_target_bounds() {
        let objs = at(&[0.0, 1.0, 3.0, 7.0]);
        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average] {
            let none = HierarchicalAnalysis::new(ctx(), linkage, Termination::cluster_count(4))
                .analyze(&objs)
                .unwrap();
            assert_eq!(none.cluster_count(), 4);
            assert_eq!(none.dendrogram().map(|d| d.n_merges()), Some(0));

            let all = HierarchicalAnalysis::new(ctx(), linkage, Termination::cluster_count(1))
                .analyze(&objs)
                .unwrap();
            assert_eq!(all.cluster_count(), 1);
            assert_eq!(all.cluster(0).len(), 4);
        }
    }

    #[test]
    fn test_ties_go_to_lowest_pair() {
        // (0, 1) and (1, 2) tie at 1.0; the lower pair merges.
        let objs = at(&[0.0, 1.0, 2.0]);
        let r = HierarchicalAnalysis::new(ctx(), Linkage::Single, Termination::cluster_count(2))
            .analyze(&objs)
            .unwrap();
        assert_eq!(r.cluster_indices(0), &[0, 1]);
        assert_eq!(r.cluster_indices(1), &[2]);
    }

    #[test]
    fn test_distance_jump_finds_knee() {
        let objs = at(&[0.0, 0.1, 0.2, 0.3, 10.0, 10.1, 10.2]);
        let r = HierarchicalAnalysis::new(ctx(), Linkage::Single, Termination::distance_jump(5.0))
            .analyze(&objs)
            .unwrap();
        assert_eq!(r.cluster_count(), 2);
    }

    #[test]
    fn test_rejects_bad_configuration_before_work() {
        let overlap = AnalysisContext::new(Arc::new(OverlapDistance::new()));
        let objs: Vec<_> = (0..3u64)
            .map(|i| Arc::new(ClusterObject::from_densities(ObjectId(i), vec![1.0, 2.0])))
            .collect();
        for linkage in [Linkage::Centroid, Linkage::Ward] {
            let two = Termination::cluster_count(2);
            let err = HierarchicalAnalysis::new(overlap.clone(), linkage, two)
                .analyze(&objs)
                .unwrap_err();
            assert!(matches!(err, Error::IncompatibleLinkage { .. }));
        }
        let nine = Termination::cluster_count(9);
        let err = HierarchicalAnalysis::new(overlap.clone(), Linkage::Single, nine)
            .analyze(&objs)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidClusterCount { requested: 9, n_items: 3 }));
        assert_eq!(overlap.cache().computed(), 0);
    }

    #[test]
    fn test_cancelled_analysis() {
        let flag = Arc::new(CancelFlag::new());
        flag.cancel();
        let ctx = ctx().with_progress(flag);
        let err = HierarchicalAnalysis::new(ctx, Linkage::Average, Termination::cluster_count(1))
            .analyze(&at(&[0.0, 1.0, 2.0]))
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_progress_reaches_total() {
        let flag = Arc::new(CancelFlag::new());
        let ctx = ctx().with_progress(flag.clone());
        HierarchicalAnalysis::new(ctx, Linkage::Complete, Termination::cluster_count(1))
            .analyze(&at(&[0.0, 1.0, 2.0, 4.0]))
            .unwrap();
        assert_eq!(flag.total(), 6 + 3);
        assert_eq!(flag.current(), 9);
    }
}
