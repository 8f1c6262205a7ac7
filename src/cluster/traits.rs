//! The analysis interface and the collaborators every analysis shares.

use super::result::ClusteringResult;
use crate::distance::{DistanceCache, DistanceMatrix, MapDistanceStrategy};
use crate::error::{Error, Result};
use crate::object::ClusterObject;
use crate::progress::{NoProgress, ProgressSink};
use crate::runner::TaskRunner;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A cluster analysis over map objects.
pub trait ClusterAnalysis {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Group `objects` into clusters.
    ///
    /// Configuration is validated before any distance is computed. The
    /// result lists objects in the order given here.
    fn analyze(&self, objects: &[Arc<ClusterObject>]) -> Result<ClusteringResult>;
}

/// Distance strategy, cache, runner and progress sink used by an analysis.
///
/// Cloning is cheap; clones share the cache, so several analyses over the
/// same objects compute each distance once.
#[derive(Clone)]
pub struct AnalysisContext {
    strategy: Arc<dyn MapDistanceStrategy>,
    cache: Arc<DistanceCache>,
    runner: Arc<TaskRunner>,
    progress: Arc<dyn ProgressSink>,
}

impl fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("strategy", &self.strategy.key())
            .field("cached", &self.cache.len())
            .field("threads", &self.runner.threads())
            .finish()
    }
}

impl AnalysisContext {
    /// Context with a fresh cache, the shared runner and no progress sink.
    pub fn new(strategy: Arc<dyn MapDistanceStrategy>) -> Self {
        Self {
            strategy,
            cache: Arc::new(DistanceCache::new()),
            runner: TaskRunner::shared(),
            progress: Arc::new(NoProgress),
        }
    }

    /// Use an existing cache.
    pub fn with_cache(mut self, cache: Arc<DistanceCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Use a specific runner.
    pub fn with_runner(mut self, runner: Arc<TaskRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Report progress and observe cancellation through `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// The distance strategy.
    pub fn strategy(&self) -> &dyn MapDistanceStrategy {
        self.strategy.as_ref()
    }

    /// The distance cache.
    pub fn cache(&self) -> &Arc<DistanceCache> {
        &self.cache
    }

    /// The runner.
    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// The progress sink.
    pub fn progress(&self) -> &dyn ProgressSink {
        self.progress.as_ref()
    }

    /// Fail with [`Error::Cancelled`] once the sink reports cancellation.
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.progress.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// All pairwise distances between `objects`, through the cache.
    pub(crate) fn distance_matrix(
        &self,
        objects: &[Arc<ClusterObject>],
        progress: &dyn ProgressSink,
    ) -> Result<DistanceMatrix> {
        DistanceMatrix::warm_up(&self.cache, self.strategy(), objects, &self.runner, progress)
    }
}

/// Non-empty, with unique ids.
pub(crate) fn validate_objects(objects: &[Arc<ClusterObject>]) -> Result<()> {
    if objects.is_empty() {
        return Err(Error::EmptyInput);
    }
    let mut seen = HashSet::with_capacity(objects.len());
    if let Some(dup) = objects.iter().find(|o| !seen.insert(o.id())) {
        return Err(Error::invalid("objects", format!("duplicate object id {}", dup.id())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::OverlapDistance;
    use crate::object::ObjectId;

    #[test]
    fn test_validate_objects() {
        assert!(matches!(validate_objects(&[]), Err(Error::EmptyInput)));
        let a = Arc::new(ClusterObject::from_densities(ObjectId(1), vec![1.0]));
        let b = Arc::new(ClusterObject::from_densities(ObjectId(1), vec![2.0]));
        let err = validate_objects(&[a.clone(), b]).unwrap_err();
        assert!(err.is_config());
        assert!(validate_objects(&[a]).is_ok());
    }

    #[test]
    fn test_clones_share_cache() {
        let ctx = AnalysisContext::new(Arc::new(OverlapDistance::new()))
            .with_runner(Arc::new(TaskRunner::with_threads(2)));
        let other = ctx.clone();
        let objs: Vec<_> = (0..4u64)
            .map(|i| {
                let densities = vec![1.0 + i as f64, 2.0];
                Arc::new(ClusterObject::from_densities(ObjectId(i), densities))
            })
            .collect();
        ctx.distance_matrix(&objs, &NoProgress).unwrap();
        other.distance_matrix(&objs, &NoProgress).unwrap();
        assert_eq!(other.cache().computed(), 6);
        assert!(format!("{ctx:?}").contains("overlap"));
    }
}
