use super::{DistanceCache, MapDistanceStrategy};
use crate::error::Result;
use crate::object::ClusterObject;
use crate::progress::ProgressSink;
use crate::runner::TaskRunner;
use ndarray::Array2;
use std::sync::Arc;
use tracing::debug;

/// Dense symmetric view of the cached distances between a set of objects.
///
/// Row and column `i` correspond to `objects[i]` as passed to
/// [`DistanceMatrix::warm_up`].
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    values: Array2<f64>,
}

impl DistanceMatrix {
    /// Compute every unordered pair through `cache`, in parallel.
    ///
    /// Progress runs over the `n (n - 1) / 2` pairs.
    pub fn warm_up(
        cache: &DistanceCache,
        strategy: &dyn MapDistanceStrategy,
        objects: &[Arc<ClusterObject>],
        runner: &TaskRunner,
        progress: &dyn ProgressSink,
    ) -> Result<Self> {
        let n = objects.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();
        progress.set_note("pairwise distances");
        debug!(
            objects = n,
            pairs = pairs.len(),
            strategy = strategy.key().name(),
            "distance warm-up"
        );

        let values = runner.map_range(pairs.len(), progress, |p| {
            let (i, j) = pairs[p];
            cache.distance(strategy, &objects[i], &objects[j])
        })?;

        let mut matrix = Array2::zeros((n, n));
        for (&(i, j), d) in pairs.iter().zip(values) {
            matrix[[i, j]] = d;
            matrix[[j, i]] = d;
        }
        Ok(Self { values: matrix })
    }

    /// Wrap an explicit symmetric matrix.
    pub fn from_array(values: Array2<f64>) -> Self {
        Self { values }
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    /// Whether the matrix covers no objects.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Distance between objects `i` and `j`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[[i, j]]
    }

    /// The underlying array.
    pub fn as_array(&self) -> &Array2<f64> {
        &self.values
    }

    /// Element-wise squares, the input of the relational algorithms.
    pub fn squared(&self) -> Array2<f64> {
        self.values.mapv(|d| d * d)
    }
}
