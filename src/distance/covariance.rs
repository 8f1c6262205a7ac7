use super::{MapDistanceStrategy, StrategyKey};
use crate::error::{Error, Result};
use crate::geo::CovarianceGrid;
use crate::object::ClusterObject;
use std::sync::Arc;

/// Euclidean distance between covariance functions sampled on a shared grid.
///
/// Samples are computed lazily on first use; call
/// [`CovarianceGrid::precompute_samples`] (or
/// [`prepare_covariance`](crate::geo::prepare_covariance)) beforehand to do
/// that work in parallel.
#[derive(Debug, Clone)]
pub struct CovarianceDistance {
    grid: Arc<CovarianceGrid>,
}

impl CovarianceDistance {
    /// Distance over `grid`.
    pub fn new(grid: Arc<CovarianceGrid>) -> Self {
        Self { grid }
    }

    /// The shared grid.
    pub fn grid(&self) -> &Arc<CovarianceGrid> {
        &self.grid
    }

    /// The object's position in covariance space.
    pub fn vector(&self, object: &ClusterObject) -> Result<Arc<[f64]>> {
        object.covariance_sample(&self.grid)
    }
}

/// Euclidean distance between equal-length vectors.
pub(crate) fn euclidean(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            found: b.len(),
        });
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt())
}

impl MapDistanceStrategy for CovarianceDistance {
    fn key(&self) -> StrategyKey {
        StrategyKey::new("covariance", self.grid.id())
    }

    fn distance(&self, a: &ClusterObject, b: &ClusterObject) -> Result<f64> {
        euclidean(&self.vector(a)?, &self.vector(b)?)
    }

    fn covariance(&self) -> Option<&CovarianceDistance> {
        Some(self)
    }
}
