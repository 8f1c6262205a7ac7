//! Map distances and their memoization.
//!
//! A [`MapDistanceStrategy`] compares two [`ClusterObject`]s. Strategies are
//! pure: the result depends only on the two objects and on the strategy's
//! own immutable parameters. That is what lets [`DistanceCache`] compute each
//! unordered pair at most once and share it across threads.
//!
//! | Strategy | Compares | Parameters |
//! |----------|----------|------------|
//! | [`OverlapDistance`] | relative intensities at the survey locations | none |
//! | [`SectorDistance`] | density mass per angular sector | sector count |
//! | [`CovarianceDistance`] | covariance functions on a shared grid | the grid |
//!
//! Only [`CovarianceDistance`] embeds objects in a vector space, which is
//! what centroid and Ward linkage need.

mod cache;
mod covariance;
mod matrix;
mod overlap;
mod sector;

pub use cache::DistanceCache;
pub use covariance::CovarianceDistance;
pub(crate) use covariance::euclidean;
pub use matrix::DistanceMatrix;
pub use overlap::OverlapDistance;
pub use sector::SectorDistance;

use crate::error::Result;
use crate::object::ClusterObject;

/// Identifies a strategy and its parameters inside the cache.
///
/// Two strategies with equal keys must return equal distances for every pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrategyKey {
    name: &'static str,
    param: u64,
}

impl StrategyKey {
    /// Key from a strategy name and a parameter fingerprint.
    pub const fn new(name: &'static str, param: u64) -> Self {
        Self { name, param }
    }

    /// Strategy name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// A pure distance between two maps.
pub trait MapDistanceStrategy: Send + Sync {
    /// Cache identity of this strategy and its parameters.
    fn key(&self) -> StrategyKey;

    /// Distance between `a` and `b`; finite and non-negative.
    fn distance(&self, a: &ClusterObject, b: &ClusterObject) -> Result<f64>;

    /// The covariance representation, if this strategy has one.
    fn covariance(&self) -> Option<&CovarianceDistance> {
        None
    }
}

/// The built-in strategies.
#[derive(Debug, Clone)]
pub enum MapDistance {
    /// Relative-intensity overlap.
    Overlap(OverlapDistance),
    /// Sector method.
    Sector(SectorDistance),
    /// Euclidean distance between covariance functions.
    Covariance(CovarianceDistance),
}

impl MapDistanceStrategy for MapDistance {
    fn key(&self) -> StrategyKey {
        match self {
            MapDistance::Overlap(s) => s.key(),
            MapDistance::Sector(s) => s.key(),
            MapDistance::Covariance(s) => s.key(),
        }
    }

    fn distance(&self, a: &ClusterObject, b: &ClusterObject) -> Result<f64> {
        match self {
            MapDistance::Overlap(s) => s.distance(a, b),
            MapDistance::Sector(s) => s.distance(a, b),
            MapDistance::Covariance(s) => s.distance(a, b),
        }
    }

    fn covariance(&self) -> Option<&CovarianceDistance> {
        match self {
            MapDistance::Covariance(s) => Some(s),
            _ => None,
        }
    }
}

impl From<OverlapDistance> for MapDistance {
    fn from(s: OverlapDistance) -> Self {
        MapDistance::Overlap(s)
    }
}

impl From<SectorDistance> for MapDistance {
    fn from(s: SectorDistance) -> Self {
        MapDistance::Sector(s)
    }
}

impl From<CovarianceDistance> for MapDistance {
    fn from(s: CovarianceDistance) -> Self {
        MapDistance::Covariance(s)
    }
}
