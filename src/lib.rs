//! # isogloss
//!
//! Clustering engine for dialectometric maps: groups density surfaces over
//! survey locations into dialect areas.
//!
//! The pieces, leaves first:
//!
//! - [`runner`]: a parallel to-do executor with nesting-safe degradation to
//!   sequential execution, progress reporting and cooperative cancellation.
//! - [`distance`]: pluggable map distances behind an at-most-once,
//!   thread-safe [`DistanceCache`].
//! - [`geo`]: locations, projection and the covariance grid that backs the
//!   covariance-based distance.
//! - [`cluster`]: agglomerative, k-means and fuzzy c-means analyses sharing
//!   the [`ClusterAnalysis`] interface, producing a [`ClusteringResult`].
//! - [`metrics`]: silhouette, partition coefficient and ARI.
//!
//! ```rust
//! use isogloss::{AnalysisContext, ClusterAnalysis, ClusterCount, FuzzyCMeans};
//! use isogloss::distance::OverlapDistance;
//! use isogloss::object::{ClusterObject, ObjectId};
//! use std::sync::Arc;
//!
//! let maps: Vec<_> = [[9.0, 1.0], [8.0, 1.5], [1.0, 9.0], [1.2, 8.0]]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, d)| Arc::new(ClusterObject::from_densities(ObjectId(i as u64), d.to_vec())))
//!     .collect();
//!
//! let ctx = AnalysisContext::new(Arc::new(OverlapDistance::new()));
//! let fuzzy = FuzzyCMeans::new(ctx, ClusterCount::fixed(2)).with_seed(1).analyze(&maps).unwrap();
//! let hard = fuzzy.harden();
//! assert_eq!(hard.cluster_count(), 2);
//! ```

pub mod cluster;
pub mod distance;
/// Error types used across `isogloss`.
pub mod error;
pub mod geo;
pub mod metrics;
pub mod object;
pub mod progress;
pub mod runner;

pub use error::{Error, Result};

pub use cluster::{
    AnalysisContext, ClusterAnalysis, ClusterCount, ClusteringResult, Dendrogram, FuzzyCMeans,
    HierarchicalAnalysis, KMeans, Linkage, Termination,
};
pub use distance::{DistanceCache, MapDistance, MapDistanceStrategy};
pub use object::{ClusterObject, ObjectId};
pub use progress::{CancelFlag, NoProgress, ProgressSink};
pub use runner::{RunnerConfig, TaskRunner};
