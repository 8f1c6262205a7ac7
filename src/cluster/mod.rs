//! Cluster analyses over map objects.
//!
//! Every analysis implements [`ClusterAnalysis`]: it takes a slice of
//! [`ClusterObject`](crate::object::ClusterObject)s and returns a
//! [`ClusteringResult`]. Distances come from the [`AnalysisContext`]'s
//! strategy through its shared [`DistanceCache`](crate::distance::DistanceCache),
//! and the O(N²) warm-up runs on its [`TaskRunner`](crate::runner::TaskRunner).
//!
//! ## Hard vs Fuzzy
//!
//! **Hard** results put each map in exactly one cluster. **Fuzzy** results
//! give each map a membership in every cluster, summing to 1; a map shared
//! between two dialect areas shows up in both. [`ClusteringResult::harden`]
//! turns a fuzzy result into the arg-max partition.
//!
//! ## Algorithms
//!
//! | Analysis | Output | Cluster count |
//! |----------|--------|---------------|
//! | [`HierarchicalAnalysis`] | hard + [`Dendrogram`] | [`Termination`] rule |
//! | [`KMeans`] | hard | [`ClusterCount`] (fixed or searched) |
//! | [`FuzzyCMeans`] | fuzzy | [`ClusterCount`] (fixed or searched) |
//!
//! ### Hierarchical (Agglomerative)
//!
//! Bottom-up: start with each map as its own cluster and repeatedly merge
//! the two closest clusters. **Linkage methods** define the distance between
//! clusters:
//!
//! | Linkage | Distance | Effect |
//! |---------|----------|--------|
//! | Single | min(pairwise) | Chaining; elongated clusters |
//! | Complete | max(pairwise) | Compact clusters |
//! | Average | mean(pairwise) | Balanced compromise |
//! | Centroid | distance of means | Needs covariance distances |
//! | Ward | variance increase | Needs covariance distances |
//!
//! Merging stops at a target count or at a jump in merge distance.
//!
//! ### K-means and fuzzy c-means
//!
//! Both run relationally on the squared cached distances, so they work with
//! every distance strategy. With [`ClusterCount::Auto`] each candidate count
//! is fitted with several seeded restarts and the partition with the best
//! mean silhouette wins.
//!
//! ## Usage
//!
//! ```rust
//! use isogloss::cluster::{
//!     AnalysisContext, ClusterAnalysis, HierarchicalAnalysis, Linkage, Termination,
//! };
//! use isogloss::distance::OverlapDistance;
//! use isogloss::object::{ClusterObject, ObjectId};
//! use std::sync::Arc;
//!
//! let maps: Vec<Arc<ClusterObject>> = [
//!     [9.0, 8.0, 1.0, 1.0],
//!     [8.0, 9.0, 1.0, 2.0],
//!     [1.0, 1.0, 9.0, 8.0],
//!     [1.0, 2.0, 8.0, 9.0],
//! ]
//! .iter()
//! .enumerate()
//! .map(|(i, d)| Arc::new(ClusterObject::from_densities(ObjectId(i as u64), d.to_vec())))
//! .collect();
//!
//! let ctx = AnalysisContext::new(Arc::new(OverlapDistance::new()));
//! let result = HierarchicalAnalysis::new(ctx, Linkage::Average, Termination::cluster_count(2))
//!     .analyze(&maps)
//!     .unwrap();
//!
//! assert_eq!(result.cluster_count(), 2);
//! assert_eq!(result.labels(), vec![0, 0, 1, 1]);
//! ```

mod dendrogram;
mod fuzzy;
mod hierarchical;
mod kmeans;
mod linkage;
mod result;
mod search;
mod termination;
mod traits;

pub use dendrogram::{Dendrogram, Merge};
pub use fuzzy::FuzzyCMeans;
pub use hierarchical::HierarchicalAnalysis;
pub use kmeans::KMeans;
pub use linkage::{Linkage, LinkageMethod, LinkageSpace};
pub use result::ClusteringResult;
pub use search::ClusterCount;
pub use termination::{
    DistanceJump, TargetCount, Termination, TerminationCriterion, DEFAULT_JUMP_WINDOW,
};
pub use traits::{AnalysisContext, ClusterAnalysis};
