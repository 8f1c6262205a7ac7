//! Output of a cluster analysis.

use super::dendrogram::Dendrogram;
use crate::error::{Error, Result};
use crate::object::{ClusterObject, ObjectId};
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::Arc;

/// Partition (hard) or membership matrix (fuzzy) over the analysed objects.
///
/// Cluster indices carry no order of their own. In a hard result every
/// object sits in exactly one cluster. In a fuzzy result an object is listed
/// in every cluster where its membership is positive, and its memberships sum
/// to 1.
#[derive(Debug, Clone)]
pub struct ClusteringResult {
    objects: Vec<Arc<ClusterObject>>,
    index: HashMap<ObjectId, usize>,
    clusters: Vec<Vec<usize>>,
    /// `n × c`, fuzzy results only.
    memberships: Option<Array2<f64>>,
    converged: bool,
    iterations: usize,
    objective: Option<f64>,
    dendrogram: Option<Dendrogram>,
}

fn index_of(objects: &[Arc<ClusterObject>]) -> HashMap<ObjectId, usize> {
    objects.iter().enumerate().map(|(i, o)| (o.id(), i)).collect()
}

impl ClusteringResult {
    /// Hard result from explicit clusters of object indices.
    ///
    /// Empty clusters are dropped; every object must appear exactly once.
    pub(crate) fn hard(
        objects: Vec<Arc<ClusterObject>>,
        mut clusters: Vec<Vec<usize>>,
    ) -> Result<Self> {
        let mut seen = vec![0usize; objects.len()];
        for &i in clusters.iter().flatten() {
            let slot = seen.get_mut(i).ok_or_else(|| Error::DimensionMismatch {
                expected: objects.len(),
                found: i + 1,
            })?;
            *slot += 1;
        }
        if seen.iter().any(|&c| c != 1) {
            return Err(Error::Other(
                "hard partition must contain every object exactly once".into(),
            ));
        }
        clusters.iter_mut().for_each(|c| c.sort_unstable());
        Ok(Self {
            index: index_of(&objects),
            objects,
            clusters: clusters.into_iter().filter(|c| !c.is_empty()).collect(),
            memberships: None,
            converged: true,
            iterations: 0,
            objective: None,
            dendrogram: None,
        })
    }

    /// Hard result from one label per object.
    pub(crate) fn from_labels(objects: Vec<Arc<ClusterObject>>, labels: &[usize]) -> Result<Self> {
        if labels.len() != objects.len() {
            return Err(Error::DimensionMismatch {
                expected: objects.len(),
                found: labels.len(),
            });
        }
        let k = labels.iter().copied().max().map_or(0, |m| m + 1);
        let mut clusters = vec![Vec::new(); k];
        for (i, &l) in labels.iter().enumerate() {
            clusters[l].push(i);
        }
        Self::hard(objects, clusters)
    }

    /// Fuzzy result from an `n × c` membership matrix with unit row sums.
    pub(crate) fn fuzzy(
        objects: Vec<Arc<ClusterObject>>,
        memberships: Array2<f64>,
    ) -> Result<Self> {
        if memberships.nrows() != objects.len() {
            return Err(Error::DimensionMismatch {
                expected: objects.len(),
                found: memberships.nrows(),
            });
        }
        let clusters = (0..memberships.ncols())
            .map(|k| (0..objects.len()).filter(|&i| memberships[[i, k]] > 0.0).collect())
            .collect();
        Ok(Self {
            index: index_of(&objects),
            objects,
            clusters,
            memberships: Some(memberships),
            converged: true,
            iterations: 0,
            objective: None,
            dendrogram: None,
        })
    }

    pub(crate) fn with_report(
        mut self,
        converged: bool,
        iterations: usize,
        objective: Option<f64>,
    ) -> Self {
        self.converged = converged;
        self.iterations = iterations;
        self.objective = objective;
        self
    }

    pub(crate) fn with_dendrogram(mut self, dendrogram: Dendrogram) -> Self {
        self.dendrogram = Some(dendrogram);
        self
    }

    /// Number of clusters.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Members of cluster `i`.
    ///
    /// # Panics
    ///
    /// If `i >= cluster_count()`.
    pub fn cluster(&self, i: usize) -> Vec<&Arc<ClusterObject>> {
        self.clusters[i].iter().map(|&o| &self.objects[o]).collect()
    }

    /// Ids of the members of cluster `i`, in input order.
    pub fn cluster_ids(&self, i: usize) -> Vec<ObjectId> {
        self.clusters[i].iter().map(|&o| self.objects[o].id()).collect()
    }

    /// Input indices of the members of cluster `i`.
    pub fn cluster_indices(&self, i: usize) -> &[usize] {
        &self.clusters[i]
    }

    /// Membership of `object` in cluster `i`.
    ///
    /// Hard results answer 1 or 0. Objects that were not analysed, and
    /// cluster indices out of range, answer 0.
    pub fn membership(&self, i: usize, object: &ClusterObject) -> f64 {
        self.index
            .get(&object.id())
            .map_or(0.0, |&o| self.membership_at(i, o))
    }

    /// Membership of the object at input index `o` in cluster `i`.
    pub fn membership_at(&self, i: usize, o: usize) -> f64 {
        if i >= self.clusters.len() || o >= self.objects.len() {
            return 0.0;
        }
        match &self.memberships {
            Some(u) => u[[o, i]],
            None if self.clusters[i].binary_search(&o).is_ok() => 1.0,
            None => 0.0,
        }
    }

    /// Whether memberships are fuzzy.
    pub fn is_fuzzy(&self) -> bool {
        self.memberships.is_some()
    }

    /// The `n × c` membership matrix of a fuzzy result.
    pub fn memberships(&self) -> Option<&Array2<f64>> {
        self.memberships.as_ref()
    }

    /// Cluster index of every object; the arg-max membership for fuzzy
    /// results, ties going to the lower index.
    pub fn labels(&self) -> Vec<usize> {
        match &self.memberships {
            Some(u) => u
                .rows()
                .into_iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .fold((0, f64::NEG_INFINITY), |best, (k, &v)| {
                            if v > best.1 {
                                (k, v)
                            } else {
                                best
                            }
                        })
                        .0
                })
                .collect(),
            None => {
                let mut labels = vec![0; self.objects.len()];
                for (k, members) in self.clusters.iter().enumerate() {
                    for &o in members {
                        labels[o] = k;
                    }
                }
                labels
            }
        }
    }

    /// Hard result assigning each object to its arg-max cluster.
    ///
    /// Clusters that end up empty are dropped. A hard result hardens to a
    /// copy of itself.
    pub fn harden(&self) -> ClusteringResult {
        if !self.is_fuzzy() {
            return self.clone();
        }
        let labels = self.labels();
        let mut clusters = vec![Vec::new(); self.clusters.len()];
        for (o, &k) in labels.iter().enumerate() {
            clusters[k].push(o);
        }
        Self {
            index: self.index.clone(),
            objects: self.objects.clone(),
            clusters: clusters.into_iter().filter(|c| !c.is_empty()).collect(),
            memberships: None,
            converged: self.converged,
            iterations: self.iterations,
            objective: self.objective,
            dendrogram: None,
        }
    }

    /// The analysed objects, in input order.
    pub fn objects(&self) -> &[Arc<ClusterObject>] {
        &self.objects
    }

    /// Whether the iterative method met its tolerance (always `true` for
    /// agglomerative results).
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Iterations (or merges) performed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Final objective of iterative methods.
    pub fn objective(&self) -> Option<f64> {
        self.objective
    }

    /// Merge history of agglomerative results.
    pub fn dendrogram(&self) -> Option<&Dendrogram> {
        self.dendrogram.as_ref()
    }
}
