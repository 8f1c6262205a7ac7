//! Merge history of an agglomerative analysis.
//!
//! Node ids follow the SciPy/MATLAB convention: leaves are `0..n`, merge `i`
//! creates node `n + i`.

use crate::error::{Error, Result};

/// A dendrogram representing hierarchical cluster merges.
///
/// Each merge combines two clusters into one, recording:
/// - Which clusters were merged
/// - The distance at which they merged
/// - The size of the resulting cluster
///
/// A dendrogram produced by a stopped analysis holds fewer than `n - 1`
/// merges.
#[derive(Debug, Clone, PartialEq)]
pub struct Dendrogram {
    merges: Vec<Merge>,
    n_items: usize,
}

/// A single merge operation in the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// First node being merged.
    pub cluster_a: usize,
    /// Second node being merged.
    pub cluster_b: usize,
    /// Linkage distance at which the merge occurred.
    pub distance: f64,
    /// Size of resulting cluster.
    pub size: usize,
}

impl Dendrogram {
    /// Create a new dendrogram for n items.
    pub fn new(n_items: usize) -> Self {
        Self {
            merges: Vec::with_capacity(n_items.saturating_sub(1)),
            n_items,
        }
    }

    /// Record a merge; returns the id of the new node.
    pub fn add_merge(
        &mut self,
        cluster_a: usize,
        cluster_b: usize,
        distance: f64,
        size: usize,
    ) -> usize {
        self.merges.push(Merge {
            cluster_a,
            cluster_b,
            distance,
            size,
        });
        self.n_items + self.merges.len() - 1
    }

    /// Flat labels after applying the first `merges` merges.
    ///
    /// Labels are numbered by first appearance in item order.
    fn labels_after(&self, merges: usize) -> Result<Vec<usize>> {
        let n = self.n_items;
        let mut parent: Vec<usize> = (0..n).collect();
        // node id -> one of its leaves
        let mut node_leaf: Vec<usize> = (0..n).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for merge in self.merges.iter().take(merges) {
            let leaves = (node_leaf.get(merge.cluster_a), node_leaf.get(merge.cluster_b));
            let (Some(&la), Some(&lb)) = leaves else {
                return Err(Error::invalid("dendrogram", "merge refers to an unknown node"));
            };
            let (ra, rb) = (find(&mut parent, la), find(&mut parent, lb));
            parent[rb] = ra;
            node_leaf.push(ra);
        }

        let mut renumber: Vec<Option<usize>> = vec![None; n];
        let mut next = 0;
        Ok((0..n)
            .map(|i| {
                let root = find(&mut parent, i);
                *renumber[root].get_or_insert_with(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect())
    }

    /// Cluster labels after every merge at or below `threshold`.
    ///
    /// Merges are applied in order up to the first one above the threshold.
    pub fn cut_at_distance(&self, threshold: f64) -> Result<Vec<usize>> {
        let applied = self.merges.iter().take_while(|m| m.distance <= threshold).count();
        self.labels_after(applied)
    }

    /// Cluster labels for exactly `k` clusters.
    pub fn cut_to_k(&self, k: usize) -> Result<Vec<usize>> {
        let available = self.n_items.saturating_sub(self.merges.len());
        if k == 0 || k > self.n_items || k < available {
            return Err(Error::InvalidClusterCount {
                requested: k,
                n_items: self.n_items,
            });
        }
        self.labels_after(self.n_items - k)
    }

    /// Number of original items.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of merges recorded.
    pub fn n_merges(&self) -> usize {
        self.merges.len()
    }

    /// Iterate over merges.
    pub fn merges(&self) -> impl Iterator<Item = &Merge> {
        self.merges.iter()
    }

    /// The merge distances in merge order.
    pub fn distances(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }
}
