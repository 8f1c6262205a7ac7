//! Inter-cluster distances for agglomerative analysis.
//!
//! | Linkage | Distance between A and B | Needs vectors |
//! |---------|--------------------------|---------------|
//! | Single | min d(a, b) | no |
//! | Complete | max d(a, b) | no |
//! | Average | mean d(a, b) | no |
//! | Centroid | ‖μₐ − μᵦ‖ | yes |
//! | Ward | √(2 nₐ nᵦ / (nₐ + nᵦ)) ‖μₐ − μᵦ‖ | yes |
//!
//! Ward uses the SciPy scaling, so two singletons merge at their plain
//! Euclidean distance.

use crate::distance::{euclidean, DistanceMatrix};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Linkage method for agglomerative analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Linkage {
    /// Minimum pairwise distance.
    Single,
    /// Maximum pairwise distance.
    Complete,
    /// Mean pairwise distance.
    Average,
    /// Distance between member means in covariance space.
    Centroid,
    /// Ward's variance-increase criterion in covariance space.
    Ward,
}

impl Linkage {
    /// Whether the method needs objects embedded in a vector space.
    pub fn requires_vector_space(self) -> bool {
        matches!(self, Linkage::Centroid | Linkage::Ward)
    }
}

/// What a linkage method may look at.
#[derive(Debug, Clone, Copy)]
pub struct LinkageSpace<'a> {
    /// Pairwise object distances.
    pub distances: &'a DistanceMatrix,
    /// Object positions in covariance space, indexed like `distances`.
    pub vectors: Option<&'a [Arc<[f64]>]>,
}

/// Distance between two clusters, given as sets of object indices.
pub trait LinkageMethod {
    /// Linkage distance between non-empty clusters `a` and `b`.
    fn cluster_distance(&self, space: &LinkageSpace<'_>, a: &[usize], b: &[usize]) -> Result<f64>;
}

impl LinkageMethod for Linkage {
    fn cluster_distance(&self, space: &LinkageSpace<'_>, a: &[usize], b: &[usize]) -> Result<f64> {
        if a.is_empty() || b.is_empty() {
            return Err(Error::EmptyInput);
        }
        let d = space.distances;
        let pairs = || a.iter().flat_map(move |&i| b.iter().map(move |&j| d.get(i, j)));
        match self {
            Linkage::Single => Ok(pairs().fold(f64::INFINITY, f64::min)),
            Linkage::Complete => Ok(pairs().fold(0.0, f64::max)),
            Linkage::Average => Ok(pairs().sum::<f64>() / (a.len() * b.len()) as f64),
            Linkage::Centroid | Linkage::Ward => {
                let vectors = space
                    .vectors
                    .ok_or(Error::IncompatibleLinkage { linkage: *self })?;
                let between = euclidean(&centroid(vectors, a)?, &centroid(vectors, b)?)?;
                if *self == Linkage::Centroid {
                    return Ok(between);
                }
                let (na, nb) = (a.len() as f64, b.len() as f64);
                Ok((2.0 * na * nb / (na + nb)).sqrt() * between)
            }
        }
    }
}

fn centroid(vectors: &[Arc<[f64]>], members: &[usize]) -> Result<Vec<f64>> {
    let dim = vectors.get(members[0]).map_or(0, |v| v.len());
    let mut mean = vec![0.0; dim];
    for &i in members {
        let v = vectors.get(i).ok_or(Error::DimensionMismatch {
            expected: vectors.len(),
            found: i + 1,
        })?;
        if v.len() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: v.len(),
            });
        }
        mean.iter_mut().zip(v.iter()).for_each(|(m, x)| *m += x);
    }
    let n = members.len() as f64;
    mean.iter_mut().for_each(|m| *m /= n);
    Ok(mean)
}
