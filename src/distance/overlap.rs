use super::{MapDistanceStrategy, StrategyKey};
use crate::error::{Error, Result};
use crate::object::ClusterObject;

/// Relative-intensity overlap distance.
///
/// Each map is scaled so that its densest location has intensity 1. The
/// distance is one minus the weighted Jaccard overlap of the two intensity
/// profiles:
///
/// ```text
/// d(a, b) = 1 - Σ min(aᵢ, bᵢ) / Σ max(aᵢ, bᵢ)
/// ```
///
/// It is 0 for maps with proportional densities and 1 for maps with disjoint
/// support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlapDistance;

impl OverlapDistance {
    /// New overlap distance.
    pub fn new() -> Self {
        Self
    }
}

fn peak(object: &ClusterObject) -> Result<f64> {
    let densities = object.densities();
    if densities.iter().any(|v| *v < 0.0 || !v.is_finite()) {
        return Err(Error::DegenerateDensity {
            object: object.id(),
            reason: "negative or non-finite density",
        });
    }
    let max = densities.iter().copied().fold(0.0, f64::max);
    if max <= 0.0 {
        return Err(Error::DegenerateDensity {
            object: object.id(),
            reason: "density is zero at every location",
        });
    }
    Ok(max)
}

pub(super) fn check_lengths(a: &ClusterObject, b: &ClusterObject) -> Result<()> {
    if a.densities().len() != b.densities().len() {
        return Err(Error::DimensionMismatch {
            expected: a.densities().len(),
            found: b.densities().len(),
        });
    }
    Ok(())
}

impl MapDistanceStrategy for OverlapDistance {
    fn key(&self) -> StrategyKey {
        StrategyKey::new("overlap", 0)
    }

    fn distance(&self, a: &ClusterObject, b: &ClusterObject) -> Result<f64> {
        check_lengths(a, b)?;
        let (peak_a, peak_b) = (peak(a)?, peak(b)?);
        let (mut shared, mut union) = (0.0, 0.0);
        for (x, y) in a.densities().iter().zip(b.densities()) {
            let (x, y) = (x / peak_a, y / peak_b);
            shared += x.min(y);
            union += x.max(y);
        }
        // union >= 1: both profiles reach 1 somewhere.
        Ok((1.0 - shared / union).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectId;

    fn obj(id: u64, d: &[f64]) -> ClusterObject {
        ClusterObject::from_densities(ObjectId(id), d.to_vec())
    }

    #[test]
    fn test_proportional_maps_are_identical() {
        let s = OverlapDistance::new();
        let d = s.distance(&obj(1, &[1.0, 2.0, 4.0]), &obj(2, &[0.5, 1.0, 2.0])).unwrap();
        assert!(d.abs() < 1e-12);
    }

    #[test]
    fn test_disjoint_maps_are_maximally_distant() {
        let s = OverlapDistance::new();
        let d = s.distance(&obj(1, &[1.0, 0.0]), &obj(2, &[0.0, 3.0])).unwrap();
        assert!((d - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_overlap() {
        let s = OverlapDistance::new();
        // intensities [1, 0.5] vs [0.5, 1]: shared 1.0, union 2.0
        let d = s.distance(&obj(1, &[2.0, 1.0]), &obj(2, &[1.0, 2.0])).unwrap();
        assert!((d - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_map_rejected() {
        let s = OverlapDistance::new();
        let err = s.distance(&obj(1, &[0.0, 0.0]), &obj(2, &[1.0, 1.0])).unwrap_err();
        assert!(matches!(err, Error::DegenerateDensity { object: ObjectId(1), .. }));
        let err = s.distance(&obj(1, &[1.0]), &obj(2, &[1.0, 1.0])).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }
}
