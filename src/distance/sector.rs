use super::overlap::check_lengths;
use super::{MapDistanceStrategy, StrategyKey};
use crate::error::{Error, Result};
use crate::geo::{GeoPoint, Location, Projection};
use crate::object::ClusterObject;
use std::collections::hash_map::DefaultHasher;
use std::f64::consts::PI;
use std::hash::{Hash, Hasher};

/// Sector-method distance.
///
/// The survey area is divided into `sectors` equal angular sectors around
/// the centroid of all locations. Each map is reduced to the share of its
/// total density that falls into every sector, and two maps are compared by
/// the total variation distance of those shares:
///
/// ```text
/// d(a, b) = ½ Σₛ |pₐ(s) - p_b(s)|
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SectorDistance {
    sectors: usize,
    assignment: Vec<usize>,
    fingerprint: u64,
}

impl SectorDistance {
    /// Assign every location to one of `sectors` sectors.
    pub fn new(locations: &[Location], sectors: usize) -> Result<Self> {
        if sectors < 2 {
            return Err(Error::invalid("sectors", "must be >= 2"));
        }
        let geo: Vec<GeoPoint> = locations.iter().map(|l| l.point).collect();
        let projection = Projection::centred_on(&geo).ok_or(Error::EmptyInput)?;
        let planar: Vec<_> = geo.iter().map(|p| projection.project(p)).collect();
        let n = planar.len() as f64;
        let cx = planar.iter().map(|p| p.x).sum::<f64>() / n;
        let cy = planar.iter().map(|p| p.y).sum::<f64>() / n;

        let assignment: Vec<usize> = planar
            .iter()
            .map(|p| {
                let angle = (p.y - cy).atan2(p.x - cx);
                let s = ((angle + PI) / (2.0 * PI) * sectors as f64).floor() as usize;
                s.min(sectors - 1)
            })
            .collect();

        let mut hasher = DefaultHasher::new();
        sectors.hash(&mut hasher);
        assignment.hash(&mut hasher);
        Ok(Self {
            sectors,
            assignment,
            fingerprint: hasher.finish(),
        })
    }

    /// Number of sectors.
    pub fn sectors(&self) -> usize {
        self.sectors
    }

    /// Sector index of every location.
    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    fn shares(&self, object: &ClusterObject) -> Result<Vec<f64>> {
        let densities = object.densities();
        if densities.len() != self.assignment.len() {
            return Err(Error::DimensionMismatch {
                expected: self.assignment.len(),
                found: densities.len(),
            });
        }
        let mut mass = vec![0.0; self.sectors];
        for (&s, &v) in self.assignment.iter().zip(densities) {
            if v < 0.0 || !v.is_finite() {
                return Err(Error::DegenerateDensity {
                    object: object.id(),
                    reason: "negative or non-finite density",
                });
            }
            mass[s] += v;
        }
        let total: f64 = mass.iter().sum();
        if total <= 0.0 {
            return Err(Error::DegenerateDensity {
                object: object.id(),
                reason: "density is zero at every location",
            });
        }
        mass.iter_mut().for_each(|m| *m /= total);
        Ok(mass)
    }
}

impl MapDistanceStrategy for SectorDistance {
    fn key(&self) -> StrategyKey {
        StrategyKey::new("sector", self.fingerprint)
    }

    fn distance(&self, a: &ClusterObject, b: &ClusterObject) -> Result<f64> {
        check_lengths(a, b)?;
        let (pa, pb) = (self.shares(a)?, self.shares(b)?);
        Ok(0.5 * pa.iter().zip(&pb).map(|(x, y)| (x - y).abs()).sum::<f64>())
    }
}
