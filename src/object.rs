//! The objects being clustered: one density surface per survey map.

use crate::error::{Error, Result};
use crate::geo::{CovarianceGrid, GeoPoint, Location};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Opaque handle back to the map entity owned by the persistence layer.
///
/// Identity is what the distance cache keys on: two objects with the same id
/// are assumed to be the same map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A density (or weight) field over geographic space.
///
/// Usually backed by a kernel density estimate computed elsewhere.
pub trait DensitySurface: Send + Sync {
    /// Density at `point`.
    fn density_at(&self, point: &GeoPoint) -> Result<f64>;
}

impl<F> DensitySurface for F
where
    F: Fn(&GeoPoint) -> Result<f64> + Send + Sync,
{
    fn density_at(&self, point: &GeoPoint) -> Result<f64> {
        self(point)
    }
}

/// One map's density surface, sampled at the survey locations.
///
/// The location samples are fixed at construction. The covariance sample is
/// computed on first request against a [`CovarianceGrid`] and is immutable
/// afterwards; concurrent first requests compute it once.
pub struct ClusterObject {
    id: ObjectId,
    label: Option<String>,
    densities: Arc<[f64]>,
    surface: Option<Arc<dyn DensitySurface>>,
    covariance: OnceCell<(u64, Arc<[f64]>)>,
}

impl fmt::Debug for ClusterObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterObject")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("locations", &self.densities.len())
            .field("has_surface", &self.surface.is_some())
            .field("has_covariance", &self.covariance.get().is_some())
            .finish()
    }
}

impl ClusterObject {
    /// Sample `surface` at every location.
    pub fn new(
        id: ObjectId,
        surface: Arc<dyn DensitySurface>,
        locations: &[Location],
    ) -> Result<Self> {
        let densities = locations
            .iter()
            .map(|loc| {
                let value = surface.density_at(&loc.point)?;
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(Error::DegenerateDensity {
                        object: id,
                        reason: "non-finite density at a survey location",
                    })
                }
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self {
            id,
            label: None,
            densities: densities.into(),
            surface: Some(surface),
            covariance: OnceCell::new(),
        })
    }

    /// Object from precomputed location densities, without a surface.
    ///
    /// Such objects support the location-based distances only.
    pub fn from_densities(id: ObjectId, densities: Vec<f64>) -> Self {
        Self {
            id,
            label: None,
            densities: densities.into(),
            surface: None,
            covariance: OnceCell::new(),
        }
    }

    /// Attach a display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach the surface used for grid sampling.
    pub fn with_surface(mut self, surface: Arc<dyn DensitySurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Identity.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Display label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Densities at the survey locations, in location order.
    pub fn densities(&self) -> &[f64] {
        &self.densities
    }

    /// The covariance sample, if it has been computed.
    pub fn cached_covariance(&self) -> Option<&[f64]> {
        self.covariance.get().map(|(_, s)| &s[..])
    }

    /// Covariance function sampled at every point of `grid`.
    ///
    /// Computed at most once; later calls with the same grid return the
    /// stored sample, calls with another grid fail with
    /// [`Error::GridMismatch`].
    pub fn covariance_sample(&self, grid: &CovarianceGrid) -> Result<Arc<[f64]>> {
        let (grid_id, sample) = self.covariance.get_or_try_init(|| {
            let surface = self.surface.as_ref().ok_or_else(|| {
                let reason = format!("map {} has no density surface to sample", self.id);
                Error::invalid("surface", reason)
            })?;
            let field = grid
                .points()
                .iter()
                .map(|p| surface.density_at(&p.geo))
                .collect::<Result<Vec<f64>>>()?;
            if field.iter().any(|v| !v.is_finite()) {
                return Err(Error::DegenerateDensity {
                    object: self.id,
                    reason: "non-finite density at a grid point",
                });
            }
            let sample: Arc<[f64]> = grid.covariance_of(&field)?.into();
            Ok::<_, Error>((grid.id(), sample))
        })?;
        if *grid_id != grid.id() {
            return Err(Error::GridMismatch);
        }
        Ok(sample.clone())
    }
}
