//! Shared sampling grid for covariance-based map distances.
//!
//! The grid covers the convex hull of all survey locations in a planar
//! kilometre system. Spacing is the mean of the bounding box's width and
//! height divided by [`GridConfig::cells_per_side`]; only points inside the
//! hull are kept.
//!
//! Pairwise point distances are computed once, in parallel, into a ragged
//! lower triangle: row `j` holds the distances to points `0..j`, so only
//! `j > k` entries exist. Each row is computed by exactly one worker.

use super::location::{convex_hull, hull_contains, GeoPoint, Location, PlanarPoint, Projection};
use crate::error::{Error, Result};
use crate::object::ClusterObject;
use crate::progress::{Phase, ProgressSink};
use crate::runner::TaskRunner;
use geo::{Area, BoundingRect};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

static NEXT_GRID_ID: AtomicU64 = AtomicU64::new(1);

/// Grid layout parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridConfig {
    /// Grid cells along the mean side of the bounding box.
    pub cells_per_side: usize,
    /// Covariance kernel bandwidth as a multiple of the grid spacing.
    pub bandwidth_factor: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cells_per_side: 24,
            bandwidth_factor: 2.0,
        }
    }
}

impl GridConfig {
    /// Set the cell count along the mean side.
    pub fn with_cells_per_side(mut self, cells: usize) -> Self {
        self.cells_per_side = cells;
        self
    }

    /// Set the kernel bandwidth factor.
    pub fn with_bandwidth_factor(mut self, factor: f64) -> Self {
        self.bandwidth_factor = factor;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.cells_per_side < 2 {
            return Err(Error::invalid("cells_per_side", "must be >= 2"));
        }
        if !(self.bandwidth_factor.is_finite() && self.bandwidth_factor > 0.0) {
            return Err(Error::invalid("bandwidth_factor", "must be finite and > 0"));
        }
        Ok(())
    }
}

/// One grid point in both coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    /// Planar position, km.
    pub planar: PlanarPoint,
    /// Geographic position, for evaluating density surfaces.
    pub geo: GeoPoint,
}

/// Grid points before their distances are known.
struct Layout {
    projection: Projection,
    points: Vec<GridPoint>,
    spacing_km: f64,
}

impl Layout {
    fn new(locations: &[Location], config: &GridConfig) -> Result<Self> {
        config.validate()?;
        let coords: Vec<GeoPoint> = locations.iter().map(|l| l.point).collect();
        let projection = Projection::centred_on(&coords)
            .ok_or_else(|| Error::DegenerateGeometry("no survey locations".into()))?;
        let planar: Vec<PlanarPoint> = coords.iter().map(|p| projection.project(p)).collect();
        if planar.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return Err(Error::DegenerateGeometry("non-finite location coordinate".into()));
        }

        let hull = convex_hull(&planar);
        let bounds = hull.bounding_rect().filter(|_| hull.unsigned_area() > f64::EPSILON);
        let Some(bounds) = bounds else {
            return Err(Error::DegenerateGeometry(format!(
                "convex hull of {} locations has zero area",
                locations.len()
            )));
        };

        let (min_x, min_y) = bounds.min().x_y();
        let (width, height) = (bounds.width(), bounds.height());
        let spacing_km = (width + height) / 2.0 / config.cells_per_side as f64;

        let nx = (width / spacing_km).ceil() as usize;
        let ny = (height / spacing_km).ceil() as usize;
        let tolerance = spacing_km * 1e-9;
        let mut points = Vec::new();
        for iy in 0..=ny {
            for ix in 0..=nx {
                let planar = PlanarPoint::new(
                    min_x + ix as f64 * spacing_km,
                    min_y + iy as f64 * spacing_km,
                );
                if hull_contains(&hull, &planar, tolerance) {
                    points.push(GridPoint {
                        planar,
                        geo: projection.unproject(&planar),
                    });
                }
            }
        }
        if points.len() < 2 {
            return Err(Error::DegenerateGeometry(format!(
                "grid with spacing {spacing_km:.3} km has fewer than two points inside the hull"
            )));
        }

        Ok(Self {
            projection,
            points,
            spacing_km,
        })
    }
}

/// Sampling grid with cached pairwise point distances.
#[derive(Debug)]
pub struct CovarianceGrid {
    id: u64,
    projection: Projection,
    points: Vec<GridPoint>,
    spacing_km: f64,
    bandwidth_km: f64,
    rows: Vec<Box<[f64]>>,
}

impl CovarianceGrid {
    /// Lay out the grid over `locations` and compute its point distances.
    ///
    /// Fails fast with [`Error::DegenerateGeometry`] when the locations are
    /// empty or span no area.
    pub fn build(
        locations: &[Location],
        config: &GridConfig,
        runner: &TaskRunner,
        progress: &dyn ProgressSink,
    ) -> Result<Self> {
        let layout = Layout::new(locations, config)?;
        progress.set_total(layout.points.len());
        Self::from_layout(layout, config, runner, progress)
    }

    fn from_layout(
        layout: Layout,
        config: &GridConfig,
        runner: &TaskRunner,
        progress: &dyn ProgressSink,
    ) -> Result<Self> {
        let n = layout.points.len();
        progress.set_note("grid distances");
        debug!(points = n, spacing_km = layout.spacing_km, "computing grid distances");

        let points = &layout.points;
        let rows = runner.map_range(n, progress, |j| {
            Ok((0..j)
                .map(|k| points[j].planar.distance(&points[k].planar))
                .collect::<Box<[f64]>>())
        })?;

        Ok(Self {
            id: NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed),
            projection: layout.projection,
            points: layout.points,
            spacing_km: layout.spacing_km,
            bandwidth_km: layout.spacing_km * config.bandwidth_factor,
            rows,
        })
    }

    /// Process-unique id of this grid.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`: construction rejects grids without points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Grid points in row-major order.
    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    /// Spacing between neighbouring points, km.
    pub fn spacing_km(&self) -> f64 {
        self.spacing_km
    }

    /// Covariance kernel bandwidth, km.
    pub fn bandwidth_km(&self) -> f64 {
        self.bandwidth_km
    }

    /// The projection the grid lives in.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Cached distance between grid points `j` and `k`, km.
    ///
    /// # Panics
    ///
    /// If either index is out of range.
    #[inline]
    pub fn distance(&self, j: usize, k: usize) -> f64 {
        match j.cmp(&k) {
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => self.rows[j][k],
            std::cmp::Ordering::Less => self.rows[k][j],
        }
    }

    /// Kernel-weighted local covariance of a field sampled at the grid points.
    ///
    /// For every point `g` the result is the Gaussian-weighted mean of
    /// `(f[g] - mean) * (f[h] - mean)` over all points `h`, weights taken from
    /// the cached distances.
    pub fn covariance_of(&self, field: &[f64]) -> Result<Vec<f64>> {
        let n = self.len();
        if field.len() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: field.len(),
            });
        }
        let mean = field.iter().sum::<f64>() / n as f64;
        let centred: Vec<f64> = field.iter().map(|v| v - mean).collect();
        let two_h2 = 2.0 * self.bandwidth_km * self.bandwidth_km;

        Ok((0..n)
            .map(|g| {
                let (mut num, mut den) = (0.0, 0.0);
                for (h, c) in centred.iter().enumerate() {
                    let d = self.distance(g, h);
                    let w = (-d * d / two_h2).exp();
                    num += w * c;
                    den += w;
                }
                centred[g] * num / den
            })
            .collect())
    }

    /// Populate the covariance sample of every object in parallel.
    pub fn precompute_samples(
        &self,
        objects: &[Arc<ClusterObject>],
        runner: &TaskRunner,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        progress.set_note("covariance functions");
        runner.run_on_items(objects.iter(), progress, |object| {
            object.covariance_sample(self).map(|_| ())
        })
    }
}

/// Build the grid and every object's covariance sample in one call.
///
/// Progress is reported against a combined total: one step per grid point
/// followed by one step per object.
pub fn prepare_covariance(
    locations: &[Location],
    objects: &[Arc<ClusterObject>],
    config: &GridConfig,
    runner: &TaskRunner,
    progress: &dyn ProgressSink,
) -> Result<Arc<CovarianceGrid>> {
    let layout = Layout::new(locations, config)?;
    let grid_steps = layout.points.len();
    progress.set_total(grid_steps + objects.len());

    let grid = CovarianceGrid::from_layout(layout, config, runner, &Phase::new(progress, 0))?;
    grid.precompute_samples(objects, runner, &Phase::new(progress, grid_steps))?;
    info!(
        points = grid.len(),
        objects = objects.len(),
        spacing_km = grid.spacing_km(),
        "covariance grid ready"
    );
    Ok(Arc::new(grid))
}
