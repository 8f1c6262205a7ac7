//! Geography: survey locations, the planar projection and the covariance grid.

mod grid;
mod location;

pub use grid::{prepare_covariance, CovarianceGrid, GridConfig, GridPoint};
pub use location::{
    convex_hull, hull_contains, GeoPoint, Location, PlanarPoint, Projection, EARTH_RADIUS_KM,
};
