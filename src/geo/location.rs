//! Survey locations, planar projection and convex hulls.

use geo::{ConvexHull, EuclideanDistance, Intersects, MultiPoint, Point, Polygon};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    /// Latitude, degrees north.
    pub lat: f64,
    /// Longitude, degrees east.
    pub lon: f64,
}

impl GeoPoint {
    /// New point from latitude and longitude.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A survey location as delivered by the persistence layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
    /// Stable id of the location record.
    pub id: u64,
    /// Position.
    pub point: GeoPoint,
}

impl Location {
    /// New location.
    pub fn new(id: u64, lat: f64, lon: f64) -> Self {
        Self {
            id,
            point: GeoPoint::new(lat, lon),
        }
    }
}

/// Point in the planar (kilometre) system of a [`Projection`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarPoint {
    /// Easting, km.
    pub x: f64,
    /// Northing, km.
    pub y: f64,
}

impl PlanarPoint {
    /// New planar point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in km.
    #[inline]
    pub fn distance(&self, other: &PlanarPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Equirectangular projection centred on a reference point.
///
/// Survey areas span a few hundred kilometres at most, where the distortion
/// of this projection is well below the resolution of the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    origin: GeoPoint,
    cos_lat: f64,
}

impl Projection {
    /// Projection centred on `origin`.
    pub fn new(origin: GeoPoint) -> Self {
        Self {
            origin,
            cos_lat: origin.lat.to_radians().cos(),
        }
    }

    /// Projection centred on the mean coordinate of `points`.
    ///
    /// Returns `None` for an empty slice.
    pub fn centred_on(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
        let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
        Some(Self::new(GeoPoint::new(lat, lon)))
    }

    /// Geographic to planar.
    pub fn project(&self, p: &GeoPoint) -> PlanarPoint {
        PlanarPoint {
            x: EARTH_RADIUS_KM * (p.lon - self.origin.lon).to_radians() * self.cos_lat,
            y: EARTH_RADIUS_KM * (p.lat - self.origin.lat).to_radians(),
        }
    }

    /// Planar to geographic.
    pub fn unproject(&self, p: &PlanarPoint) -> GeoPoint {
        GeoPoint {
            lat: self.origin.lat + (p.y / EARTH_RADIUS_KM).to_degrees(),
            lon: self.origin.lon + (p.x / (EARTH_RADIUS_KM * self.cos_lat)).to_degrees(),
        }
    }
}

impl From<PlanarPoint> for Point<f64> {
    fn from(p: PlanarPoint) -> Self {
        Point::new(p.x, p.y)
    }
}

/// Convex hull of the finite points, as a polygon in the planar system.
///
/// Collinear or fewer than three distinct points give a polygon with zero
/// [`geo::Area::unsigned_area`].
pub fn convex_hull(points: &[PlanarPoint]) -> Polygon<f64> {
    let finite: Vec<Point<f64>> = points
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|&p| p.into())
        .collect();
    MultiPoint::from(finite).convex_hull()
}

/// Whether `p` lies inside the hull or within `tolerance` km of its border.
pub fn hull_contains(hull: &Polygon<f64>, p: &PlanarPoint, tolerance: f64) -> bool {
    let point = Point::from(*p);
    hull.intersects(&point) || point.euclidean_distance(hull) <= tolerance
}
