//! Geographic helpers
//!
//! Coordinates are `(longitude, latitude)` in degrees, longitude first, to
//! match the routing and tile services. The math here is a regional
//! approximation: fine for radii up to a few tens of kilometres, wrong near
//! the poles.

use serde::{Deserialize, Serialize};

/// Kilometres per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.32;

/// A `(longitude, latitude)` pair in degrees.
///
/// Serializes as a two-element array `[lon, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from([lon, lat]: [f64; 2]) -> Self {
        Self { lon, lat }
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(p: GeoPoint) -> Self {
        [p.lon, p.lat]
    }
}

/// Axis-aligned box in degree-space. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lon >= self.min_lon && p.lon <= self.max_lon && p.lat >= self.min_lat && p.lat <= self.max_lat
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// South-west and north-east corners, the order tile services expect
    pub fn corners(&self) -> [GeoPoint; 2] {
        [
            GeoPoint::new(self.min_lon, self.min_lat),
            GeoPoint::new(self.max_lon, self.max_lat),
        ]
    }
}

/// Box of half-size `radius_km` around `center`.
///
/// The latitude span is `radius_km / 111.32`; the longitude span is widened
/// by `1 / cos(lat)` for meridian convergence.
pub fn bounding_box(center: GeoPoint, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / KM_PER_DEGREE;
    let lon_delta = lat_delta / center.lat.to_radians().cos();

    BoundingBox {
        min_lon: center.lon - lon_delta,
        min_lat: center.lat - lat_delta,
        max_lon: center.lon + lon_delta,
        max_lat: center.lat + lat_delta,
    }
}

/// Planar distance in degree-space. Only meaningful for comparing
/// candidates against each other.
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    (a.lon - b.lon).hypot(a.lat - b.lat)
}

/// Index and item of the candidate closest to `from`.
pub fn nearest<T, I, F>(from: GeoPoint, candidates: I, location: F) -> Option<(usize, T)>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> GeoPoint,
{
    candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let d = distance(from, location(&c));
            (d, i, c)
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, i, c)| (i, c))
}
