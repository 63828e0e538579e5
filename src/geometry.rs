use geo::{Distance as _, Haversine};
use geo_types::Point;

/// Earth radius used by the local planar projection (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude used for coarse bounding boxes
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Great-circle distance between two points in meters.
///
/// Points are `geo` points with `x = lon` and `y = lat`.
pub fn haversine_m(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine.distance(a, b)
}

/// Great-circle distance between two points in kilometers
pub fn haversine_km(a: Point<f64>, b: Point<f64>) -> f64 {
    haversine_m(a, b) / 1000.0
}

/// Equirectangular projection into local meters around a reference latitude.
///
/// Good enough for distances of a few hundred meters, which is all the
/// segment attribution needs.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    cos_lat0: f64,
}

impl LocalProjection {
    pub fn new(lat0: f64) -> Self {
        Self {
            cos_lat0: lat0.to_radians().cos(),
        }
    }

    /// Project a point to `(x, y)` in meters
    pub fn to_xy(&self, point: Point<f64>) -> (f64, f64) {
        let x = EARTH_RADIUS_M * point.x().to_radians() * self.cos_lat0;
        let y = EARTH_RADIUS_M * point.y().to_radians();
        (x, y)
    }

    /// Degrees of (longitude, latitude) covered by `meters` at the reference latitude
    pub fn degree_span(&self, meters: f64) -> (f64, f64) {
        let dlat = (meters / EARTH_RADIUS_M).to_degrees();
        let dlon = if self.cos_lat0 > 1e-12 {
            (meters / (EARTH_RADIUS_M * self.cos_lat0)).to_degrees()
        } else {
            360.0
        };
        (dlon, dlat)
    }

    /// Minimal distance in meters from `point` to the segment `a`-`b`
    pub fn point_to_segment_distance_m(
        &self,
        point: Point<f64>,
        a: Point<f64>,
        b: Point<f64>,
    ) -> f64 {
        let (x, y) = self.to_xy(point);
        let (x1, y1) = self.to_xy(a);
        let (x2, y2) = self.to_xy(b);

        let dx = x2 - x1;
        let dy = y2 - y1;
        let seg_len2 = dx * dx + dy * dy;
        if seg_len2 == 0.0 {
            return (x - x1).hypot(y - y1);
        }

        let t = (((x - x1) * dx + (y - y1) * dy) / seg_len2).clamp(0.0, 1.0);
        let proj_x = x1 + t * dx;
        let proj_y = y1 + t * dy;

        (x - proj_x).hypot(y - proj_y)
    }
}

/// Distance in meters from `point` to segment `a`-`b`, projected around `lat0`
pub fn point_to_segment_distance_m(
    point: Point<f64>,
    a: Point<f64>,
    b: Point<f64>,
    lat0: f64,
) -> f64 {
    LocalProjection::new(lat0).point_to_segment_distance_m(point, a, b)
}

/// Axis-aligned box in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreeBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl DegreeBox {
    pub fn contains(&self, point: Point<f64>) -> bool {
        point.y() >= self.min_lat
            && point.y() <= self.max_lat
            && point.x() >= self.min_lon
            && point.x() <= self.max_lon
    }
}

/// Coarse box of `radius_m` around `center`, used to prefilter database rows
pub fn radius_bbox(center: Point<f64>, radius_m: f64) -> DegreeBox {
    let lat_radius = radius_m / METERS_PER_DEGREE;
    let lon_radius = radius_m / (METERS_PER_DEGREE * center.y().to_radians().cos());

    DegreeBox {
        min_lat: center.y() - lat_radius,
        max_lat: center.y() + lat_radius,
        min_lon: center.x() - lon_radius.abs(),
        max_lon: center.x() + lon_radius.abs(),
    }
}

/// Arithmetic mean of the coordinates, `None` for an empty slice
pub fn mean_center(points: &[Point<f64>]) -> Option<Point<f64>> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x(), sy + p.y()));
    Some(Point::new(sum_x / n, sum_y / n))
}
