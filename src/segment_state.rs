use geo_types::Point;
use log::debug;
use rstar::{AABB, RTree, primitives::GeomWithData};

use crate::geometry::LocalProjection;
use crate::state::{RoadState, choose_worse};
use crate::track::TrackPoint;

type IndexedPoint = GeomWithData<[f64; 2], RoadState>;

/// Spatial index over measured points, used to attribute a road state to
/// route segments.
pub struct SegmentStateIndex {
    tree: RTree<IndexedPoint>,
}

impl SegmentStateIndex {
    pub fn new(points: &[TrackPoint]) -> Self {
        let entries: Vec<IndexedPoint> = points
            .iter()
            .filter(|p| p.lat.is_finite() && p.lon.is_finite())
            .map(|p| GeomWithData::new([p.lon, p.lat], p.state))
            .collect();
        debug!("Indexed {} measured points", entries.len());
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Worst state among measured points within `max_dist_m` of segment `a`-`b`.
    ///
    /// Distances use the planar projection around `lat0`. Returns `None` when no
    /// point is close enough.
    pub fn find_segment_state(
        &self,
        a: Point<f64>,
        b: Point<f64>,
        lat0: f64,
        max_dist_m: f64,
    ) -> Option<RoadState> {
        if self.is_empty() {
            return None;
        }

        let projection = LocalProjection::new(lat0);

        // Longitude only drives x and latitude only drives y, so padding the
        // segment box by the radius in degrees cannot drop a qualifying point.
        let (dlon, dlat) = projection.degree_span(max_dist_m.max(0.0));
        let dlon = dlon * (1.0 + 1e-9) + 1e-12;
        let dlat = dlat * (1.0 + 1e-9) + 1e-12;
        let envelope = AABB::from_corners(
            [a.x().min(b.x()) - dlon, a.y().min(b.y()) - dlat],
            [a.x().max(b.x()) + dlon, a.y().max(b.y()) + dlat],
        );

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| {
                let [lon, lat] = *entry.geom();
                projection.point_to_segment_distance_m(Point::new(lon, lat), a, b) <= max_dist_m
            })
            .fold(None, |worst, entry| choose_worse(worst, Some(entry.data)))
    }
}

/// Reference scan over every point, without the spatial index
pub fn find_segment_state_linear(
    points: &[TrackPoint],
    a: Point<f64>,
    b: Point<f64>,
    lat0: f64,
    max_dist_m: f64,
) -> Option<RoadState> {
    let projection = LocalProjection::new(lat0);
    let mut best = None;
    for p in points {
        if projection.point_to_segment_distance_m(p.point(), a, b) <= max_dist_m {
            best = choose_worse(best, Some(p.state));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::EARTH_RADIUS_M;

    fn north_of(lon: f64, lat: f64, meters: f64) -> (f64, f64) {
        (lat + (meters / EARTH_RADIUS_M).to_degrees(), lon)
    }

    #[test]
    fn empty_index_has_no_state() {
        let index = SegmentStateIndex::new(&[]);
        let a = Point::new(8.0, 50.0);
        assert_eq!(index.find_segment_state(a, a, 50.0, 100.0), None);
    }

    #[test]
    fn picks_worst_of_nearby_points() {
        let (lat1, lon1) = north_of(8.0005, 50.0, 5.0);
        let (lat2, lon2) = north_of(8.0007, 50.0, 12.0);
        let (lat3, lon3) = north_of(8.0005, 50.0, 40.0);
        let points = vec![
            TrackPoint::new(lat1, lon1, RoadState::Good),
            TrackPoint::new(lat2, lon2, RoadState::Fair),
            // Too far away to count
            TrackPoint::new(lat3, lon3, RoadState::VeryPoor),
        ];
        let index = SegmentStateIndex::new(&points);
        let a = Point::new(8.0, 50.0);
        let b = Point::new(8.001, 50.0);

        assert_eq!(index.find_segment_state(a, b, 50.0, 15.0), Some(RoadState::Fair));
        assert_eq!(index.find_segment_state(a, b, 50.0, 50.0), Some(RoadState::VeryPoor));
        assert_eq!(index.find_segment_state(a, b, 50.0, 1.0), None);
    }

    #[test]
    fn point_exactly_on_threshold_counts() {
        let (lat, lon) = north_of(8.0005, 50.0, 15.0);
        let points = vec![TrackPoint::new(lat, lon, RoadState::Poor)];
        let a = Point::new(8.0, 50.0);
        let b = Point::new(8.001, 50.0);
        let threshold = LocalProjection::new(50.0).point_to_segment_distance_m(points[0].point(), a, b);

        let index = SegmentStateIndex::new(&points);
        assert_eq!(index.find_segment_state(a, b, 50.0, threshold), Some(RoadState::Poor));
        assert_eq!(
            find_segment_state_linear(&points, a, b, 50.0, threshold),
            Some(RoadState::Poor)
        );
    }
}
