use assert_float_eq::assert_float_absolute_eq;
use geo_types::Point;
use roadstate::cost::{Congestion, PriceTable, Route, RouteCoster, TrafficMultipliers};
use roadstate::geometry::{EARTH_RADIUS_M, haversine_km};
use roadstate::segment_state::{SegmentStateIndex, find_segment_state_linear};
use roadstate::state::RoadState;
use roadstate::track::TrackPoint;

/// Small deterministic generator so the scatter is the same on every run
struct Lcg(u64);

impl Lcg {
    fn next_unit(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn scatter(n: usize) -> Vec<TrackPoint> {
    let mut rng = Lcg(42);
    (0..n)
        .map(|_| {
            let lat = 50.0 + rng.next_unit() * 0.01;
            let lon = 8.0 + rng.next_unit() * 0.01;
            let state = RoadState::ALL[(rng.next_unit() * 6.0) as usize % 6];
            TrackPoint::new(lat, lon, state)
        })
        .collect()
}

fn north_of(lat: f64, lon: f64, meters: f64) -> TrackPoint {
    TrackPoint::new(lat + (meters / EARTH_RADIUS_M).to_degrees(), lon, RoadState::NotMeasured)
}

#[test]
fn test_index_agrees_with_linear_scan() {
    let points = scatter(400);
    let index = SegmentStateIndex::new(&points);
    assert_eq!(index.len(), 400);

    let mut rng = Lcg(7);
    for _ in 0..200 {
        let a = Point::new(8.0 + rng.next_unit() * 0.01, 50.0 + rng.next_unit() * 0.01);
        let b = Point::new(
            a.x() + (rng.next_unit() - 0.5) * 0.002,
            a.y() + (rng.next_unit() - 0.5) * 0.002,
        );
        for max_dist in [5.0, 15.0, 50.0] {
            assert_eq!(
                index.find_segment_state(a, b, 50.005, max_dist),
                find_segment_state_linear(&points, a, b, 50.005, max_dist),
            );
        }
    }
}

#[test]
fn test_cost_route_with_traffic() {
    let mut good = north_of(50.0, 8.0005, 5.0);
    good.state = RoadState::Good;
    let index = SegmentStateIndex::new(&[good]);

    let coords = vec![
        Point::new(8.0, 50.0),
        Point::new(8.001, 50.0),
        Point::new(8.002, 50.0),
    ];
    let mut route = Route::new(coords.clone());
    route.congestion = vec![Congestion::Low, Congestion::Heavy];

    let prices = PriceTable::default();
    let mut traffic = TrafficMultipliers::default();
    traffic.set(Congestion::Heavy, 2.0);

    let coster = RouteCoster {
        index: &index,
        prices: &prices,
        traffic: &traffic,
        max_dist_m: 15.0,
    };
    let costs = coster.cost_routes(std::slice::from_ref(&route)).unwrap();
    assert_eq!(costs.len(), 1);
    let cost = &costs[0];

    let d1 = haversine_km(coords[0], coords[1]);
    let d2 = haversine_km(coords[1], coords[2]);
    assert_float_absolute_eq!(cost.total_dist_km, d1 + d2, 1e-9);
    assert_float_absolute_eq!(cost.total_cost, d1 * 0.50 + d2 * 0.30 * 2.0, 1e-9);

    assert_eq!(cost.segments[0].state, RoadState::Good);
    assert_eq!(cost.segments[1].state, RoadState::NotMeasured);
    assert_eq!(cost.segments[1].factor, 2.0);
    assert_eq!(cost.measured_segments(), 1);

    let good = &cost.breakdown[&RoadState::Good];
    assert_float_absolute_eq!(good.dist_km, d1, 1e-9);
    assert_eq!(good.price_per_km, 0.50);
    assert_eq!(cost.breakdown.len(), 2);

    let lines = cost.summary_lines();
    assert!(lines[0].starts_with("Gesamtdistanz: "));
    assert!(lines.iter().any(|l| l.starts_with("- GOOD: ")));
    assert!(!lines.iter().any(|l| l.starts_with("- FAIR: ")));
}

#[test]
fn test_alternatives_share_projection_latitude() {
    let mut fair = north_of(50.0, 8.0005, 10.0);
    fair.state = RoadState::Fair;
    let index = SegmentStateIndex::new(&[fair]);
    let prices = PriceTable::default();
    let traffic = TrafficMultipliers::default();
    let coster = RouteCoster {
        index: &index,
        prices: &prices,
        traffic: &traffic,
        max_dist_m: 50.0,
    };

    let first = Route::new(vec![Point::new(8.0, 50.0), Point::new(8.001, 50.0)]);
    let second = Route::new(vec![
        Point::new(8.0, 50.0),
        Point::new(8.0005, 50.001),
        Point::new(8.001, 50.0),
    ]);
    let costs = coster.cost_routes(&[first.clone(), second]).unwrap();
    assert_eq!(costs.len(), 2);

    // Parallel costing returns routes in input order
    assert_eq!(costs[0], coster.cost_route(&first, 50.0));
    assert_eq!(costs[0].segments[0].state, RoadState::Fair);
}

#[test]
fn test_no_routes_is_an_error() {
    let index = SegmentStateIndex::new(&[]);
    let prices = PriceTable::default();
    let traffic = TrafficMultipliers::default();
    let coster = RouteCoster {
        index: &index,
        prices: &prices,
        traffic: &traffic,
        max_dist_m: 50.0,
    };
    assert!(coster.cost_routes(&[]).is_err());

    let empty = coster.cost_route(&Route::new(vec![Point::new(8.0, 50.0)]), 50.0);
    assert_eq!(empty.total_cost, 0.0);
    assert!(empty.segments.is_empty());
}
