use geo_types::Point;
use ordered_float::OrderedFloat;

use crate::io::{MatchedRow, RoughnessRow};

/// A path point that went through the map matcher
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPathPoint {
    pub interval: f64,
    pub matched: Option<Point<f64>>,
}

/// Attach to every point the roughness whose interval key is nearest.
///
/// Both sides are sorted by key first and the output follows key order. When
/// a point sits exactly between two roughness keys the lower key wins.
pub fn join_nearest(
    mut points: Vec<MatchedPathPoint>,
    roughness: &[RoughnessRow],
) -> Vec<MatchedRow> {
    points.sort_by_key(|p| OrderedFloat(p.interval));

    let mut sorted: Vec<&RoughnessRow> = roughness
        .iter()
        .filter(|r| r.interval.is_finite())
        .collect();
    sorted.sort_by_key(|r| OrderedFloat(r.interval));

    points
        .into_iter()
        .map(|p| MatchedRow {
            matched: p.matched,
            roughness: nearest(&sorted, p.interval).map(|r| r.roughness.clone()),
        })
        .collect()
}

fn nearest<'a>(sorted: &[&'a RoughnessRow], key: f64) -> Option<&'a RoughnessRow> {
    if sorted.is_empty() || !key.is_finite() {
        return None;
    }
    // First row with interval >= key
    let upper = sorted.partition_point(|r| r.interval < key);
    let below = upper.checked_sub(1).map(|i| sorted[i]);
    let above = sorted.get(upper).copied();

    match (below, above) {
        (Some(b), Some(a)) => {
            if (key - b.interval) <= (a.interval - key) {
                Some(b)
            } else {
                Some(a)
            }
        }
        (Some(b), None) => Some(b),
        (None, a) => a,
    }
}
