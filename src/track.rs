use geo_types::Point;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::RoadState;

/// A measured point with its road condition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub state: RoadState,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64, state: RoadState) -> Self {
        Self { lat, lon, state }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Decode a row returned by the road state API.
    ///
    /// Rows come in different shapes depending on which tool produced them, so
    /// `lat`/`lat_matched`, `lon`/`lon_matched` and `state`/`roughness` are all
    /// accepted. A missing state means the point was not measured.
    pub fn from_api_row(row: &Value) -> Option<Self> {
        let lat = first_f64(row, &["lat", "lat_matched"])?;
        let lon = first_f64(row, &["lon", "lon_matched"])?;
        let state = first_str(row, &["state", "roughness"])
            .map(RoadState::parse)
            .unwrap_or(RoadState::NotMeasured);
        Some(Self { lat, lon, state })
    }
}

/// First key holding a number (or a numeric string)
pub(crate) fn first_f64(row: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match row.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_decimal(s),
        _ => None,
    })
}

/// First key holding a non-empty string
pub(crate) fn first_str<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| row.get(*key)?.as_str().filter(|s| !s.trim().is_empty()))
}

/// Parse a decimal number, accepting `,` as decimal separator
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_rows_accept_both_key_styles() {
        let a = TrackPoint::from_api_row(&json!({"lat": 50.1, "lon": 8.6, "state": "good"}));
        let b = TrackPoint::from_api_row(
            &json!({"lat_matched": "50.1", "lon_matched": 8.6, "roughness": "GOOD"}),
        );
        assert_eq!(a, b);
        assert_eq!(a.unwrap().state, RoadState::Good);
    }

    #[test]
    fn api_rows_default_to_not_measured() {
        let p = TrackPoint::from_api_row(&json!({"lat": 50.1, "lon": 8.6, "roughness": null}))
            .unwrap();
        assert_eq!(p.state, RoadState::NotMeasured);
    }

    #[test]
    fn api_rows_without_coordinates_are_rejected() {
        assert!(TrackPoint::from_api_row(&json!({"lat": 50.1, "state": "GOOD"})).is_none());
        assert!(TrackPoint::from_api_row(&json!({"lat": "x", "lon": 8.6})).is_none());
    }

    #[test]
    fn decimals_accept_comma() {
        assert_eq!(parse_decimal(" 50,25 "), Some(50.25));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("nan"), None);
    }
}
