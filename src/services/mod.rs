//! Clients for third-party geocoding, routing and map-matching services.

pub mod mapbox;
pub mod matching;
pub mod osrm;

pub use mapbox::{Geocoder, MapboxDirections, MapboxMatcher};
pub use matching::{MapMatcher, MatchInput, match_track};
pub use osrm::{OsrmClient, OsrmMatcher};

use std::time::Duration;

use anyhow::{Result, bail};
use reqwest::{Client, Response};

pub const USER_AGENT: &str = concat!("roadstate/", env!("CARGO_PKG_VERSION"));

/// Placeholder shipped in sample configs instead of a real token
pub const TOKEN_PLACEHOLDER: &str = "YOUR_MAPBOX_TOKEN";

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Turn a non-success response into an error carrying status and body
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    bail!("{} returned {}: {}", url.path(), status, body)
}

/// Coordinates in the `lon,lat;lon,lat` form both routing services expect
pub(crate) fn coordinate_path(points: &[geo_types::Point<f64>]) -> String {
    points
        .iter()
        .map(|p| format!("{:.6},{:.6}", p.x(), p.y()))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    #[test]
    fn coordinate_path_is_lon_lat() {
        let path = coordinate_path(&[Point::new(8.68, 50.11), Point::new(8.7, 50.12)]);
        assert_eq!(path, "8.680000,50.110000;8.700000,50.120000");
    }
}
