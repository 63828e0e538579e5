use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use geo_types::Point;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;

use super::matching::{MapMatcher, MatchInput, parse_match_response, timestamps_param};
use super::{check_status, coordinate_path, http_client};
use crate::cost::Route;

pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    geometry: GeoJsonLine,
    distance: Option<f64>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeoJsonLine {
    /// `[lon, lat]` pairs
    pub coordinates: Vec<[f64; 2]>,
}

impl GeoJsonLine {
    pub(crate) fn into_points(self) -> Vec<Point<f64>> {
        self.coordinates
            .into_iter()
            .map(|[lon, lat]| Point::new(lon, lat))
            .collect()
    }
}

/// OSRM `/route` client
pub struct OsrmClient {
    client: Client,
    base_url: String,
}

impl OsrmClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(15))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Driving route through the waypoints in order, following the full road
    /// geometry
    pub async fn route(&self, waypoints: &[Point<f64>]) -> Result<Route> {
        if waypoints.len() < 2 {
            bail!("A route needs at least 2 waypoints, got {}", waypoints.len());
        }
        let url = format!(
            "{}/route/v1/driving/{}",
            self.base_url,
            coordinate_path(waypoints)
        );
        debug!("OSRM route request: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("overview", "full"), ("geometries", "geojson")])
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        let route = parse_route_response(&body)?;
        info!("OSRM returned a route with {} points", route.coords.len());
        Ok(route)
    }
}
pub(crate) fn parse_route_response(body: &str) -> Result<Route> {
    let response: RouteResponse = serde_json::from_str(body)?;
    let entry = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No route found (OSRM)"))?;
    Ok(Route {
        coords: entry.geometry.into_points(),
        congestion: Vec::new(),
        distance_m: entry.distance,
        duration_s: entry.duration,
    })
}

/// OSRM `/match` client
pub struct OsrmMatcher {
    client: Client,
    base_url: String,
}

impl OsrmMatcher {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl MapMatcher for OsrmMatcher {
    fn name(&self) -> &'static str {
        "OSRM"
    }

    async fn match_chunk(&self, chunk: &[MatchInput]) -> Result<Vec<Option<Point<f64>>>> {
        let points: Vec<Point<f64>> = chunk.iter().map(|p| p.point).collect();
        let url = format!(
            "{}/match/v1/driving/{}",
            self.base_url,
            coordinate_path(&points)
        );

        let mut query = vec![
            ("geometries", "geojson".to_string()),
            ("overview", "full".to_string()),
        ];
        if let Some(timestamps) = timestamps_param(chunk) {
            query.push(("timestamps", timestamps));
        }

        debug!("Sending {} points to OSRM /match", chunk.len());
        let response = self.client.get(&url).query(&query).send().await?;
        let body = check_status(response).await?.text().await?;
        parse_match_response(&body, chunk.len())
    }
}
