use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use geo_types::Point;
use log::{debug, info};
use reqwest::{Client, Url};
use serde::Deserialize;

use super::matching::{MapMatcher, MatchInput, parse_match_response, timestamps_param};
use super::osrm::GeoJsonLine;
use super::{TOKEN_PLACEHOLDER, check_status, coordinate_path, http_client};
use crate::cost::{Congestion, Route};

pub const DEFAULT_MAPBOX_URL: &str = "https://api.mapbox.com";

fn require_token(token: Option<&str>) -> Result<String> {
    match token.map(str::trim) {
        Some(t) if !t.is_empty() && t != TOKEN_PLACEHOLDER => Ok(t.to_string()),
        _ => bail!("A Mapbox access token is required (set ROADSTATE_MAPBOX_TOKEN or MAPBOX_TOKEN)"),
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    features: Vec<GeocodeFeature>,
}

#[derive(Debug, Deserialize)]
struct GeocodeFeature {
    /// `[lon, lat]`
    center: [f64; 2],
}

/// Address lookup through the Mapbox places API
pub struct Geocoder {
    client: Client,
    base_url: String,
    token: String,
}

impl Geocoder {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(10))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: require_token(token)?,
        })
    }

    /// Resolve a free-form address to a point (`x = lon`, `y = lat`)
    pub async fn geocode(&self, address: &str) -> Result<Point<f64>> {
        let url = geocode_url(&self.base_url, address)?;
        let response = self
            .client
            .get(url)
            .query(&[("access_token", self.token.as_str()), ("limit", "1")])
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        let point = parse_geocode_response(&body)
            .map_err(|e| anyhow!("Address {:?} could not be resolved: {}", address, e))?;
        debug!("Geocoded {:?} to {:.6},{:.6}", address, point.y(), point.x());
        Ok(point)
    }
}

fn geocode_url(base_url: &str, address: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Invalid Mapbox base URL {}", base_url))?
        .pop_if_empty()
        .extend([
            "geocoding",
            "v5",
            "mapbox.places",
            &format!("{}.json", address),
        ]);
    Ok(url)
}

pub(crate) fn parse_geocode_response(body: &str) -> Result<Point<f64>> {
    let response: GeocodeResponse = serde_json::from_str(body)?;
    let feature = response
        .features
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("address not found (Mapbox)"))?;
    let [lon, lat] = feature.center;
    Ok(Point::new(lon, lat))
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    geometry: GeoJsonLine,
    distance: Option<f64>,
    duration: Option<f64>,
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    annotation: Option<LegAnnotation>,
}

#[derive(Debug, Deserialize)]
struct LegAnnotation {
    #[serde(default)]
    congestion: Vec<String>,
}

/// Mapbox directions with live traffic and alternatives
pub struct MapboxDirections {
    client: Client,
    base_url: String,
    token: String,
}

impl MapboxDirections {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(15))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: require_token(token)?,
        })
    }

    /// Driving routes through every waypoint in order, each with per-segment
    /// congestion. With `alternatives` Mapbox may return more than one route.
    pub async fn routes(&self, waypoints: &[Point<f64>], alternatives: bool) -> Result<Vec<Route>> {
        let url = directions_url(&self.base_url, waypoints)?;
        let response = self
            .client
            .get(&url)
            .query(&[
                ("access_token", self.token.as_str()),
                ("alternatives", if alternatives { "true" } else { "false" }),
                ("annotations", "congestion"),
                ("overview", "full"),
                ("geometries", "geojson"),
            ])
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        let routes = parse_directions_response(&body)?;
        info!(
            "Mapbox returned {} route(s) through {} waypoints",
            routes.len(),
            waypoints.len()
        );
        Ok(routes)
    }
}

fn directions_url(base_url: &str, waypoints: &[Point<f64>]) -> Result<String> {
    if waypoints.len() < 2 {
        bail!("A route needs at least 2 waypoints, got {}", waypoints.len());
    }
    Ok(format!(
        "{}/directions/v5/mapbox/driving-traffic/{}",
        base_url,
        coordinate_path(waypoints)
    ))
}

pub(crate) fn parse_directions_response(body: &str) -> Result<Vec<Route>> {
    let response: DirectionsResponse = serde_json::from_str(body)?;
    if let Some(code) = response.code.as_deref() {
        if code != "Ok" {
            bail!(
                "Directions failed with {}: {}",
                code,
                response.message.unwrap_or_default()
            );
        }
    }
    if response.routes.is_empty() {
        bail!("No route found (Mapbox)");
    }

    Ok(response
        .routes
        .into_iter()
        .map(|r| {
            let congestion = r
                .legs
                .iter()
                .filter_map(|leg| leg.annotation.as_ref())
                .flat_map(|a| a.congestion.iter().map(|c| Congestion::parse(c)))
                .collect();
            Route {
                coords: r.geometry.into_points(),
                congestion,
                distance_m: r.distance,
                duration_s: r.duration,
            }
        })
        .collect())
}

/// Mapbox map matching API
pub struct MapboxMatcher {
    client: Client,
    base_url: String,
    token: String,
}

impl MapboxMatcher {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: require_token(token)?,
        })
    }
}

impl MapMatcher for MapboxMatcher {
    fn name(&self) -> &'static str {
        "Mapbox"
    }

    async fn match_chunk(&self, chunk: &[MatchInput]) -> Result<Vec<Option<Point<f64>>>> {
        let points: Vec<Point<f64>> = chunk.iter().map(|p| p.point).collect();
        let url = format!(
            "{}/matching/v5/mapbox/driving/{}.json",
            self.base_url,
            coordinate_path(&points)
        );

        let mut query = vec![
            ("access_token", self.token.clone()),
            ("geometries", "geojson".to_string()),
            ("overview", "full".to_string()),
            ("tidy", "true".to_string()),
        ];
        if let Some(timestamps) = timestamps_param(chunk) {
            query.push(("timestamps", timestamps));
        }

        debug!("Sending {} points to Mapbox matching", chunk.len());
        let response = self.client.get(&url).query(&query).send().await?;
        let body = check_status(response).await?.text().await?;
        parse_match_response(&body, chunk.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geocode_url_encodes_address() {
        let url = geocode_url(DEFAULT_MAPBOX_URL, "Fritz-Tarnow-Straße 3, Frankfurt").unwrap();
        assert_eq!(
            url.path(),
            "/geocoding/v5/mapbox.places/Fritz-Tarnow-Stra%C3%9Fe%203,%20Frankfurt.json"
        );
    }

    #[test]
    fn geocode_takes_first_center() {
        let body = r#"{"features":[{"center":[8.70,50.12]},{"center":[0.0,0.0]}]}"#;
        assert_eq!(parse_geocode_response(body).unwrap(), Point::new(8.70, 50.12));
        assert!(parse_geocode_response(r#"{"features":[]}"#).is_err());
    }

    #[test]
    fn directions_collect_congestion_across_legs() {
        let body = r#"{"code":"Ok","routes":[
            {"distance":900.0,"duration":120.0,
             "geometry":{"coordinates":[[8.0,50.0],[8.001,50.0],[8.002,50.0]]},
             "legs":[{"annotation":{"congestion":["low","heavy"]}}]},
            {"geometry":{"coordinates":[[8.0,50.0],[8.002,50.0]]},"legs":[{}]}
        ]}"#;
        let routes = parse_directions_response(body).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].congestion, vec![Congestion::Low, Congestion::Heavy]);
        assert!(routes[1].congestion.is_empty());
        assert_eq!(routes[1].congestion_at(0), Congestion::Unknown);
    }

    #[test]
    fn directions_through_three_waypoints() {
        let stops = [
            Point::new(8.0, 50.0),
            Point::new(8.002, 50.0),
            Point::new(8.002, 50.002),
        ];
        let url = directions_url(DEFAULT_MAPBOX_URL, &stops).unwrap();
        assert_eq!(
            url,
            "https://api.mapbox.com/directions/v5/mapbox/driving-traffic/\
             8.000000,50.000000;8.002000,50.000000;8.002000,50.002000"
        );
        assert!(directions_url(DEFAULT_MAPBOX_URL, &stops[..1]).is_err());

        // One leg per pair of stops; congestion runs on across legs
        let body = r#"{"code":"Ok","routes":[
            {"geometry":{"coordinates":[[8.0,50.0],[8.001,50.0],[8.002,50.0],[8.002,50.001],[8.002,50.002]]},
             "legs":[
                {"annotation":{"congestion":["low","moderate"]}},
                {"annotation":{"congestion":["severe","unknown"]}}
             ]}
        ]}"#;
        let routes = parse_directions_response(body).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].segment_count(), 4);
        assert_eq!(
            routes[0].congestion,
            vec![
                Congestion::Low,
                Congestion::Moderate,
                Congestion::Severe,
                Congestion::Unknown
            ]
        );
    }

    #[test]
    fn placeholder_token_is_rejected() {
        assert!(require_token(Some(TOKEN_PLACEHOLDER)).is_err());
        assert!(require_token(None).is_err());
        assert_eq!(require_token(Some(" pk.abc ")).unwrap(), "pk.abc");
    }
}
