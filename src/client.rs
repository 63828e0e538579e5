use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use log::{info, warn};
use reqwest::Client;
use serde_json::Value;

use crate::server::TrackPointPayload;
use crate::services::{check_status, http_client};
use crate::track::{TrackPoint, first_f64, first_str};

/// Client for the road state API
pub struct RoadStateClient {
    client: Client,
    base_url: String,
}

impl RoadStateClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn raw_points(&self, timeout: Option<Duration>) -> Result<Vec<Value>> {
        let mut request = self.client.get(self.url("db_points"));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    /// Measured points, skipping rows that do not decode
    pub async fn db_points(&self) -> Result<Vec<TrackPoint>> {
        let raw = self.raw_points(Some(Duration::from_secs(4))).await?;
        let points: Vec<TrackPoint> = raw.iter().filter_map(TrackPoint::from_api_row).collect();
        if points.len() < raw.len() {
            warn!("Skipped {} undecodable rows", raw.len() - points.len());
        }
        info!("Loaded {} points from the road state API", points.len());
        Ok(points)
    }

    /// Like [`Self::db_points`], but an unreachable API yields no points so maps
    /// can still be drawn without condition colors
    pub async fn db_points_or_empty(&self) -> Vec<TrackPoint> {
        match self.db_points().await {
            Ok(points) => points,
            Err(e) => {
                warn!("Could not load points from {}: {:#}", self.base_url, e);
                Vec::new()
            }
        }
    }

    /// Save every row as pretty JSON, returns the row count
    pub async fn backup(&self, path: &Path) -> Result<usize> {
        let raw = self.raw_points(None).await?;
        let text = serde_json::to_string_pretty(&raw)?;
        tokio::fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Backed up {} points to {}", raw.len(), path.display());
        Ok(raw.len())
    }

    pub async fn delete_all(&self) -> Result<Value> {
        let response = self.client.delete(self.url("track_points")).send().await?;
        Ok(check_status(response).await?.json::<Value>().await?)
    }

    /// Post every row of a backup file, returns how many were accepted.
    ///
    /// Failed rows are logged and skipped.
    pub async fn restore(&self, path: &Path) -> Result<usize> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let rows: Vec<Value> = serde_json::from_str(&text)?;
        info!("Restoring {} points from {}", rows.len(), path.display());

        let mut ok = 0;
        for row in &rows {
            let payload = restore_payload(row);
            let response = match self
                .client
                .post(self.url("track_points"))
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("Insert request failed: {}", e);
                    continue;
                }
            };
            let status = response.status();
            if status.is_success() {
                ok += 1;
            } else {
                let body = response.text().await.unwrap_or_default();
                warn!("Insert failed with {}: {}", status, body);
            }
        }

        info!("Restored {} of {} points", ok, rows.len());
        Ok(ok)
    }
}

/// Backup rows may use either naming scheme
pub(crate) fn restore_payload(row: &Value) -> TrackPointPayload {
    TrackPointPayload {
        lat_matched: first_f64(row, &["lat", "lat_matched"]),
        lon_matched: first_f64(row, &["lon", "lon_matched"]),
        roughness: first_str(row, &["roughness", "state"]).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn restore_payload_normalizes_keys() {
        let payload = restore_payload(&json!({"lat": 50.1, "lon": 8.6, "state": "FAIR"}));
        assert_eq!(
            payload,
            TrackPointPayload {
                lat_matched: Some(50.1),
                lon_matched: Some(8.6),
                roughness: Some("FAIR".to_string()),
            }
        );

        let payload = restore_payload(&json!({"lat_matched": 50.1, "lon_matched": 8.6}));
        assert_eq!(payload.roughness, None);
    }
}
