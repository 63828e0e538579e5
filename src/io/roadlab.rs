//! Readers for RoadLab Pro exports.
//!
//! Path exports carry a leading timestamp field that has no header, so data
//! rows are one field longer than the header row.

use std::path::Path;

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use geo_types::Point;
use log::{debug, info};

use super::require_column;
use crate::track::parse_decimal;

/// Timestamp format of the leading index field, e.g. `08:32:40 2025-November-17`
pub const ROADLAB_TIMESTAMP_FORMAT: &str = "%H:%M:%S %Y-%B-%d";

/// Column names used to pick coordinates out of a path export.
///
/// Exports are shifted by the unnamed timestamp field, which is why latitude
/// ends up under `Interval_Number` and longitude under `Point_Latitude`.
#[derive(Debug, Clone)]
pub struct PathColumns {
    pub lat: String,
    pub lon: String,
    pub interval: String,
}

impl Default for PathColumns {
    fn default() -> Self {
        Self {
            lat: "Interval_Number".to_string(),
            lon: "Point_Latitude".to_string(),
            interval: "Interval_Number".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathPoint {
    pub timestamp: Option<DateTime<Utc>>,
    /// `x = lon`, `y = lat`
    pub point: Point<f64>,
    /// Join key against the roughness export
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoughnessRow {
    pub interval: f64,
    pub roughness: String,
}

pub fn parse_roadlab_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), ROADLAB_TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

/// Read GPS points from a path export, dropping `(0, 0)`-style placeholder fixes
pub fn read_roadlab_path(path: &Path, columns: &PathColumns) -> Result<Vec<PathPoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let lat_idx = require_column(&headers, &columns.lat)?;
    let lon_idx = require_column(&headers, &columns.lon)?;
    let interval_idx = require_column(&headers, &columns.interval)?;

    let mut points = Vec::new();
    let mut dropped = 0;
    for record in reader.records() {
        let record = record?;

        let (timestamp, offset) = if record.len() == headers.len() + 1 {
            (record.get(0).and_then(parse_roadlab_timestamp), 1)
        } else {
            (None, 0)
        };

        let field = |idx: usize| record.get(idx + offset).and_then(parse_decimal);
        let (Some(lat), Some(lon), Some(interval)) =
            (field(lat_idx), field(lon_idx), field(interval_idx))
        else {
            dropped += 1;
            continue;
        };

        if lat == 0.0 || lon == 0.0 {
            dropped += 1;
            continue;
        }

        points.push(PathPoint {
            timestamp,
            point: Point::new(lon, lat),
            interval,
        });
    }

    info!("Read {} path points ({} dropped)", points.len(), dropped);
    Ok(points)
}

/// Read `(Interval_Number, Roughness)` pairs from a roughness export
pub fn read_roadlab_roughness(path: &Path) -> Result<Vec<RoughnessRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    debug!(
        "Roughness columns: {:?}",
        headers.iter().map(str::trim).collect::<Vec<_>>()
    );

    let interval_idx = require_column(&headers, "Interval_Number")?;
    let roughness_idx = require_column(&headers, "Roughness")?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        // Same leading-index quirk as the path export
        let offset = usize::from(record.len() == headers.len() + 1);
        let interval = record.get(interval_idx + offset).and_then(parse_decimal);
        let roughness = record
            .get(roughness_idx + offset)
            .map(str::trim)
            .filter(|r| !r.is_empty());
        if let (Some(interval), Some(roughness)) = (interval, roughness) {
            rows.push(RoughnessRow {
                interval,
                roughness: roughness.to_string(),
            });
        }
    }

    info!("Read {} roughness rows", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike as _, Timelike as _};

    #[test]
    fn parses_roadlab_timestamps() {
        let ts = parse_roadlab_timestamp("08:32:40 2025-November-17").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2025, 11, 17));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (8, 32, 40));
        assert!(parse_roadlab_timestamp("yesterday").is_none());
    }
}
