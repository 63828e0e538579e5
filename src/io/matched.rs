use std::path::Path;

use anyhow::{Context as _, Result};
use geo_types::Point;
use log::info;

use super::{column_index, require_column};
use crate::track::parse_decimal;

/// A path point after map matching and roughness join
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRow {
    /// Snapped position, `None` when the matcher could not place the point
    pub matched: Option<Point<f64>>,
    pub roughness: Option<String>,
}

/// Write `lat_matched,lon_matched,Roughness`; unmatched coordinates stay empty
pub fn write_matched_csv(path: &Path, rows: &[MatchedRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["lat_matched", "lon_matched", "Roughness"])?;
    for row in rows {
        let (lat, lon) = match row.matched {
            Some(p) => (p.y().to_string(), p.x().to_string()),
            None => (String::new(), String::new()),
        };
        writer.write_record([lat, lon, row.roughness.clone().unwrap_or_default()])?;
    }
    writer.flush()?;
    info!("Wrote {} matched rows to {}", rows.len(), path.display());
    Ok(())
}

/// Read a matched CSV back, keeping only rows with coordinates
pub fn read_matched_csv(path: &Path) -> Result<Vec<MatchedRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let lat_idx = require_column(&headers, "lat_matched")?;
    let lon_idx = require_column(&headers, "lon_matched")?;
    let roughness_idx = column_index(&headers, "Roughness");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let lat = record.get(lat_idx).and_then(parse_decimal);
        let lon = record.get(lon_idx).and_then(parse_decimal);
        let (Some(lat), Some(lon)) = (lat, lon) else {
            continue;
        };
        let roughness = roughness_idx
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        rows.push(MatchedRow {
            matched: Some(Point::new(lon, lat)),
            roughness,
        });
    }
    Ok(rows)
}
