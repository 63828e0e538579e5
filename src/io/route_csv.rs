use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use chrono::Local;
use geo_types::Point;
use log::{debug, info, warn};

use super::column_index;
use crate::track::parse_decimal;

/// Load route coordinates from a CSV file.
///
/// Map-matched columns (`lat_matched`/`lon_matched`) win over raw `lat`/`lon`.
/// Rows that do not parse are skipped.
pub fn load_route_csv(path: &Path) -> Result<Vec<Point<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let (lat_idx, lon_idx) = match (
        column_index(&headers, "lat_matched"),
        column_index(&headers, "lon_matched"),
    ) {
        (Some(lat), Some(lon)) => {
            info!("Using columns lat_matched / lon_matched");
            (lat, lon)
        }
        _ => match (column_index(&headers, "lat"), column_index(&headers, "lon")) {
            (Some(lat), Some(lon)) => {
                info!("Using columns lat / lon");
                (lat, lon)
            }
            _ => bail!(
                "No coordinate columns in {}, found: {:?}",
                path.display(),
                headers.iter().map(str::trim).collect::<Vec<_>>()
            ),
        },
    };

    let mut coords = Vec::new();
    let mut skipped = 0;
    for record in reader.records() {
        let record = record?;
        let lat = record.get(lat_idx).and_then(parse_decimal);
        let lon = record.get(lon_idx).and_then(parse_decimal);
        match (lat, lon) {
            (Some(lat), Some(lon)) => coords.push(Point::new(lon, lat)),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("Skipped {} rows without valid coordinates", skipped);
    }
    Ok(coords)
}

/// Write route points to `route_<timestamp>.csv` in `dir` with `index,lat,lon` columns
pub fn save_route_csv(dir: &Path, coords: &[Point<f64>]) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("route_{}.csv", stamp));

    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["index", "lat", "lon"])?;
    for (i, p) in coords.iter().enumerate() {
        writer.write_record([i.to_string(), p.y().to_string(), p.x().to_string()])?;
    }
    writer.flush()?;

    Ok(path)
}

/// Newest route file across `dirs`.
///
/// Map-matched `route_matched_*.csv` files are preferred; plain `route_*.csv`
/// files are only considered when there are none. File names embed a
/// timestamp, so the lexicographically last one is the newest.
pub fn find_latest_route_csv(dirs: &[PathBuf]) -> Result<Option<PathBuf>> {
    let matched = collect_csv(dirs, "route_matched_")?;
    let candidates = if matched.is_empty() {
        warn!("No route_matched_*.csv found, falling back to route_*.csv");
        collect_csv(dirs, "route_")?
    } else {
        matched
    };

    Ok(candidates.into_iter().max_by(|a, b| a.file_name().cmp(&b.file_name())))
}

fn collect_csv(dirs: &[PathBuf], prefix: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(prefix) && name.ends_with(".csv") {
                found.push(path);
            }
        }
    }
    Ok(found)
}
