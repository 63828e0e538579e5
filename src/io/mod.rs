//! CSV inputs and outputs of the pipelines.

pub mod matched;
pub mod roadlab;
pub mod route_csv;

pub use matched::{MatchedRow, read_matched_csv, write_matched_csv};
pub use roadlab::{PathColumns, PathPoint, RoughnessRow, read_roadlab_path, read_roadlab_roughness};
pub use route_csv::{find_latest_route_csv, load_route_csv, save_route_csv};

use anyhow::{Result, anyhow};
use csv::StringRecord;

/// Position of a header, ignoring surrounding whitespace
pub(crate) fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

pub(crate) fn require_column(headers: &StringRecord, name: &str) -> Result<usize> {
    column_index(headers, name).ok_or_else(|| {
        anyhow!(
            "Missing column {:?}, found: {:?}",
            name,
            headers.iter().map(str::trim).collect::<Vec<_>>()
        )
    })
}
