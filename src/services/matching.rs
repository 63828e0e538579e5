use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use geo_types::Point;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Deserialize;

/// Maximum points per request; both services cap traces at 100
pub const DEFAULT_CHUNK_SIZE: usize = 80;

/// One raw GPS fix to snap onto the road network
#[derive(Debug, Clone, PartialEq)]
pub struct MatchInput {
    pub point: Point<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A service that snaps a short GPS trace onto the road network
#[allow(async_fn_in_trait)]
pub trait MapMatcher {
    fn name(&self) -> &'static str;

    /// Snap one chunk. The result has one entry per input point, `None` for
    /// points the service could not place.
    async fn match_chunk(&self, chunk: &[MatchInput]) -> Result<Vec<Option<Point<f64>>>>;
}

/// Match a whole track chunk by chunk, preserving input order and length
pub async fn match_track<M: MapMatcher>(
    matcher: &M,
    points: &[MatchInput],
    chunk_size: usize,
) -> Result<Vec<Option<Point<f64>>>> {
    if chunk_size < 2 {
        bail!("Chunk size must be at least 2, got {}", chunk_size);
    }

    let chunks: Vec<&[MatchInput]> = points.chunks(chunk_size).collect();
    info!(
        "Matching {} points in {} chunk(s) with {}",
        points.len(),
        chunks.len(),
        matcher.name()
    );

    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
            .progress_chars("##-"),
    );
    pb.set_message("Matching chunks");

    let mut matched = Vec::with_capacity(points.len());
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.len() < 2 {
            // Routing engines reject single-coordinate traces
            warn!("Chunk {} has a single point, leaving it unmatched", i + 1);
            matched.push(None);
        } else {
            matched.extend(matcher.match_chunk(chunk).await?);
        }
        pb.inc(1);
    }
    pb.finish_with_message("Matching done");

    let unmatched = matched.iter().filter(|m| m.is_none()).count();
    info!(
        "Map matching finished: {} points, {} unmatched",
        matched.len(),
        unmatched
    );
    Ok(matched)
}

/// Timestamps as unix seconds, only when every point has one
pub(crate) fn timestamps_param(chunk: &[MatchInput]) -> Option<String> {
    chunk
        .iter()
        .map(|p| p.timestamp.map(|t| t.timestamp().to_string()))
        .collect::<Option<Vec<_>>>()
        .map(|v| v.join(";"))
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    tracepoints: Vec<Option<Tracepoint>>,
}

#[derive(Debug, Deserialize)]
struct Tracepoint {
    /// `[lon, lat]`
    location: [f64; 2],
}

/// Decode a `/match` response shared by OSRM and Mapbox
pub(crate) fn parse_match_response(body: &str, expected: usize) -> Result<Vec<Option<Point<f64>>>> {
    let response: MatchResponse = serde_json::from_str(body)?;
    if let Some(code) = response.code.as_deref() {
        if code != "Ok" {
            bail!(
                "Map matching failed with {}: {}",
                code,
                response.message.unwrap_or_default()
            );
        }
    }

    let mut matched: Vec<Option<Point<f64>>> = response
        .tracepoints
        .into_iter()
        .map(|tp| tp.map(|tp| Point::new(tp.location[0], tp.location[1])))
        .collect();

    if matched.len() != expected {
        warn!(
            "Expected {} tracepoints, got {}; padding with unmatched points",
            expected,
            matched.len()
        );
        matched.resize(expected, None);
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct EchoMatcher {
        calls: RefCell<Vec<usize>>,
    }

    impl MapMatcher for EchoMatcher {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn match_chunk(&self, chunk: &[MatchInput]) -> Result<Vec<Option<Point<f64>>>> {
            self.calls.borrow_mut().push(chunk.len());
            Ok(chunk.iter().map(|p| Some(p.point)).collect())
        }
    }

    fn inputs(n: usize) -> Vec<MatchInput> {
        (0..n)
            .map(|i| MatchInput {
                point: Point::new(8.0 + i as f64 * 1e-4, 50.0),
                timestamp: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn chunks_preserve_order_and_length() {
        let matcher = EchoMatcher {
            calls: RefCell::new(vec![]),
        };
        let points = inputs(170);
        let matched = match_track(&matcher, &points, 80).await.unwrap();

        assert_eq!(matched.len(), 170);
        assert_eq!(*matcher.calls.borrow(), vec![80, 80, 10]);
        assert_eq!(matched[169], Some(points[169].point));
    }

    #[tokio::test]
    async fn trailing_single_point_is_unmatched() {
        let matcher = EchoMatcher {
            calls: RefCell::new(vec![]),
        };
        let matched = match_track(&matcher, &inputs(5), 4).await.unwrap();
        assert_eq!(matched.len(), 5);
        assert_eq!(matched[4], None);
        assert_eq!(*matcher.calls.borrow(), vec![4]);
    }

    #[test]
    fn parses_tracepoints_with_gaps() {
        let body = r#"{"code":"Ok","tracepoints":[{"location":[8.1,50.1]},null]}"#;
        let matched = parse_match_response(body, 3).unwrap();
        assert_eq!(matched, vec![Some(Point::new(8.1, 50.1)), None, None]);
    }

    #[test]
    fn non_ok_code_is_an_error() {
        let body = r#"{"code":"NoMatch","message":"Could not match the trace."}"#;
        let err = parse_match_response(body, 2).unwrap_err();
        assert!(err.to_string().contains("NoMatch"));
    }

    #[test]
    fn timestamps_require_every_point() {
        let mut points = inputs(2);
        assert_eq!(timestamps_param(&points), None);
        for (i, p) in points.iter_mut().enumerate() {
            p.timestamp = DateTime::from_timestamp(1_700_000_000 + i as i64, 0);
        }
        assert_eq!(
            timestamps_param(&points).as_deref(),
            Some("1700000000;1700000001")
        );
    }
}
