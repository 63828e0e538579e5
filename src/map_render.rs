//! Standalone Leaflet pages for routes and matched tracks.
//!
//! Each page embeds its layers as GeoJSON and draws them client-side, so the
//! output is a single HTML file that opens in any browser.

use anyhow::{Result, bail};
use geo_types::Point;
use serde::Serialize;
use serde_json::{Value, json};

use crate::cost::{Congestion, CostedSegment, Route, RouteCost};
use crate::geometry::mean_center;
use crate::io::MatchedRow;
use crate::segment_state::SegmentStateIndex;
use crate::state::RoadState;

#[derive(Debug, Clone, Serialize)]
pub struct MapLayer {
    pub name: Option<String>,
    pub show: bool,
    pub geojson: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapMarker {
    pub lat: f64,
    pub lon: f64,
    pub popup: String,
    pub color: String,
}

/// Everything the page script needs to draw a map
#[derive(Debug, Clone, Serialize)]
pub struct MapDocument {
    pub center: [f64; 2],
    pub zoom: u8,
    pub layers: Vec<MapLayer>,
    pub markers: Vec<MapMarker>,
    pub collapsed_layers: bool,
    #[serde(skip)]
    pub legend_html: Option<String>,
}

impl MapDocument {
    pub fn new(center: Point<f64>, zoom: u8) -> Self {
        Self {
            center: [center.y(), center.x()],
            zoom,
            layers: Vec::new(),
            markers: Vec::new(),
            collapsed_layers: false,
            legend_html: None,
        }
    }

    pub fn add_start_end_markers(&mut self, coords: &[Point<f64>]) {
        if let (Some(start), Some(end)) = (coords.first(), coords.last()) {
            self.markers.push(MapMarker {
                lat: start.y(),
                lon: start.x(),
                popup: "Start".to_string(),
                color: "green".to_string(),
            });
            self.markers.push(MapMarker {
                lat: end.y(),
                lon: end.x(),
                popup: "Ziel".to_string(),
                color: "red".to_string(),
            });
        }
    }

    /// Render to a self-contained HTML page
    pub fn to_html(&self, title: &str) -> Result<String> {
        // Keep the embedded JSON from closing the script tag
        let data = serde_json::to_string(self)?.replace("</", "<\\/");
        Ok(PAGE_TEMPLATE
            .replace("{{TITLE}}", &escape_html(title))
            .replace("{{LEGEND}}", self.legend_html.as_deref().unwrap_or(""))
            .replace("{{DATA}}", &data))
    }
}

/// Style properties understood by the page script
#[derive(Debug, Clone, Copy)]
pub struct LineStyle<'a> {
    pub color: &'a str,
    pub weight: u32,
    pub opacity: f64,
}

pub fn line_feature(coords: &[Point<f64>], style: LineStyle<'_>, tooltip: Option<String>) -> Value {
    let coordinates: Vec<[f64; 2]> = coords.iter().map(|p| [p.x(), p.y()]).collect();
    json!({
        "type": "Feature",
        "properties": {
            "color": style.color,
            "weight": style.weight,
            "opacity": style.opacity,
            "tooltip": tooltip,
        },
        "geometry": {
            "type": "LineString",
            "coordinates": coordinates
        }
    })
}

pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features
    })
}

fn segment_tooltip(route_name: &str, seg: &CostedSegment) -> String {
    format!(
        "<b>{}</b><br>Zustand: {}<br>Traffic: {} (x{})<br>Abschnitt: {:.2} €",
        escape_html(route_name),
        seg.state,
        seg.congestion,
        seg.factor,
        seg.cost
    )
}

/// Condition and traffic layers for every costed route.
///
/// `routes` and `costs` are parallel slices; only the first route is visible
/// initially.
pub fn route_condition_map(routes: &[Route], costs: &[RouteCost]) -> Result<String> {
    let Some(first) = routes.first() else {
        bail!("No routes to draw");
    };
    let Some(center) = mean_center(&first.coords) else {
        bail!("First route has no coordinates");
    };
    if routes.len() != costs.len() {
        bail!("Got {} routes but {} cost results", routes.len(), costs.len());
    }

    let mut doc = MapDocument::new(center, 12);

    for (idx, cost) in costs.iter().enumerate() {
        let name = format!("Route {}", idx + 1);
        let show = idx == 0;

        let mut condition = Vec::with_capacity(cost.segments.len());
        let mut traffic = Vec::with_capacity(cost.segments.len());
        for seg in &cost.segments {
            let tooltip = segment_tooltip(&name, seg);
            condition.push(line_feature(
                &[seg.from, seg.to],
                LineStyle {
                    color: seg.state.color(),
                    weight: 10,
                    opacity: 0.6,
                },
                Some(tooltip.clone()),
            ));
            traffic.push(line_feature(
                &[seg.from, seg.to],
                LineStyle {
                    color: seg.congestion.color(),
                    weight: 4,
                    opacity: 1.0,
                },
                Some(tooltip),
            ));
        }

        doc.layers.push(MapLayer {
            name: Some(format!(
                "{}: Zustand ({:.2} € | {:.1} km)",
                name, cost.total_cost, cost.total_dist_km
            )),
            show,
            geojson: feature_collection(condition),
        });
        doc.layers.push(MapLayer {
            name: Some(format!("{}: Verkehr", name)),
            show,
            geojson: feature_collection(traffic),
        });
    }

    doc.add_start_end_markers(&first.coords);
    doc.legend_html = Some(route_legend());
    doc.to_html("Route & Kosten")
}

/// Light gray route with segments colored where measured points are nearby.
///
/// Returns the page and the number of colored segments.
pub fn route_preview_map(
    coords: &[Point<f64>],
    index: &SegmentStateIndex,
    max_dist_m: f64,
) -> Result<(String, usize)> {
    let Some(center) = mean_center(coords) else {
        bail!("No coordinates to draw");
    };
    let lat0 = center.y();

    let mut doc = MapDocument::new(center, 14);
    doc.layers.push(MapLayer {
        name: None,
        show: true,
        geojson: feature_collection(vec![line_feature(
            coords,
            LineStyle {
                color: "lightgray",
                weight: 3,
                opacity: 1.0,
            },
            Some("Route".to_string()),
        )]),
    });

    let mut colored = Vec::new();
    for pair in coords.windows(2) {
        let Some(state) = index.find_segment_state(pair[0], pair[1], lat0, max_dist_m) else {
            continue;
        };
        colored.push(line_feature(
            pair,
            LineStyle {
                color: state.color(),
                weight: 6,
                opacity: 1.0,
            },
            Some(format!("Zustand: {}", state)),
        ));
    }
    let colored_count = colored.len();

    doc.layers.push(MapLayer {
        name: None,
        show: true,
        geojson: feature_collection(colored),
    });
    doc.add_start_end_markers(coords);
    doc.legend_html = Some(state_legend("Straßenzustand", RoadState::color));

    Ok((doc.to_html("Route Preview")?, colored_count))
}

/// Matched track with segment `i -> i+1` colored by the roughness of row `i`
pub fn matched_track_map(rows: &[MatchedRow]) -> Result<String> {
    let points: Vec<(Point<f64>, Option<&str>)> = rows
        .iter()
        .filter_map(|r| r.matched.map(|p| (p, r.roughness.as_deref())))
        .collect();
    let coords: Vec<Point<f64>> = points.iter().map(|(p, _)| *p).collect();
    let Some(center) = mean_center(&coords) else {
        bail!("No matched points to draw");
    };

    let mut doc = MapDocument::new(center, 15);
    let features = points
        .windows(2)
        .map(|pair| {
            let (from, label) = pair[0];
            let (to, _) = pair[1];
            let color = label
                .map(|l| RoadState::parse(l).track_color())
                .unwrap_or(RoadState::NotMeasured.track_color());
            line_feature(
                &[from, to],
                LineStyle {
                    color,
                    weight: 6,
                    opacity: 0.9,
                },
                Some(format!("Roughness: {}", escape_html(label.unwrap_or("n/a")))),
            )
        })
        .collect();

    doc.layers.push(MapLayer {
        name: None,
        show: true,
        geojson: feature_collection(features),
    });
    doc.legend_html = Some(state_legend("Roughness", RoadState::track_color));
    doc.to_html("Matched track")
}

fn legend_swatch(color: &str, label: &str, round: bool) -> String {
    format!(
        r#"<i style="background:{};width:10px;height:10px;float:left;margin-right:5px{}"></i> {}<br>"#,
        color,
        if round { ";border-radius:50%" } else { "" },
        label
    )
}

fn state_legend(title: &str, color: fn(&RoadState) -> &'static str) -> String {
    let mut html = format!(r#"<div class="legend"><b>{}</b><br>"#, escape_html(title));
    for state in RoadState::ALL {
        html.push_str(&legend_swatch(color(&state), state.as_str(), false));
    }
    html.push_str("</div>");
    html
}

fn route_legend() -> String {
    let mut html = String::from(
        r#"<div class="legend"><b>Legende & Auswahl</b><br><span style="color:gray;font-size:10px;">Oben rechts Routen umschalten!</span><br><br><b>1. Zustand (Breite Linie)</b><br>"#,
    );
    for state in RoadState::ALL {
        html.push_str(&legend_swatch(state.color(), state.as_str(), true));
    }
    html.push_str("<br><b>2. Verkehr (Innere Linie)</b><br>");
    for (level, label) in [
        (Congestion::Low, "Flüssig"),
        (Congestion::Moderate, "Zäh"),
        (Congestion::Heavy, "Stau"),
        (Congestion::Severe, "Massiv"),
    ] {
        html.push_str(&legend_swatch(level.color(), label, false));
    }
    html.push_str("</div>");
    html
}

pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{TITLE}}</title>
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
html, body, #map { height: 100%; margin: 0; }
.legend { position: fixed; bottom: 30px; left: 30px; width: 220px; z-index: 9999; font-size: 12px;
  background-color: white; opacity: 0.9; padding: 10px; border: 2px solid grey; border-radius: 5px; }
</style>
</head>
<body>
<div id="map"></div>
{{LEGEND}}
<script>
const doc = {{DATA}};
const map = L.map('map').setView(doc.center, doc.zoom);
L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
  maxZoom: 19,
  attribution: '&copy; OpenStreetMap contributors'
}).addTo(map);
const overlays = {};
for (const layer of doc.layers) {
  const group = L.geoJSON(layer.geojson, {
    style: f => ({ color: f.properties.color, weight: f.properties.weight, opacity: f.properties.opacity }),
    onEachFeature: (f, l) => { if (f.properties.tooltip) { l.bindTooltip(f.properties.tooltip); } }
  });
  if (layer.show) { group.addTo(map); }
  if (layer.name) { overlays[layer.name] = group; }
}
for (const m of doc.markers) {
  L.circleMarker([m.lat, m.lon], { radius: 8, color: m.color, fillOpacity: 0.9 })
    .bindPopup(m.popup)
    .addTo(map);
}
if (Object.keys(overlays).length > 0) {
  L.control.layers(null, overlays, { collapsed: doc.collapsed_layers }).addTo(map);
}
</script>
</body>
</html>
"#;
