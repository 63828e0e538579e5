use std::collections::{BTreeMap, HashMap};
use std::fmt;

use anyhow::{Result, anyhow, bail};
use geo_types::Point;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::{haversine_km, mean_center};
use crate::segment_state::SegmentStateIndex;
use crate::state::RoadState;
use crate::track::parse_decimal;

/// Traffic level reported per segment by the directions service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Congestion {
    Unknown,
    Low,
    Moderate,
    Heavy,
    Severe,
}

impl Congestion {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Congestion::Low,
            "moderate" => Congestion::Moderate,
            "heavy" => Congestion::Heavy,
            "severe" => Congestion::Severe,
            _ => Congestion::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Congestion::Unknown => "unknown",
            Congestion::Low => "low",
            Congestion::Moderate => "moderate",
            Congestion::Heavy => "heavy",
            Congestion::Severe => "severe",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Congestion::Unknown => "gray",
            Congestion::Low => "#00FF00",
            Congestion::Moderate => "#FFA500",
            Congestion::Heavy => "#FF0000",
            Congestion::Severe => "#8B0000",
        }
    }
}

impl fmt::Display for Congestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Congestion {
    fn from(value: String) -> Self {
        Congestion::parse(&value)
    }
}

impl From<Congestion> for String {
    fn from(value: Congestion) -> Self {
        value.as_str().to_string()
    }
}

/// Price in € per km for each road state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable(BTreeMap<RoadState, f64>);

impl Default for PriceTable {
    fn default() -> Self {
        Self(BTreeMap::from([
            (RoadState::VeryGood, 0.40),
            (RoadState::Good, 0.50),
            (RoadState::Fair, 0.70),
            (RoadState::Poor, 0.80),
            (RoadState::VeryPoor, 0.90),
            (RoadState::NotMeasured, 0.30),
        ]))
    }
}

impl PriceTable {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Price for a state, 0 when the table has none
    pub fn price(&self, state: RoadState) -> f64 {
        self.0.get(&state).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, state: RoadState, price: f64) {
        self.0.insert(state, price);
    }

    /// Set a price from user input such as `0,70`
    pub fn set_from_str(&mut self, state: RoadState, raw: &str) -> Result<()> {
        let price = parse_decimal(raw)
            .ok_or_else(|| anyhow!("Invalid price for {}: {:?}", state, raw))?;
        self.set(state, price);
        Ok(())
    }

    /// Apply a `STATE=PRICE` override such as `FAIR=0,75`
    pub fn apply_override(&mut self, raw: &str) -> Result<()> {
        let (label, value) = split_override(raw)?;
        let state = RoadState::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(label))
            .ok_or_else(|| anyhow!("Unknown road state {:?}", label))?;
        self.set_from_str(state, value)
    }
}

/// Cost factor per congestion level; levels without an entry cost 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficMultipliers(HashMap<Congestion, f64>);

impl Default for TrafficMultipliers {
    fn default() -> Self {
        Self(HashMap::from([(Congestion::Unknown, 1.0)]))
    }
}

impl TrafficMultipliers {
    pub fn factor(&self, congestion: Congestion) -> f64 {
        self.0.get(&congestion).copied().unwrap_or(1.0)
    }

    pub fn set(&mut self, congestion: Congestion, factor: f64) {
        self.0.insert(congestion, factor);
    }

    /// Surcharges offered by the route planner: low 1.0, moderate 1.2,
    /// heavy 1.5, severe 2.0
    pub fn planner_defaults() -> Self {
        Self(HashMap::from([
            (Congestion::Unknown, 1.0),
            (Congestion::Low, 1.0),
            (Congestion::Moderate, 1.2),
            (Congestion::Heavy, 1.5),
            (Congestion::Severe, 2.0),
        ]))
    }

    /// Apply a `LEVEL=FACTOR` override such as `heavy=1,8`
    pub fn apply_override(&mut self, raw: &str) -> Result<()> {
        let (level, value) = split_override(raw)?;
        let congestion = Congestion::parse(level);
        if congestion == Congestion::Unknown && !level.eq_ignore_ascii_case("unknown") {
            bail!("Unknown congestion level {:?}", level);
        }
        let factor = parse_decimal(value)
            .ok_or_else(|| anyhow!("Invalid factor for {}: {:?}", congestion, value))?;
        self.set(congestion, factor);
        Ok(())
    }
}

fn split_override(raw: &str) -> Result<(&str, &str)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected KEY=VALUE, got {:?}", raw))?;
    Ok((key.trim(), value.trim()))
}

/// Ordered route geometry with optional per-segment congestion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Points with `x = lon`, `y = lat`
    pub coords: Vec<Point<f64>>,
    /// One entry per segment when the routing service reports traffic
    #[serde(default)]
    pub congestion: Vec<Congestion>,
    pub distance_m: Option<f64>,
    pub duration_s: Option<f64>,
}

impl Route {
    pub fn new(coords: Vec<Point<f64>>) -> Self {
        Self {
            coords,
            ..Default::default()
        }
    }

    pub fn segment_count(&self) -> usize {
        self.coords.len().saturating_sub(1)
    }

    /// Congestion for segment `i`, unknown when not reported
    pub fn congestion_at(&self, i: usize) -> Congestion {
        self.congestion.get(i).copied().unwrap_or(Congestion::Unknown)
    }
}

/// One costed segment, kept for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostedSegment {
    pub from: Point<f64>,
    pub to: Point<f64>,
    pub state: RoadState,
    pub congestion: Congestion,
    pub factor: f64,
    pub dist_km: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BreakdownEntry {
    pub dist_km: f64,
    pub cost: f64,
    pub price_per_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteCost {
    pub total_cost: f64,
    pub total_dist_km: f64,
    pub breakdown: BTreeMap<RoadState, BreakdownEntry>,
    pub segments: Vec<CostedSegment>,
}

impl RouteCost {
    /// Human readable cost summary, one line per state that was driven on
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Gesamtdistanz: {:.2} km", self.total_dist_km),
            format!("Gesamtkosten: {:.2} €", self.total_cost),
            String::new(),
            "Aufschlüsselung nach Straßenzustand:".to_string(),
        ];
        for (state, entry) in &self.breakdown {
            if entry.dist_km <= 0.0 {
                continue;
            }
            lines.push(format!(
                "- {}: {:.2} km * {:.2} €/km = {:.2} €",
                state, entry.dist_km, entry.price_per_km, entry.cost
            ));
        }
        lines
    }

    /// Number of segments that had a measured point nearby
    pub fn measured_segments(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.state != RoadState::NotMeasured)
            .count()
    }
}

/// Attributes road states to route segments and prices them
pub struct RouteCoster<'a> {
    pub index: &'a SegmentStateIndex,
    pub prices: &'a PriceTable,
    pub traffic: &'a TrafficMultipliers,
    /// Maximum distance of a measured point from a segment (meters)
    pub max_dist_m: f64,
}

impl RouteCoster<'_> {
    pub fn cost_route(&self, route: &Route, lat0: f64) -> RouteCost {
        let mut result = RouteCost::default();

        for (i, pair) in route.coords.windows(2).enumerate() {
            let (from, to) = (pair[0], pair[1]);
            let dist_km = haversine_km(from, to);

            let state = self
                .index
                .find_segment_state(from, to, lat0, self.max_dist_m)
                .unwrap_or(RoadState::NotMeasured);
            let price_per_km = self.prices.price(state);

            let congestion = route.congestion_at(i);
            let factor = self.traffic.factor(congestion);

            let cost = dist_km * price_per_km * factor;
            result.total_dist_km += dist_km;
            result.total_cost += cost;

            let entry = result.breakdown.entry(state).or_default();
            entry.dist_km += dist_km;
            entry.cost += cost;
            entry.price_per_km = price_per_km;

            result.segments.push(CostedSegment {
                from,
                to,
                state,
                congestion,
                factor,
                dist_km,
                cost,
            });
        }

        debug!(
            "Costed route with {} segments: {:.2} km, {:.2} €",
            result.segments.len(),
            result.total_dist_km,
            result.total_cost
        );
        result
    }

    /// Cost several alternative routes.
    ///
    /// All routes share the projection latitude of the first route so their
    /// segment attribution is comparable.
    pub fn cost_routes(&self, routes: &[Route]) -> Result<Vec<RouteCost>> {
        let Some(first) = routes.first() else {
            bail!("No routes to cost");
        };
        let lat0 = mean_center(&first.coords)
            .ok_or_else(|| anyhow!("First route has no coordinates"))?
            .y();

        info!("Costing {} route(s) against {} measured points", routes.len(), self.index.len());
        Ok(routes
            .par_iter()
            .map(|route| self.cost_route(route, lat0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congestion_parse_falls_back_to_unknown() {
        assert_eq!(Congestion::parse("Heavy"), Congestion::Heavy);
        assert_eq!(Congestion::parse("jammed"), Congestion::Unknown);
    }

    #[test]
    fn price_table_accepts_comma_input() {
        let mut prices = PriceTable::empty();
        prices.set_from_str(RoadState::Fair, "0,75").unwrap();
        assert_eq!(prices.price(RoadState::Fair), 0.75);
        assert_eq!(prices.price(RoadState::Good), 0.0);
        assert!(prices.set_from_str(RoadState::Good, "cheap").is_err());
    }

    #[test]
    fn traffic_factor_defaults_to_one() {
        let mut traffic = TrafficMultipliers::default();
        traffic.set(Congestion::Severe, 2.0);
        assert_eq!(traffic.factor(Congestion::Severe), 2.0);
        assert_eq!(traffic.factor(Congestion::Low), 1.0);
    }

    #[test]
    fn planner_defaults_add_surcharges() {
        let traffic = TrafficMultipliers::planner_defaults();
        assert_eq!(traffic.factor(Congestion::Low), 1.0);
        assert_eq!(traffic.factor(Congestion::Moderate), 1.2);
        assert_eq!(traffic.factor(Congestion::Heavy), 1.5);
        assert_eq!(traffic.factor(Congestion::Severe), 2.0);
        assert_eq!(traffic.factor(Congestion::Unknown), 1.0);
    }

    #[test]
    fn overrides_parse_key_value_pairs() {
        let mut traffic = TrafficMultipliers::planner_defaults();
        traffic.apply_override("Heavy = 1,8").unwrap();
        assert_eq!(traffic.factor(Congestion::Heavy), 1.8);
        assert!(traffic.apply_override("jammed=3").is_err());
        assert!(traffic.apply_override("severe").is_err());
        assert!(traffic.apply_override("severe=lots").is_err());

        let mut prices = PriceTable::default();
        prices.apply_override("very poor=1,25").unwrap();
        assert_eq!(prices.price(RoadState::VeryPoor), 1.25);
        assert!(prices.apply_override("BUMPY=1").is_err());
    }

    #[test]
    fn summary_skips_unused_states() {
        let mut cost = RouteCost {
            total_cost: 1.0,
            total_dist_km: 2.0,
            ..Default::default()
        };
        cost.breakdown.insert(
            RoadState::Good,
            BreakdownEntry {
                dist_km: 2.0,
                cost: 1.0,
                price_per_km: 0.5,
            },
        );
        cost.breakdown.insert(RoadState::Fair, BreakdownEntry::default());

        let lines = cost.summary_lines();
        assert_eq!(lines[0], "Gesamtdistanz: 2.00 km");
        assert_eq!(lines.last().unwrap(), "- GOOD: 2.00 km * 0.50 €/km = 1.00 €");
        assert!(!lines.iter().any(|l| l.contains("FAIR")));
    }
}
