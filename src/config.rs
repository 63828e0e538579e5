use std::path::Path;

use anyhow::{Context as _, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cost::{PriceTable, TrafficMultipliers};
use crate::services::matching::DEFAULT_CHUNK_SIZE;
use crate::services::mapbox::DEFAULT_MAPBOX_URL;
use crate::services::osrm::DEFAULT_OSRM_URL;

pub const DEFAULT_CONFIG_FILE: &str = "roadstate.toml";

/// Unprefixed variables honored for compatibility with older deployments
const LEGACY_ENV: [&str; 4] = ["API_BASE_URL", "MAPBOX_TOKEN", "OSRM_BASE_URL", "DATABASE_URL"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the road state API used by the client commands
    pub api_base_url: String,
    pub database_url: Option<String>,
    pub mapbox_token: Option<String>,
    pub mapbox_base_url: String,
    pub osrm_base_url: String,
    pub server: ServerConfig,
    pub matching: MatchingConfig,
    pub costing: CostingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Segment search radius for previews (meters)
    pub max_dist_m: f64,
    pub chunk_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostingConfig {
    pub max_dist_m: f64,
    pub prices: PriceTable,
    pub traffic: TrafficMultipliers,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            database_url: None,
            mapbox_token: None,
            mapbox_base_url: DEFAULT_MAPBOX_URL.to_string(),
            osrm_base_url: DEFAULT_OSRM_URL.to_string(),
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            matching: MatchingConfig {
                max_dist_m: 15.0,
                chunk_size: DEFAULT_CHUNK_SIZE,
            },
            costing: CostingConfig {
                max_dist_m: 50.0,
                prices: PriceTable::default(),
                traffic: TrafficMultipliers::planner_defaults(),
            },
        }
    }
}

impl Config {
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::raw().only(&LEGACY_ENV))
            .merge(Env::prefixed("ROADSTATE_").split("__"))
    }

    /// Defaults, then the TOML file if it exists, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        Self::figment(path)
            .extract()
            .with_context(|| format!("Invalid configuration (file {})", path.display()))
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().context(
            "No database configured, set DATABASE_URL or database_url in roadstate.toml",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::Congestion;
    use crate::state::RoadState;
    use figment::Jail;

    #[test]
    fn defaults_without_file_or_env() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let config = Config::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            assert_eq!(config.costing.prices.price(RoadState::Fair), 0.70);
            assert_eq!(config.costing.traffic.factor(Congestion::Moderate), 1.2);
            assert_eq!(config.costing.traffic.factor(Congestion::Heavy), 1.5);
            assert_eq!(config.costing.traffic.factor(Congestion::Severe), 2.0);
            Ok(())
        });
    }

    #[test]
    fn file_then_env_override() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "roadstate.toml",
                r#"
                osrm_base_url = "http://osrm.local:5000"

                [server]
                port = 9000

                [costing.prices]
                "VERY POOR" = 1.5

                [costing.traffic]
                heavy = 1.8
                "#,
            )?;
            jail.set_env("ROADSTATE_SERVER__PORT", "9100");
            jail.set_env("MAPBOX_TOKEN", "pk.test");

            let config = Config::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.osrm_base_url, "http://osrm.local:5000");
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.mapbox_token.as_deref(), Some("pk.test"));
            assert_eq!(config.costing.prices.price(RoadState::VeryPoor), 1.5);
            assert_eq!(config.costing.prices.price(RoadState::Good), 0.50);
            assert_eq!(config.costing.traffic.factor(Congestion::Heavy), 1.8);
            assert_eq!(config.costing.traffic.factor(Congestion::Severe), 2.0);
            Ok(())
        });
    }

    #[test]
    fn prefixed_env_wins_over_legacy() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("API_BASE_URL", "http://legacy:8000");
            jail.set_env("ROADSTATE_API_BASE_URL", "http://new:8000");
            let config = Config::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.api_base_url, "http://new:8000");
            assert!(config.require_database_url().is_err());
            Ok(())
        });
    }
}
