use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::{LevelFilter, info, warn};
use migration::{Migrator, MigratorTrait};

use roadstate::client::RoadStateClient;
use roadstate::config::Config;
use roadstate::cost::RouteCoster;
use roadstate::io::{
    PathColumns, find_latest_route_csv, load_route_csv, read_matched_csv, read_roadlab_path,
    read_roadlab_roughness, save_route_csv, write_matched_csv,
};
use roadstate::map_render::{matched_track_map, route_condition_map, route_preview_map};
use roadstate::roughness_join::{MatchedPathPoint, join_nearest};
use roadstate::segment_state::SegmentStateIndex;
use roadstate::server;
use roadstate::services::{
    Geocoder, MapMatcher, MapboxDirections, MapboxMatcher, MatchInput, OsrmClient, OsrmMatcher,
    match_track,
};
use roadstate::store::{TrackPointStore, import_matched_csv};

#[derive(Parser)]
#[command(name = "roadstate")]
#[command(about = "Road condition mapping, route costing and the road state API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum MatchService {
    Osrm,
    Mapbox,
}

#[derive(Subcommand)]
enum Commands {
    /// Geocode two addresses and save the OSRM route as CSV
    Plan {
        start: String,
        end: String,

        /// Directory for the route CSV
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Cost the route through two or more addresses and draw it
    Route {
        /// Start, optional intermediate stops, destination
        #[arg(required = true, num_args = 2..)]
        addresses: Vec<String>,

        /// Ask Mapbox for alternative routes
        #[arg(long, conflicts_with = "osrm")]
        alternatives: bool,

        /// Use OSRM without traffic instead of Mapbox
        #[arg(long)]
        osrm: bool,

        /// Price override as STATE=EUR_PER_KM, e.g. "FAIR=0,75"
        #[arg(long = "price")]
        prices: Vec<String>,

        /// Traffic factor override as LEVEL=FACTOR, e.g. "heavy=1,8"
        #[arg(long = "traffic")]
        traffic: Vec<String>,

        #[arg(short, long, default_value = "route_map.html")]
        output: PathBuf,
    },

    /// Draw a saved route colored by nearby measured road states
    Preview {
        /// Route CSV; the newest route_matched_*/route_* file is used if omitted
        csv: Option<PathBuf>,

        /// Directories searched for route CSVs
        #[arg(long = "search-dir", default_values = [".", ".."])]
        search_dirs: Vec<PathBuf>,

        #[arg(short, long, default_value = "route_preview.html")]
        output: PathBuf,
    },

    /// Map-match a RoadLab Pro path export and attach roughness
    Match {
        path_csv: PathBuf,
        roughness_csv: PathBuf,

        #[arg(long, value_enum, default_value = "osrm")]
        service: MatchService,

        /// Output CSV, defaults to <path_csv>_matched.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Draw a matched CSV colored by roughness
    ViewMatched {
        csv: PathBuf,

        #[arg(short, long, default_value = "matched_track_with_iri_segments.html")]
        output: PathBuf,
    },

    /// Replace the track_point table with the rows of a matched CSV
    Import { csv: PathBuf },

    /// Print row count, sample rows and roughness distribution
    Check {
        #[arg(long, default_value = "5")]
        limit: u64,
    },

    /// Save all points of the road state API as JSON
    Backup {
        #[arg(default_value = "track_point_backup.json")]
        path: PathBuf,
    },

    /// Delete all points through the road state API
    Wipe {
        /// Required, the deletion cannot be undone
        #[arg(long)]
        yes: bool,
    },

    /// Post every row of a backup file to the road state API
    Restore {
        #[arg(default_value = "track_point_backup.json")]
        path: PathBuf,
    },

    /// Run the road state API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan {
            start,
            end,
            out_dir,
        } => run_plan(&config, &start, &end, &out_dir).await,
        Commands::Route {
            addresses,
            alternatives,
            osrm,
            prices,
            traffic,
            output,
        } => {
            let options = RouteOptions {
                alternatives,
                osrm,
                price_overrides: prices,
                traffic_overrides: traffic,
            };
            run_route(&config, &addresses, &options, &output).await
        }
        Commands::Preview {
            csv,
            search_dirs,
            output,
        } => run_preview(&config, csv, &search_dirs, &output).await,
        Commands::Match {
            path_csv,
            roughness_csv,
            service,
            output,
        } => {
            let output = output.unwrap_or_else(|| matched_output_path(&path_csv));
            match service {
                MatchService::Osrm => {
                    let matcher = OsrmMatcher::new(&config.osrm_base_url)?;
                    run_match(&config, &matcher, &path_csv, &roughness_csv, &output).await
                }
                MatchService::Mapbox => {
                    let matcher = MapboxMatcher::new(
                        &config.mapbox_base_url,
                        config.mapbox_token.as_deref(),
                    )?;
                    run_match(&config, &matcher, &path_csv, &roughness_csv, &output).await
                }
            }
        }
        Commands::ViewMatched { csv, output } => {
            let rows = read_matched_csv(&csv)?;
            write_page(&output, &matched_track_map(&rows)?)
        }
        Commands::Import { csv } => {
            let rows = read_matched_csv(&csv)?;
            let store = open_store(&config).await?;
            let inserted = import_matched_csv(&store, &rows).await?;
            println!("{} rows imported", inserted);
            Ok(())
        }
        Commands::Check { limit } => run_check(&config, limit).await,
        Commands::Backup { path } => {
            let count = RoadStateClient::new(&config.api_base_url)?
                .backup(&path)
                .await?;
            println!("{} points saved to {}", count, path.display());
            Ok(())
        }
        Commands::Wipe { yes } => {
            if !yes {
                bail!("Refusing to delete all points without --yes");
            }
            let response = RoadStateClient::new(&config.api_base_url)?
                .delete_all()
                .await?;
            println!("{}", response);
            Ok(())
        }
        Commands::Restore { path } => {
            let ok = RoadStateClient::new(&config.api_base_url)?
                .restore(&path)
                .await?;
            println!("{} points restored", ok);
            Ok(())
        }
        Commands::Serve { host, port } => {
            let store = open_store(&config).await?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            server::serve(store, &host, port).await
        }
        Commands::Migrate => {
            let store = open_store(&config).await?;
            Migrator::up(store.connection(), None).await?;
            info!("Migrations applied");
            Ok(())
        }
    }
}

async fn open_store(config: &Config) -> Result<TrackPointStore> {
    TrackPointStore::connect(config.require_database_url()?).await
}

fn write_page(path: &Path, html: &str) -> Result<()> {
    std::fs::write(path, html).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Map saved to {}", path.display());
    Ok(())
}

fn matched_output_path(path_csv: &Path) -> PathBuf {
    let stem = path_csv
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string());
    path_csv.with_file_name(format!("{}_matched.csv", stem))
}

struct RouteOptions {
    alternatives: bool,
    osrm: bool,
    price_overrides: Vec<String>,
    traffic_overrides: Vec<String>,
}

async fn run_plan(config: &Config, start: &str, end: &str, out_dir: &Path) -> Result<()> {
    let geocoder = Geocoder::new(&config.mapbox_base_url, config.mapbox_token.as_deref())?;
    let from = geocoder.geocode(start).await?;
    let to = geocoder.geocode(end).await?;

    let route = OsrmClient::new(&config.osrm_base_url)?
        .route(&[from, to])
        .await?;
    let path = save_route_csv(out_dir, &route.coords)?;
    println!("{} points saved to {}", route.coords.len(), path.display());
    Ok(())
}

async fn run_route(
    config: &Config,
    addresses: &[String],
    options: &RouteOptions,
    output: &Path,
) -> Result<()> {
    let mut prices = config.costing.prices.clone();
    for raw in &options.price_overrides {
        prices.apply_override(raw)?;
    }
    let mut traffic = config.costing.traffic.clone();
    for raw in &options.traffic_overrides {
        traffic.apply_override(raw)?;
    }

    let geocoder = Geocoder::new(&config.mapbox_base_url, config.mapbox_token.as_deref())?;
    let mut waypoints = Vec::with_capacity(addresses.len());
    for address in addresses {
        waypoints.push(geocoder.geocode(address).await?);
    }

    let routes = if options.osrm {
        vec![OsrmClient::new(&config.osrm_base_url)?.route(&waypoints).await?]
    } else {
        MapboxDirections::new(&config.mapbox_base_url, config.mapbox_token.as_deref())?
            .routes(&waypoints, options.alternatives)
            .await?
    };

    let points = RoadStateClient::new(&config.api_base_url)?
        .db_points_or_empty()
        .await;
    let index = SegmentStateIndex::new(&points);

    let coster = RouteCoster {
        index: &index,
        prices: &prices,
        traffic: &traffic,
        max_dist_m: config.costing.max_dist_m,
    };
    let costs = coster.cost_routes(&routes)?;

    for (i, cost) in costs.iter().enumerate() {
        println!("Route {}", i + 1);
        for line in cost.summary_lines() {
            println!("{}", line);
        }
        println!();
    }

    write_page(output, &route_condition_map(&routes, &costs)?)
}

async fn run_preview(
    config: &Config,
    csv: Option<PathBuf>,
    search_dirs: &[PathBuf],
    output: &Path,
) -> Result<()> {
    let csv = match csv {
        Some(csv) => csv,
        None => find_latest_route_csv(search_dirs)?
            .ok_or_else(|| anyhow!("No route_matched_*.csv or route_*.csv found"))?,
    };
    info!("Using route file {}", csv.display());

    let coords = load_route_csv(&csv)?;
    if coords.is_empty() {
        bail!("No valid coordinates in {}", csv.display());
    }

    let points = RoadStateClient::new(&config.api_base_url)?
        .db_points_or_empty()
        .await;
    let index = SegmentStateIndex::new(&points);

    let (html, colored) = route_preview_map(&coords, &index, config.matching.max_dist_m)?;
    info!(
        "{} of {} segments have a measured state",
        colored,
        coords.len().saturating_sub(1)
    );
    write_page(output, &html)
}

async fn run_match<M: MapMatcher>(
    config: &Config,
    matcher: &M,
    path_csv: &Path,
    roughness_csv: &Path,
    output: &Path,
) -> Result<()> {
    let path = read_roadlab_path(path_csv, &PathColumns::default())?;
    if path.is_empty() {
        bail!("No valid GPS points in {}", path_csv.display());
    }
    let roughness = read_roadlab_roughness(roughness_csv)?;
    if roughness.is_empty() {
        warn!("No roughness rows in {}", roughness_csv.display());
    }

    let inputs: Vec<MatchInput> = path
        .iter()
        .map(|p| MatchInput {
            point: p.point,
            timestamp: p.timestamp,
        })
        .collect();
    let matched = match_track(matcher, &inputs, config.matching.chunk_size).await?;

    let matched_points: Vec<MatchedPathPoint> = path
        .iter()
        .zip(matched)
        .map(|(p, matched)| MatchedPathPoint {
            interval: p.interval,
            matched,
        })
        .collect();
    let unmatched = matched_points.iter().filter(|p| p.matched.is_none()).count();
    if unmatched > 0 {
        warn!("{} of {} points could not be matched", unmatched, matched_points.len());
    }

    let rows = join_nearest(matched_points, &roughness);
    write_matched_csv(output, &rows)?;
    println!("{} rows saved to {}", rows.len(), output.display());
    Ok(())
}

async fn run_check(config: &Config, limit: u64) -> Result<()> {
    let store = open_store(config).await?;

    println!("Rows in track_point: {}", store.count().await?);

    println!("\nSample rows:");
    for row in store.sample(limit).await? {
        println!(
            "{}: {:?}, {:?}, {:?}",
            row.id, row.lat_matched, row.lon_matched, row.roughness
        );
    }

    println!("\nRoughness distribution:");
    for (roughness, count) in store.roughness_distribution().await? {
        println!("{}: {}", roughness.as_deref().unwrap_or("<none>"), count);
    }
    Ok(())
}
