//! Vessel weather poller.
//!
//! Polls OpenWeather for the vessel's position on a fixed interval with:
//! - Geohash-keyed response cache shared with on-demand queries
//! - Bounded retry for failed fetches and for a missing position
//! - Watchdog that halts a misbehaving wake timer
//! - HTTP API for queries, position updates and status

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use geo_cache::GeoCache;
use openweather_client::{ClientConfig, OpenWeatherClient};
use weather_common::SystemClock;
use weather_poller::config::WeatherConfig;
use weather_poller::gateway::FetchGateway;
use weather_poller::host::{LatestDeltas, LogStatusSink, SharedPosition};
use weather_poller::provider::WeatherProvider;
use weather_poller::scheduler::{Poller, PollerContext};
use weather_poller::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "weather-poller")]
#[command(about = "Vessel weather poller with geospatial response cache")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "WEATHER_CONFIG", default_value = "config/weather.yaml")]
    config: PathBuf,

    /// OpenWeather API key (overrides the config file)
    #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Address for the HTTP API
    #[arg(long, env = "WEATHER_LISTEN_ADDR", default_value = "0.0.0.0:8090")]
    listen: SocketAddr,

    /// Directory for the on-disk cache copy (overrides the config file)
    #[arg(long, env = "WEATHER_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Log level, used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Serve on-demand queries only, even if the config enables polling
    #[arg(long)]
    no_poller: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!("Starting vessel weather poller");

    let mut config = WeatherConfig::load(&args.config)?;
    if let Some(api_key) = args.api_key {
        config.api_key = api_key;
    }
    if let Some(dir) = args.cache_dir {
        config.cache.dir = Some(dir);
    }
    config.validate().context("Invalid configuration")?;

    info!(
        poll_interval_minutes = config.poll_interval_minutes.minutes(),
        enable = config.enable,
        precision = config.cache.precision,
        "Configuration loaded"
    );

    let cache = Arc::new(
        GeoCache::open(config.cache_config(), Arc::new(SystemClock))
            .await
            .context("Failed to create cache")?,
    );
    let client = OpenWeatherClient::new(ClientConfig::new(config.api_key.clone()))
        .context("Failed to create OpenWeather client")?;
    let gateway = Arc::new(FetchGateway::new(cache.clone(), Arc::new(client)));

    let position = Arc::new(SharedPosition::new(config.position));
    let deltas = Arc::new(LatestDeltas::default());

    let poller = Arc::new(Poller::new(
        PollerContext {
            gateway: gateway.clone(),
            positions: position.clone(),
            deltas: deltas.clone(),
            status: Arc::new(LogStatusSink),
        },
        config.scheduler_config(),
    )?);

    if config.enable && !args.no_poller {
        poller.start().await;
    } else {
        info!("Polling disabled, serving on-demand queries only");
    }

    let state = Arc::new(AppState {
        provider: WeatherProvider::new(gateway),
        poller: poller.clone(),
        position,
        deltas,
        cache,
        metrics: Some(prometheus),
    });

    server::run_server(state, args.listen, shutdown_signal()).await?;

    poller.stop().await;
    info!("Weather poller shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
}
