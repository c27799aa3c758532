// weather_collector - Collector and dashboard renderer for weather station telemetry
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::watch;
use tracing::{Instrument, Level};
use weather_collector::client::TelemetryClient;
use weather_collector::cycle::Collector;
use weather_collector::http::RequestContext;
use weather_collector::metrics::CollectorMetrics;
use weather_collector::schedule::{Scheduler, TickSchedule};
use weather_collector::stations::StationRegistry;
use weather_collector::store::Store;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9783);
const DEFAULT_TIMEOUT_MILLIS: u64 = 10_000;
const DEFAULT_DELAY_MILLIS: u64 = 500;
const DEFAULT_DATA_DIR: &str = "weather_data";
const DEFAULT_API_URL: &str = "http://ztq.soweather.com:8096/ztq_sh_jc/service.do";

#[derive(Debug, Parser)]
#[clap(name = "weather_collector", version = clap::crate_version!())]
struct WeatherCollectorApplication {
    /// URL of the observation service
    #[clap(long, default_value = DEFAULT_API_URL)]
    api_url: Url,

    /// Directory to append daily station files to. Created if it doesn't exist.
    #[clap(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Station ID to collect. May be repeated. All stations are collected by default.
    #[clap(long)]
    station: Vec<String>,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for each station request, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Pause after each station request, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_DELAY_MILLIS)]
    delay_millis: u64,

    /// Run a single collection cycle and exit. Exits with status 1 if every station failed.
    #[clap(long)]
    once: bool,

    /// Address to bind to for serving metrics. By default, weather_collector will bind to
    /// public address since the purpose is to expose metrics to an external system.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = WeatherCollectorApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let stations = StationRegistry::shanghai().select(&opts.station).unwrap_or_else(|e| {
        tracing::error!(message = "invalid station provided", error = %e);
        process::exit(1)
    });

    let store = Store::new(&opts.data_dir);
    store.create_dir().unwrap_or_else(|e| {
        tracing::error!(message = "unable to create data directory", error = %e);
        process::exit(1)
    });

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let schedule = TickSchedule::default();
    tracing::info!(
        message = "weather collector starting",
        data_dir = %opts.data_dir.display(),
        api_url = %opts.api_url,
        tick_minutes = ?schedule.minutes(),
        timezone = "UTC+8",
    );
    for station in stations.iter() {
        tracing::info!(message = "monitoring station", id = station.id(), name = station.name());
    }

    let mut registry = Registry::with_prefix("weather_collector");
    let metrics = Arc::new(CollectorMetrics::new(&mut registry));
    let client = TelemetryClient::new(http_client, opts.api_url.clone());
    let collector = Collector::new(client, store, stations)
        .with_delay(Duration::from_millis(opts.delay_millis))
        .with_metrics(metrics);

    if opts.once {
        let report = collector
            .run_cycle()
            .instrument(tracing::span!(Level::INFO, "collection_cycle"))
            .await;

        tracing::info!(message = "collection finished", result = %report, failed = ?report.failed_stations);
        if report.all_failed() {
            process::exit(1);
        }

        return Ok(());
    }

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let collection = tokio::spawn(async move {
        // Collect right away rather than waiting up to five minutes for the first tick
        let report = collector
            .run_cycle()
            .instrument(tracing::span!(Level::INFO, "collection_cycle"))
            .await;
        tracing::info!(message = "initial collection finished", result = %report);

        let mut scheduler = Scheduler::new(schedule);
        scheduler
            .run(&collector, async move {
                let _ = stop_rx.changed().await;
            })
            .await;
    });

    let context = Arc::new(RequestContext::new(registry));
    let app = weather_collector::http::router(context);
    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %opts.bind);
    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    // An in-progress cycle runs to completion before the scheduler observes this
    let _ = stop_tx.send(true);
    collection.await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
