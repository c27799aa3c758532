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

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::process;
use tracing::Level;
use weather_collector::render::{Aggregator, Window, MAX_WINDOW_DAYS};
use weather_collector::site;
use weather_collector::stations::StationRegistry;
use weather_collector::store::Store;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_DATA_DIR: &str = "weather_data";
const DEFAULT_OUTPUT_DIR: &str = "public";
const DEFAULT_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Parser)]
#[clap(name = "weather_render", version = clap::crate_version!())]
struct WeatherRenderApplication {
    /// Directory containing daily station files written by weather_collector
    #[clap(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Directory to write index.html and data/weather_data.json to
    #[clap(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Include readings from this many calendar days, today included
    #[clap(long, default_value_t = DEFAULT_WINDOW_DAYS, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_WINDOW_DAYS)))]
    window_days: u32,

    /// Include readings from this many trailing hours instead of whole days
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_WINDOW_DAYS) * 24))]
    window_hours: Option<u32>,

    /// Only refresh data/weather_data.json, leaving index.html alone
    #[clap(long)]
    json_only: bool,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = WeatherRenderApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let window = match opts.window_hours {
        Some(h) => Window::Hours(h),
        None => Window::Days(opts.window_days),
    };

    let store = Store::new(&opts.data_dir);
    let stations = StationRegistry::shanghai();
    tracing::info!(message = "collecting readings", data_dir = %opts.data_dir.display(), window = ?window);

    let snapshot = Aggregator::new(&store, &stations)
        .render(window, Utc::now())
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to aggregate readings", error = %e);
            process::exit(1)
        });

    let json = site::write_json(&opts.output_dir, &snapshot)?;
    tracing::info!(message = "wrote snapshot", path = %json.display());

    if !opts.json_only {
        let page = site::write_page(&opts.output_dir, &snapshot)?;
        tracing::info!(message = "wrote dashboard", path = %page.display());
    }

    tracing::info!(
        message = "render complete",
        output_dir = %opts.output_dir.display(),
        data_points = snapshot.data_points(),
    );

    Ok(())
}
