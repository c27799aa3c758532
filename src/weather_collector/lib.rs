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

//! Collector and dashboard renderer for Shanghai weather station telemetry
//!
//! ## Features
//!
//! `weather_collector` polls the live observation endpoint of the Shanghai
//! meteorological service for a fixed set of 13 monitoring stations and appends
//! each reading to a per-station, per-day CSV file. A separate renderer turns
//! recent files into a single JSON snapshot and a static dashboard page with
//! charts for temperature, humidity, wind speed, pressure, rainfall and visibility.
//!
//! * Collection runs at minutes 3, 8, 13, ... 58 of every hour.
//! * A failing station never prevents the other stations from being collected.
//! * Daily files are append-only: `weather_{station}_{YYYY-MM-DD}.csv` with the day
//!   computed in UTC+8 regardless of the host timezone.
//! * Prometheus metrics about collection are exposed on port `9783` at `/metrics`.
//!
//! ## Build
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Collecting
//!
//! Run the collector as a long running process. It collects once at start up and
//! then at every scheduled tick until it receives `SIGTERM` or `SIGINT`.
//!
//! ```text
//! ./weather_collector --data-dir /var/lib/weather_collector
//! ```
//!
//! To run a single cycle, for example from an external scheduler, use `--once`.
//! The process exits with status `1` if every station failed.
//!
//! ```text
//! ./weather_collector --data-dir /var/lib/weather_collector --once
//! ```
//!
//! ### Rendering
//!
//! Generate the dashboard from the last seven days of readings:
//!
//! ```text
//! ./weather_render --data-dir /var/lib/weather_collector --output-dir /var/www/weather
//! ```
//!
//! Refresh only the JSON with the last 24 hours, which the dashboard polls every
//! five minutes:
//!
//! ```text
//! ./weather_render --data-dir /var/lib/weather_collector --output-dir /var/www/weather --window-hours 24 --json-only
//! ```
//!

pub mod client;
pub mod cycle;
pub mod http;
pub mod metrics;
pub mod reading;
pub mod render;
pub mod schedule;
pub mod site;
pub mod stations;
pub mod store;
pub mod time;
