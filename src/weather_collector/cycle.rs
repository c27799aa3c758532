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

use crate::client::{ClientError, FailureKind, TelemetryClient};
use crate::metrics::CollectorMetrics;
use crate::reading::Reading;
use crate::stations::{Station, StationRegistry};
use crate::store::{Store, StoreError};
use crate::time;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Instrument;

/// Default pause after each station request so the upstream isn't hammered.
pub const DEFAULT_STATION_DELAY: Duration = Duration::from_millis(500);

/// Reason a single station failed during a cycle.
#[derive(Debug, Error)]
pub enum StationError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Client(e) => e.kind(),
            Self::Store(_) => FailureKind::Store,
        }
    }
}

/// Outcome of one collection cycle across every station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub success_count: usize,
    /// Display names of stations that failed, in registry order
    pub failed_stations: Vec<String>,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.success_count + self.failed_stations.len()
    }

    /// True if no station produced a stored reading.
    pub fn all_failed(&self) -> bool {
        self.success_count == 0
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} stations succeeded", self.success_count, self.total())
    }
}

/// Runs collection cycles: one request and at most one stored reading per station.
#[derive(Debug)]
pub struct Collector {
    client: TelemetryClient,
    store: Store,
    stations: StationRegistry,
    delay: Duration,
    metrics: Option<Arc<CollectorMetrics>>,
}

impl Collector {
    pub fn new(client: TelemetryClient, store: Store, stations: StationRegistry) -> Self {
        Collector {
            client,
            store,
            stations,
            delay: DEFAULT_STATION_DELAY,
            metrics: None,
        }
    }

    /// Set the pause inserted after every station request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CollectorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn stations(&self) -> &StationRegistry {
        &self.stations
    }

    /// Collect a reading from every station in registry order.
    ///
    /// Failures are isolated to the station they happen for: they are logged,
    /// counted, and collection moves on to the next station.
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::default();
        tracing::info!(message = "starting collection cycle", stations = self.stations.len());

        for station in self.stations.iter() {
            let span = tracing::info_span!("station", id = station.id());
            match self.collect(station).instrument(span).await {
                Ok(()) => report.success_count += 1,
                Err(e) => {
                    self.log_failure(station, &e);
                    if let Some(m) = &self.metrics {
                        m.failure(station, e.kind());
                    }
                    report.failed_stations.push(station.name().to_owned());
                }
            }

            tokio::time::sleep(self.delay).await;
        }

        if let Some(m) = &self.metrics {
            m.cycle(start.elapsed());
        }

        tracing::info!(
            message = "finished collection cycle",
            succeeded = report.success_count,
            total = report.total(),
            elapsed_ms = start.elapsed().as_millis() as u64,
        );

        report
    }

    async fn collect(&self, station: &Station) -> Result<(), StationError> {
        let raw = self.client.observation(station).await?;

        let now = Utc::now();
        let reading = Reading::from_raw(time::format_timestamp(now), &raw);
        self.store.append(station.id(), time::day_key(now), &reading)?;

        tracing::info!(
            message = "stored reading",
            station = station.id(),
            name = station.name(),
            timestamp = %reading.timestamp,
            wind_speed = ?reading.wind_speed,
            rainfall = ?reading.rainfall,
            humidity = ?reading.humidity,
            temperature = ?reading.temperature,
            pressure = ?reading.pressure,
            visibility = ?reading.visibility,
        );

        if let Some(m) = &self.metrics {
            m.success(station, &reading, now);
        }

        Ok(())
    }

    fn log_failure(&self, station: &Station, e: &StationError) {
        match e.kind() {
            FailureKind::Store => tracing::error!(
                message = "failed to store reading",
                station = station.id(),
                name = station.name(),
                kind = %e.kind(),
                error = %e,
            ),
            kind => tracing::warn!(
                message = "failed to collect reading",
                station = station.id(),
                name = station.name(),
                kind = %kind,
                error = %e,
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::CycleReport;

    #[test]
    fn test_report_totals() {
        let report = CycleReport {
            success_count: 11,
            failed_stations: vec!["闵行".to_owned(), "宝山".to_owned()],
        };

        assert_eq!(13, report.total());
        assert!(!report.all_failed());
        assert_eq!("11/13 stations succeeded", report.to_string());
    }

    #[test]
    fn test_report_all_failed() {
        let report = CycleReport {
            success_count: 0,
            failed_stations: vec!["徐家汇".to_owned()],
        };

        assert!(report.all_failed());
    }
}
