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

use crate::client::FailureKind;
use crate::reading::Reading;
use crate::stations::Station;
use chrono::{DateTime, Utc};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct StationLabels {
    station: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FailureLabels {
    station: String,
    kind: String,
}

type FloatGauge = Gauge<f64, AtomicU64>;

/// Holder for metrics about collection cycles and the readings they produce.
///
/// All metrics are created and registered upon call to `CollectorMetrics::new()`.
/// Per-station metrics have a "station" label set to the numeric station ID.
#[derive(Debug, Default)]
pub struct CollectorMetrics {
    cycles: Counter,
    cycle_duration: FloatGauge,
    successes: Family<StationLabels, Counter>,
    failures: Family<FailureLabels, Counter>,
    last_success: Family<StationLabels, FloatGauge>,
    temperature: Family<StationLabels, FloatGauge>,
    relative_humidity: Family<StationLabels, FloatGauge>,
    pressure: Family<StationLabels, FloatGauge>,
    wind_speed: Family<StationLabels, FloatGauge>,
}

impl CollectorMetrics {
    /// Create a new `CollectorMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let metrics = Self::default();

        reg.register("cycles", "Collection cycles run", metrics.cycles.clone());
        reg.register(
            "cycle_duration_seconds",
            "Duration of the most recent collection cycle",
            metrics.cycle_duration.clone(),
        );
        reg.register(
            "station_success",
            "Readings fetched and stored per station",
            metrics.successes.clone(),
        );
        reg.register(
            "station_failures",
            "Failed collection attempts per station by kind of failure",
            metrics.failures.clone(),
        );
        reg.register(
            "last_success_timestamp_seconds",
            "Unix timestamp of the most recent stored reading",
            metrics.last_success.clone(),
        );
        reg.register(
            "temperature_degrees",
            "Temperature in celsius",
            metrics.temperature.clone(),
        );
        reg.register(
            "relative_humidity",
            "Relative humidity (0-100)",
            metrics.relative_humidity.clone(),
        );
        reg.register(
            "pressure_hectopascals",
            "Pressure in hectopascals",
            metrics.pressure.clone(),
        );
        reg.register(
            "wind_speed_meters_per_second",
            "Wind speed in meters per second",
            metrics.wind_speed.clone(),
        );

        metrics
    }

    pub fn cycle(&self, elapsed: Duration) {
        self.cycles.inc();
        self.cycle_duration.set(elapsed.as_secs_f64());
    }

    /// Record a stored reading, updating value gauges only for values that exist.
    pub fn success(&self, station: &Station, reading: &Reading, at: DateTime<Utc>) {
        let labels = StationLabels {
            station: station.id().to_owned(),
        };

        self.successes.get_or_create(&labels).inc();
        self.last_success
            .get_or_create(&labels)
            .set(at.timestamp_millis() as f64 / 1000.0);

        set_from_value(&self.temperature, &labels, reading.temperature);
        set_from_value(&self.relative_humidity, &labels, reading.humidity);
        set_from_value(&self.pressure, &labels, reading.pressure);
        set_from_value(&self.wind_speed, &labels, reading.wind_speed);
    }

    pub fn failure(&self, station: &Station, kind: FailureKind) {
        let labels = FailureLabels {
            station: station.id().to_owned(),
            kind: kind.as_str().to_owned(),
        };

        self.failures.get_or_create(&labels).inc();
    }
}

fn set_from_value(family: &Family<StationLabels, FloatGauge>, labels: &StationLabels, value: Option<f64>) {
    if let Some(v) = value {
        family.get_or_create(labels).set(v);
    }
}

#[cfg(test)]
mod test {
    use super::CollectorMetrics;
    use crate::client::FailureKind;
    use crate::reading::Reading;
    use crate::stations::StationRegistry;
    use chrono::{TimeZone, Utc};
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;
    use std::time::Duration;

    #[test]
    fn test_metrics_text() {
        let mut registry = Registry::with_prefix("weather_collector");
        let metrics = CollectorMetrics::new(&mut registry);
        let stations = StationRegistry::shanghai();
        let xujiahui = stations.get("58367").unwrap();
        let minhang = stations.get("58361").unwrap();

        let reading = Reading {
            timestamp: "2024-03-10 07:05:00".to_owned(),
            temperature: Some(21.5),
            ..Default::default()
        };

        metrics.cycle(Duration::from_millis(1500));
        metrics.success(xujiahui, &reading, Utc.with_ymd_and_hms(2024, 3, 9, 23, 5, 0).unwrap());
        metrics.failure(minhang, FailureKind::Store);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(buf.contains("weather_collector_cycles_total 1"));
        assert!(buf.contains("weather_collector_cycle_duration_seconds 1.5"));
        assert!(buf.contains(r#"weather_collector_station_success_total{station="58367"} 1"#));
        assert!(buf.contains(r#"weather_collector_station_failures_total{station="58361",kind="store"} 1"#));
        assert!(buf.contains(r#"weather_collector_temperature_degrees{station="58367"} 21.5"#));
        assert!(!buf.contains(r#"weather_collector_relative_humidity{station="58367"}"#));
    }
}
