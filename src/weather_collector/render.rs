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

//! Aggregation of stored readings into a single snapshot for the dashboard.
//!
//! Rendering is a pure function of the files in the store and the current time.
//! It never touches the network and never modifies the store, so it's safe to
//! run while a collection cycle is appending to the same files.

use crate::reading::Reading;
use crate::stations::StationRegistry;
use crate::store::Store;
use crate::time;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("storage directory {0} does not exist")]
    MissingStore(PathBuf),

    #[error("unable to write {0}: {1}")]
    Io(PathBuf, #[source] io::Error),

    #[error("unable to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Longest window a snapshot covers. Larger windows are clamped to it.
pub const MAX_WINDOW_DAYS: u32 = 3660;

/// How much history to include in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Every reading in the daily files of the last N calendar days, today included.
    Days(u32),
    /// Readings with a timestamp no older than N hours.
    Hours(u32),
}

impl Window {
    /// Calendar days whose files may contain readings in the window, oldest first.
    fn days(&self, now: DateTime<FixedOffset>) -> Vec<NaiveDate> {
        let today = now.date_naive();
        let first = match self {
            Self::Days(0) => return Vec::new(),
            Self::Days(n) => {
                let back = Duration::days(i64::from((*n).min(MAX_WINDOW_DAYS)) - 1);
                today.checked_sub_signed(back).unwrap_or(NaiveDate::MIN)
            }
            Self::Hours(_) => self.cutoff(now).map(|c| c.date_naive()).unwrap_or(today),
        };

        first.iter_days().take_while(|d| *d <= today).collect()
    }

    fn cutoff(&self, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Days(_) => None,
            Self::Hours(h) => {
                let back = Duration::hours(i64::from(*h).min(i64::from(MAX_WINDOW_DAYS) * 24));
                now.checked_sub_signed(back)
            }
        }
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::Days(7)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StationInfo {
    pub name: String,
    pub color: String,
}

/// Point in time view of recent readings across all stations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub update_time: String,
    pub stations: BTreeMap<String, StationInfo>,
    /// Readings per station ID, ascending by timestamp
    pub data: BTreeMap<String, Vec<Reading>>,
}

impl Snapshot {
    /// Total number of readings across every station.
    pub fn data_points(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}

#[derive(Debug)]
pub struct Aggregator<'a> {
    store: &'a Store,
    stations: &'a StationRegistry,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a Store, stations: &'a StationRegistry) -> Self {
        Aggregator { store, stations }
    }

    /// Build a snapshot of every station's readings within `window` of `now`.
    ///
    /// Fails only when the storage directory itself is missing. Unreadable files
    /// and rows contribute nothing.
    pub fn render(&self, window: Window, now: DateTime<Utc>) -> Result<Snapshot, RenderError> {
        if !self.store.dir().is_dir() {
            return Err(RenderError::MissingStore(self.store.dir().to_path_buf()));
        }

        let local = time::local(now);
        let days = window.days(local);
        let cutoff = window.cutoff(local);

        let mut snapshot = Snapshot {
            update_time: time::format_timestamp(now),
            stations: BTreeMap::new(),
            data: BTreeMap::new(),
        };

        for station in self.stations.iter() {
            let mut series = Vec::new();
            let mut skipped = 0;

            for day in &days {
                let rows = self.store.read_day(station.id(), *day);
                skipped += rows.skipped;

                for reading in rows.readings {
                    let Some(ts) = time::parse_timestamp(&reading.timestamp) else {
                        tracing::warn!(
                            message = "dropping reading with invalid timestamp",
                            station = station.id(),
                            timestamp = %reading.timestamp,
                        );
                        skipped += 1;
                        continue;
                    };

                    if cutoff.map_or(true, |c| ts >= c) {
                        series.push((ts, reading));
                    }
                }
            }

            series.sort_by_key(|(ts, _)| *ts);
            tracing::debug!(
                message = "aggregated station readings",
                station = station.id(),
                readings = series.len(),
                skipped = skipped,
            );

            snapshot.stations.insert(
                station.id().to_owned(),
                StationInfo {
                    name: station.name().to_owned(),
                    color: station.color().to_owned(),
                },
            );
            snapshot
                .data
                .insert(station.id().to_owned(), series.into_iter().map(|(_, r)| r).collect());
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod test {
    use super::{Window, MAX_WINDOW_DAYS};
    use chrono::{NaiveDate, TimeZone};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_window_days() {
        let now = crate::time::offset().with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();

        assert_eq!(vec![date(8), date(9), date(10)], Window::Days(3).days(now));
        assert_eq!(vec![date(10)], Window::Days(1).days(now));
        assert!(Window::Days(0).days(now).is_empty());
        assert!(Window::Days(7).cutoff(now).is_none());
    }

    #[test]
    fn test_window_hours() {
        let now = crate::time::offset().with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();

        assert_eq!(vec![date(9), date(10)], Window::Hours(24).days(now));
        assert_eq!(vec![date(10)], Window::Hours(2).days(now));
        assert_eq!(
            crate::time::offset().with_ymd_and_hms(2024, 3, 9, 9, 0, 0).unwrap(),
            Window::Hours(24).cutoff(now).unwrap()
        );
    }

    #[test]
    fn test_window_clamped() {
        let now = crate::time::offset().with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();

        let days = Window::Days(u32::MAX).days(now);
        assert_eq!(MAX_WINDOW_DAYS as usize, days.len());
        assert_eq!(Some(&date(10)), days.last());

        let cutoff = Window::Hours(u32::MAX).cutoff(now).unwrap();
        assert_eq!(now - chrono::Duration::days(i64::from(MAX_WINDOW_DAYS)), cutoff);
        assert_eq!(MAX_WINDOW_DAYS as usize + 1, Window::Hours(u32::MAX).days(now).len());
    }
}
