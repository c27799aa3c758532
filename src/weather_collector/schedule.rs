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

//! Wall clock aligned scheduling of collection cycles.
//!
//! Cycles run at fixed minutes past every hour rather than at a fixed interval
//! from each other. The delay to the next tick is recomputed from the current
//! time after every cycle so the time spent collecting never accumulates as drift.

use crate::cycle::Collector;
use crate::time::{self, TIMESTAMP_FORMAT};
use chrono::{DateTime, FixedOffset, Timelike};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Every five minutes, offset three minutes from the top of the hour.
pub const DEFAULT_TICK_MINUTES: [u32; 12] = [3, 8, 13, 18, 23, 28, 33, 38, 43, 48, 53, 58];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("at least one tick minute is required")]
    Empty,

    #[error("invalid tick minute {0}, must be between 0 and 59")]
    InvalidMinute(u32),
}

/// Set of minutes past the hour at which collection cycles run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSchedule {
    minutes: Vec<u32>,
}

impl TickSchedule {
    pub fn new(minutes: &[u32]) -> Result<Self, ScheduleError> {
        if let Some(m) = minutes.iter().find(|&&m| m > 59) {
            return Err(ScheduleError::InvalidMinute(*m));
        }

        let mut minutes = minutes.to_vec();
        minutes.sort_unstable();
        minutes.dedup();

        if minutes.is_empty() {
            return Err(ScheduleError::Empty);
        }

        Ok(TickSchedule { minutes })
    }

    pub fn minutes(&self) -> &[u32] {
        &self.minutes
    }

    /// Time from `now` until the next tick.
    ///
    /// The next tick is the first listed minute strictly after the current minute,
    /// wrapping to the first listed minute of the next hour. Sub-second precision
    /// of `now` is ignored.
    pub fn next_delay<T: Timelike>(&self, now: &T) -> Duration {
        let minute = now.minute();
        let second = now.second();

        let wait = match self.minutes.iter().find(|&&m| m > minute) {
            Some(next) => next - minute,
            None => 60 - minute + self.minutes[0],
        };

        Duration::from_secs(u64::from(wait * 60 - second))
    }
}

impl Default for TickSchedule {
    fn default() -> Self {
        TickSchedule {
            minutes: DEFAULT_TICK_MINUTES.to_vec(),
        }
    }
}

/// Re-arming loop that runs a collection cycle at every tick of a schedule.
#[derive(Debug)]
pub struct Scheduler {
    schedule: TickSchedule,
    next_wake: Option<DateTime<FixedOffset>>,
}

impl Scheduler {
    pub fn new(schedule: TickSchedule) -> Self {
        Scheduler {
            schedule,
            next_wake: None,
        }
    }

    /// When the loop will next wake up, if it is running or has run.
    pub fn next_wake(&self) -> Option<DateTime<FixedOffset>> {
        self.next_wake
    }

    /// Run collection cycles at each tick until `shutdown` resolves.
    ///
    /// Shutdown is only observed while waiting for the next tick. A cycle that
    /// has started always runs every station to completion. Ticks missed while
    /// a cycle was running, or while the process was down, are not replayed.
    pub async fn run<F>(&mut self, collector: &Collector, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let now = time::now();
            let delay = self.schedule.next_delay(&now);
            let wake = now + chrono::Duration::milliseconds(delay.as_millis() as i64);
            self.next_wake = Some(wake);

            tracing::info!(
                message = "next collection scheduled",
                at = %wake.format(TIMESTAMP_FORMAT),
                delay_secs = delay.as_secs(),
            );

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("collection scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let report = collector.run_cycle().await;
            if report.all_failed() {
                tracing::error!(message = "every station failed", failed = ?report.failed_stations);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ScheduleError, Scheduler, TickSchedule};
    use crate::client::TelemetryClient;
    use crate::cycle::Collector;
    use crate::stations::StationRegistry;
    use crate::store::Store;
    use chrono::NaiveTime;
    use std::time::Duration;

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_next_delay_mid_interval() {
        let schedule = TickSchedule::default();
        // 12:07:30 -> 12:13:00
        assert_eq!(Duration::from_millis(330_000), schedule.next_delay(&at(12, 7, 30)));
    }

    #[test]
    fn test_next_delay_wraps_hour() {
        let schedule = TickSchedule::default();
        // 12:58:10 -> 13:03:00
        assert_eq!(Duration::from_millis(290_000), schedule.next_delay(&at(12, 58, 10)));
        // 23:59:59 -> 00:03:00
        assert_eq!(Duration::from_secs(181), schedule.next_delay(&at(23, 59, 59)));
    }

    #[test]
    fn test_next_delay_on_tick_minute() {
        let schedule = TickSchedule::default();
        // A cycle that finished within its own tick minute waits for the next one
        assert_eq!(Duration::from_secs(300), schedule.next_delay(&at(12, 8, 0)));
        assert_eq!(Duration::from_secs(295), schedule.next_delay(&at(12, 8, 5)));
    }

    #[test]
    fn test_next_delay_before_first_tick() {
        let schedule = TickSchedule::default();
        assert_eq!(Duration::from_secs(180), schedule.next_delay(&at(0, 0, 0)));
    }

    #[test]
    fn test_single_minute_schedule() {
        let schedule = TickSchedule::new(&[30]).unwrap();
        assert_eq!(Duration::from_secs(3600), schedule.next_delay(&at(9, 30, 0)));
        assert_eq!(Duration::from_secs(60), schedule.next_delay(&at(9, 29, 0)));
    }

    #[test]
    fn test_new_sorts_and_validates() {
        let schedule = TickSchedule::new(&[45, 15, 15]).unwrap();
        assert_eq!(&[15, 45], schedule.minutes());

        assert_eq!(ScheduleError::Empty, TickSchedule::new(&[]).unwrap_err());
        assert_eq!(ScheduleError::InvalidMinute(60), TickSchedule::new(&[0, 60]).unwrap_err());
    }

    #[tokio::test]
    async fn test_run_stops_before_collecting() {
        let client = TelemetryClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/service.do".parse().unwrap(),
        );
        let dir = tempfile::TempDir::new().unwrap();
        let collector = Collector::new(client, Store::new(dir.path()), StationRegistry::shanghai());

        let mut scheduler = Scheduler::new(TickSchedule::default());
        assert!(scheduler.next_wake().is_none());

        let before = crate::time::now();
        scheduler.run(&collector, async {}).await;

        let wake = scheduler.next_wake().unwrap();
        assert!(wake > before);
        assert!(wake - before <= chrono::Duration::minutes(5));
        assert_eq!(0, std::fs::read_dir(dir.path()).unwrap().count());
    }
}
