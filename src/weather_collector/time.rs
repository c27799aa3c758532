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

//! Civil time for the monitoring network.
//!
//! Stations report in China Standard Time and every file name, row timestamp and
//! trailing window is computed at a fixed UTC+8 offset regardless of the timezone
//! of the host running the collector.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Offset of the station network from UTC, in seconds.
pub const UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Format of timestamps written to daily files and snapshots.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format of the day portion of daily file names.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

pub fn offset() -> FixedOffset {
    FixedOffset::east_opt(UTC_OFFSET_SECS).expect("UTC+8 is a valid offset")
}

/// Convert a UTC instant to station civil time.
pub fn local(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    instant.with_timezone(&offset())
}

pub fn now() -> DateTime<FixedOffset> {
    local(Utc::now())
}

/// Calendar day, in station civil time, that a UTC instant falls on.
pub fn day_key(instant: DateTime<Utc>) -> NaiveDate {
    local(instant).date_naive()
}

pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    local(instant).format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a row timestamp written by `format_timestamp` back into station civil time.
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()?;
    offset().from_local_datetime(&naive).single()
}

#[cfg(test)]
mod test {
    use super::{day_key, format_timestamp, parse_timestamp};
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_day_key_rolls_over_at_utc_sixteen() {
        let before = Utc.with_ymd_and_hms(2024, 3, 9, 15, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 9, 16, 0, 0).unwrap();

        assert_eq!(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(), day_key(before));
        assert_eq!(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(), day_key(after));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 23, 5, 7).unwrap();
        let formatted = format_timestamp(instant);
        assert_eq!("2024-03-10 07:05:07", formatted);
        assert_eq!(instant, parse_timestamp(&formatted).unwrap());
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
