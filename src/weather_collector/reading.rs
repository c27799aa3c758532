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

use crate::client::RawReading;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One observation for one station at one instant.
///
/// Value fields are `None` when the upstream did not report them or reported
/// something that isn't a number. They're never defaulted to zero.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Reading {
    /// Collection time in station civil time, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    /// Degrees celsius
    pub temperature: Option<f64>,
    /// Relative humidity (0-100)
    pub humidity: Option<f64>,
    /// Meters per second
    pub wind_speed: Option<f64>,
    /// Wind direction as reported, either a bearing or a compass label
    pub wind_dir: Option<String>,
    /// Millimeters
    pub rainfall: Option<f64>,
    /// Hectopascals
    pub pressure: Option<f64>,
    /// Meters
    pub visibility: Option<f64>,
}

impl Reading {
    /// Build a reading collected at `timestamp` from the upstream fields.
    pub fn from_raw(timestamp: String, raw: &RawReading) -> Self {
        Reading {
            timestamp,
            temperature: number(&raw.ct),
            humidity: number(&raw.humidity),
            wind_speed: number(&raw.wind_speed),
            wind_dir: text(&raw.wind_dir),
            rainfall: number(&raw.rainfall),
            pressure: number(&raw.vaporpressuser),
            visibility: number(&raw.visibility),
        }
    }
}

/// Parse a numeric cell, treating blank, unparseable and non-finite values as absent.
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn number(v: &Option<Value>) -> Option<f64> {
    match v {
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
        Some(Value::String(s)) => parse_number(s),
        _ => None,
    }
}

fn text(v: &Option<Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::{parse_number, Reading};
    use crate::client::RawReading;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_from_raw() {
        let raw = RawReading {
            wind_speed: Some(json!("3.4")),
            rainfall: Some(json!(0)),
            humidity: Some(json!("")),
            wind_dir: Some(json!(225)),
            ct: Some(json!(21.5)),
            vaporpressuser: Some(json!("1013.2")),
            visibility: Some(json!("n/a")),
            upt: None,
        };

        let reading = Reading::from_raw("2024-03-10 07:05:00".to_owned(), &raw);
        assert_eq!(
            Reading {
                timestamp: "2024-03-10 07:05:00".to_owned(),
                temperature: Some(21.5),
                humidity: None,
                wind_speed: Some(3.4),
                wind_dir: Some("225".to_owned()),
                rainfall: Some(0.0),
                pressure: Some(1013.2),
                visibility: None,
            },
            reading
        );
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(Some(12.5), parse_number(" 12.5 "));
        assert_eq!(Some(0.0), parse_number("0"));
        assert_eq!(None, parse_number(""));
        assert_eq!(None, parse_number("NaN"));
        assert_eq!(None, parse_number("abc"));
    }
}
