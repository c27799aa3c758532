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

use thiserror::Error;

/// Error returned when selecting station IDs that are not part of the registry.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown station {0}")]
pub struct UnknownStation(pub String);

/// A fixed weather monitoring station.
///
/// Stations can only be obtained from a `StationRegistry`, which guarantees that
/// anything handed to the telemetry client is a known station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    id: &'static str,
    name: &'static str,
    color: &'static str,
}

impl Station {
    const fn new(id: &'static str, name: &'static str, color: &'static str) -> Self {
        Station { id, name, color }
    }

    /// Numeric station code used by the upstream service and in file names.
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Display name of the station.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Chart color used for the station on the dashboard.
    pub fn color(&self) -> &'static str {
        self.color
    }
}

const SHANGHAI: [Station; 13] = [
    Station::new("58367", "徐家汇", "rgb(255, 99, 132)"),
    Station::new("58361", "闵行", "rgb(54, 162, 235)"),
    Station::new("58362", "宝山", "rgb(75, 192, 192)"),
    Station::new("58363", "长江口", "rgb(153, 102, 255)"),
    Station::new("58365", "嘉定", "rgb(255, 159, 64)"),
    Station::new("58366", "崇明", "rgb(255, 205, 86)"),
    Station::new("58369", "南汇", "rgb(201, 203, 207)"),
    Station::new("58370", "浦东", "rgb(100, 181, 246)"),
    Station::new("58460", "金山", "rgb(239, 83, 80)"),
    Station::new("58461", "青浦", "rgb(171, 71, 188)"),
    Station::new("58462", "松江", "rgb(255, 112, 67)"),
    Station::new("58463", "奉贤", "rgb(38, 198, 218)"),
    Station::new("58474", "小洋山", "rgb(102, 187, 106)"),
];

/// Ordered, immutable set of stations to collect readings for.
#[derive(Debug, Clone)]
pub struct StationRegistry {
    stations: Vec<Station>,
}

impl StationRegistry {
    /// All monitoring stations around Shanghai, in collection order.
    pub fn shanghai() -> Self {
        StationRegistry {
            stations: SHANGHAI.to_vec(),
        }
    }

    /// Restrict this registry to the given station IDs, keeping registry order.
    ///
    /// An empty selection keeps every station.
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<Self, UnknownStation> {
        if ids.is_empty() {
            return Ok(self.clone());
        }

        if let Some(unknown) = ids.iter().find(|id| self.get(id.as_ref()).is_none()) {
            return Err(UnknownStation(unknown.as_ref().to_owned()));
        }

        let stations = self
            .stations
            .iter()
            .filter(|s| ids.iter().any(|id| id.as_ref() == s.id))
            .cloned()
            .collect();

        Ok(StationRegistry { stations })
    }

    pub fn get(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

impl Default for StationRegistry {
    fn default() -> Self {
        Self::shanghai()
    }
}
