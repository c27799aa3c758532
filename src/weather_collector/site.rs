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

//! Static dashboard output.
//!
//! A site is a directory with `index.html`, which embeds a snapshot so it works
//! without any server side support, and `data/weather_data.json`, which the page
//! polls to refresh itself.

use crate::render::{RenderError, Snapshot};
use std::fs;
use std::path::{Path, PathBuf};

const TEMPLATE: &str = include_str!("../../templates/index.html");
const SNAPSHOT_PLACEHOLDER: &str = "{{SNAPSHOT}}";

pub const DATA_DIR: &str = "data";
pub const DATA_FILE: &str = "weather_data.json";
pub const PAGE_FILE: &str = "index.html";

/// Write `data/weather_data.json` under `out`, returning its path.
pub fn write_json(out: &Path, snapshot: &Snapshot) -> Result<PathBuf, RenderError> {
    let dir = out.join(DATA_DIR);
    fs::create_dir_all(&dir).map_err(|e| RenderError::Io(dir.clone(), e))?;

    let path = dir.join(DATA_FILE);
    let json = serde_json::to_string_pretty(snapshot)?;
    replace(&path, json.as_bytes())?;
    Ok(path)
}

/// Write `index.html` under `out` with the snapshot embedded, returning its path.
pub fn write_page(out: &Path, snapshot: &Snapshot) -> Result<PathBuf, RenderError> {
    fs::create_dir_all(out).map_err(|e| RenderError::Io(out.to_path_buf(), e))?;

    let path = out.join(PAGE_FILE);
    replace(&path, page(snapshot)?.as_bytes())?;
    Ok(path)
}

/// Render the dashboard page for a snapshot.
pub fn page(snapshot: &Snapshot) -> Result<String, RenderError> {
    // Keep the embedded JSON from closing the surrounding script element
    let json = serde_json::to_string(snapshot)?.replace("</", "<\\/");
    Ok(TEMPLATE.replace(SNAPSHOT_PLACEHOLDER, &json))
}

/// Write to a sibling temporary file and rename it over `path` so readers only
/// ever see the old or the new contents.
fn replace(path: &Path, contents: &[u8]) -> Result<(), RenderError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(|e| RenderError::Io(tmp.clone(), e))?;
    fs::rename(&tmp, path).map_err(|e| RenderError::Io(path.to_path_buf(), e))
}

#[cfg(test)]
mod test {
    use super::{page, write_json, write_page};
    use crate::reading::Reading;
    use crate::render::{Snapshot, StationInfo};
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot() -> Snapshot {
        let mut stations = BTreeMap::new();
        stations.insert(
            "58367".to_owned(),
            StationInfo {
                name: "徐家汇".to_owned(),
                color: "rgb(255, 99, 132)".to_owned(),
            },
        );

        let mut data = BTreeMap::new();
        data.insert(
            "58367".to_owned(),
            vec![Reading {
                timestamp: "2024-03-10 07:03:00".to_owned(),
                temperature: Some(21.5),
                wind_dir: Some("</script>".to_owned()),
                ..Default::default()
            }],
        );

        Snapshot {
            update_time: "2024-03-10 07:10:00".to_owned(),
            stations,
            data,
        }
    }

    #[test]
    fn test_page_embeds_snapshot() {
        let html = page(&snapshot()).unwrap();

        assert!(!html.contains("{{SNAPSHOT}}"));
        assert!(html.contains(r#""update_time":"2024-03-10 07:10:00""#));
        assert!(html.contains(r#""wind_dir":"<\/script>""#));
    }

    #[test]
    fn test_page_loads_date_adapter() {
        let html = page(&snapshot()).unwrap();

        let chart = html.find("chart.umd.min.js").unwrap();
        let adapter = html.find("chartjs-adapter-date-fns").unwrap();
        assert!(chart < adapter);
        assert!(html.contains("type: 'time'"));
    }

    #[test]
    fn test_write_site() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("public");

        let json_path = write_json(&out, &snapshot()).unwrap();
        let page_path = write_page(&out, &snapshot()).unwrap();

        assert_eq!(out.join("data").join("weather_data.json"), json_path);
        assert_eq!(out.join("index.html"), page_path);

        let decoded: Snapshot = serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(snapshot(), decoded);
        assert!(!out.join("index.html.tmp").exists());
    }
}
