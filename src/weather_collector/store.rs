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

//! Append-only storage of readings in daily CSV files.
//!
//! Each station gets one file per calendar day (UTC+8) named
//! `weather_{station}_{YYYY-MM-DD}.csv`. The first line of every file is a column
//! header and each following line is one reading. Existing lines are never
//! rewritten, reordered or removed.
//!
//! Files are only written by a single collector process. Running several
//! collectors against the same directory is not supported: header creation and
//! row ordering are not coordinated between processes.

use crate::reading::{parse_number, Reading};
use crate::time::DAY_FORMAT;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CURRENT_HEADER: [&str; 8] = [
    "timestamp",
    "temperature",
    "humidity",
    "wind_speed",
    "wind_dir",
    "rainfall",
    "pressure",
    "visibility",
];

const LEGACY_HEADER: [&str; 9] = [
    "timestamp",
    "wind_speed",
    "rainfall",
    "humidity",
    "wind_dir",
    "ct",
    "vaporpressuser",
    "visibility",
    "upt",
];

/// Column layout of a daily file, identified by its header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Upstream field names in upstream order with the update time as the last
    /// column. Written by earlier deployments, only ever read.
    Legacy,
    /// Normalized field names. Every file created by this crate uses it.
    Current,
}

impl Schema {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            Self::Legacy => &LEGACY_HEADER,
            Self::Current => &CURRENT_HEADER,
        }
    }

    /// Identify the schema of a file from its header record.
    pub fn detect(header: &StringRecord) -> Option<Self> {
        [Self::Current, Self::Legacy]
            .into_iter()
            .find(|s| header.iter().eq(s.header().iter().copied()))
    }

    fn columns(&self) -> Columns {
        let position = |names: &[&str]| self.header().iter().position(|h| names.contains(h));

        Columns {
            timestamp: position(&["timestamp"]),
            temperature: position(&["temperature", "ct"]),
            humidity: position(&["humidity"]),
            wind_speed: position(&["wind_speed"]),
            wind_dir: position(&["wind_dir"]),
            rainfall: position(&["rainfall"]),
            pressure: position(&["pressure", "vaporpressuser"]),
            visibility: position(&["visibility"]),
        }
    }
}

/// Positions of each reading field within a row.
#[derive(Debug)]
struct Columns {
    timestamp: Option<usize>,
    temperature: Option<usize>,
    humidity: Option<usize>,
    wind_speed: Option<usize>,
    wind_dir: Option<usize>,
    rainfall: Option<usize>,
    pressure: Option<usize>,
    visibility: Option<usize>,
}

impl Columns {
    fn reading(&self, row: &StringRecord) -> Option<Reading> {
        let cell = |i: Option<usize>| i.and_then(|i| row.get(i)).map(str::trim).filter(|s| !s.is_empty());
        let number = |i: Option<usize>| cell(i).and_then(parse_number);

        Some(Reading {
            timestamp: cell(self.timestamp)?.to_owned(),
            temperature: number(self.temperature),
            humidity: number(self.humidity),
            wind_speed: number(self.wind_speed),
            wind_dir: cell(self.wind_dir).map(str::to_owned),
            rainfall: number(self.rainfall),
            pressure: number(self.pressure),
            visibility: number(self.visibility),
        })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to create directory {0}: {1}")]
    Directory(PathBuf, #[source] io::Error),

    #[error("unable to create {0}: {1}")]
    Create(PathBuf, #[source] io::Error),

    #[error("unable to append to {0}: {1}")]
    Append(PathBuf, #[source] io::Error),

    #[error("unable to encode row for {0}: {1}")]
    Encode(PathBuf, #[source] csv::Error),
}

/// Rows read back from a single daily file.
#[derive(Debug, Default)]
pub struct DayRows {
    pub readings: Vec<Reading>,
    /// Rows that could not be parsed and were dropped.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Store { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the storage directory and any missing parents.
    pub fn create_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::Directory(self.dir.clone(), e))
    }

    pub fn path(&self, station: &str, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("weather_{}_{}.csv", station, day.format(DAY_FORMAT)))
    }

    /// Make sure the file for `station` and `day` exists and starts with the header.
    ///
    /// Returns `true` if the header was written by this call. An existing file with
    /// content is left untouched.
    pub fn ensure_header(&self, station: &str, day: NaiveDate) -> Result<bool, StoreError> {
        let path = self.path(station, day);
        let header = encode(&path, Schema::Current.header())?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let len = fs::metadata(&path)
                    .map_err(|e| StoreError::Create(path.clone(), e))?
                    .len();

                if len != 0 {
                    return Ok(false);
                }

                // Left empty by an earlier header write that failed
                OpenOptions::new()
                    .append(true)
                    .open(&path)
                    .map_err(|e| StoreError::Create(path.clone(), e))?
            }
            Err(e) => return Err(StoreError::Create(path, e)),
        };

        write_line(&mut file, &header).map_err(|e| StoreError::Create(path.clone(), e))?;
        tracing::info!(message = "created new daily file", path = %path.display());
        Ok(true)
    }

    /// Append one reading as a single line, writing the header first if needed.
    ///
    /// A trailing partial line left by an interrupted earlier write is removed
    /// first. If this write fails, the file is truncated back to its length
    /// before the write.
    pub fn append(&self, station: &str, day: NaiveDate, reading: &Reading) -> Result<(), StoreError> {
        let path = self.path(station, day);
        let line = encode(&path, &row(reading))?;

        self.drop_partial_line(&path)?;
        self.ensure_header(station, day)?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::Append(path.clone(), e))?;
        let len = file
            .metadata()
            .map_err(|e| StoreError::Append(path.clone(), e))?
            .len();

        if let Err(e) = write_line(&mut file, &line) {
            if let Err(err) = file.set_len(len) {
                tracing::error!(message = "unable to truncate partial row", path = %path.display(), error = %err);
            }
            return Err(StoreError::Append(path, e));
        }

        Ok(())
    }

    /// Truncate the file at `path` after its last complete line, if it has an
    /// unterminated one. Missing files are left alone.
    fn drop_partial_line(&self, path: &Path) -> Result<(), StoreError> {
        let mut file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::Append(path.to_path_buf(), e)),
        };

        let (len, complete) =
            complete_len(&mut file).map_err(|e| StoreError::Append(path.to_path_buf(), e))?;
        if len != complete {
            tracing::warn!(
                message = "removing partial line from daily file",
                path = %path.display(),
                bytes = len - complete,
            );
            file.set_len(complete).map_err(|e| StoreError::Append(path.to_path_buf(), e))?;
        }

        Ok(())
    }

    /// Read every parseable reading from the file for `station` and `day`.
    ///
    /// Missing, empty and header-only files yield no readings. Rows that cannot
    /// be parsed are logged and dropped.
    pub fn read_day(&self, station: &str, day: NaiveDate) -> DayRows {
        let path = self.path(station, day);
        let mut rows = DayRows::default();

        let mut reader = match ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_path(&path)
        {
            Ok(r) => r,
            Err(e) => {
                if !is_not_found(&e) {
                    tracing::warn!(message = "unable to open daily file", path = %path.display(), error = %e);
                }
                return rows;
            }
        };

        let schema = match reader.headers() {
            Ok(h) if h.is_empty() => return rows,
            Ok(h) => Schema::detect(h),
            Err(e) => {
                tracing::warn!(message = "unable to read daily file header", path = %path.display(), error = %e);
                return rows;
            }
        };

        let columns = match schema {
            Some(s) => s.columns(),
            None => {
                tracing::warn!(message = "unrecognized daily file header", path = %path.display());
                return rows;
            }
        };

        for (i, record) in reader.records().enumerate() {
            match record.ok().and_then(|r| columns.reading(&r)) {
                Some(reading) => rows.readings.push(reading),
                None => {
                    tracing::warn!(message = "dropping unparseable row", path = %path.display(), row = i + 1);
                    rows.skipped += 1;
                }
            }
        }

        rows
    }
}

fn row(reading: &Reading) -> [String; 8] {
    let number = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();

    [
        reading.timestamp.clone(),
        number(reading.temperature),
        number(reading.humidity),
        number(reading.wind_speed),
        reading.wind_dir.clone().unwrap_or_default(),
        number(reading.rainfall),
        number(reading.pressure),
        number(reading.visibility),
    ]
}

/// Encode fields as one complete CSV line, including the terminator.
fn encode<I, T>(path: &Path, fields: I) -> Result<Vec<u8>, StoreError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut buf = Vec::with_capacity(128);
    {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(&mut buf);

        writer
            .write_record(fields)
            .map_err(|e| StoreError::Encode(path.to_path_buf(), e))?;
        writer
            .flush()
            .map_err(|e| StoreError::Encode(path.to_path_buf(), e.into()))?;
    }

    Ok(buf)
}

/// Write a complete line with a single call so readers never observe half a row.
fn write_line(file: &mut fs::File, line: &[u8]) -> io::Result<()> {
    file.write_all(line)?;
    file.flush()
}

/// Total length of the file and the length up to and including its last newline.
fn complete_len(file: &mut fs::File) -> io::Result<(u64, u64)> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok((0, 0));
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok((len, len));
    }

    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;
    let complete = contents.iter().rposition(|b| *b == b'\n').map_or(0, |i| i as u64 + 1);
    Ok((len, complete))
}

fn is_not_found(e: &csv::Error) -> bool {
    matches!(e.kind(), csv::ErrorKind::Io(err) if err.kind() == io::ErrorKind::NotFound)
}
