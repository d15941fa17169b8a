use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use thiserror::Error;
use zip::{ZipArchive, ZipWriter, read::ZipFile, write::SimpleFileOptions};

use crate::{models::Stop, shared::geo::Coordinate};

const STOPS_ENTRY: &str = "stops.csv";
const TIMESTAMP_ENTRY: &str = "timestamp";

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Could not find entry with name: {0}")]
    EntryNotFound(String),
    #[error("Invalid snapshot timestamp: {0}")]
    InvalidTimestamp(String),
}

/// The full stop dataset as it was at `fetched_at`.
#[derive(Debug, Clone)]
pub struct StopSnapshot {
    pub stops: Arc<[Stop]>,
    pub fetched_at: DateTime<Utc>,
}

impl StopSnapshot {
    pub fn new(stops: Arc<[Stop]>, fetched_at: DateTime<Utc>) -> Self {
        Self { stops, fetched_at }
    }

    /// Expired once strictly older than `max_age`. A timestamp in the
    /// future never expires.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.fetched_at)
            .to_std()
            .is_ok_and(|age| age > max_age)
    }
}

/// Persistent home of the last fetched stop dataset, read at cold start.
pub trait SnapshotStore: Send + Sync + 'static {
    fn load(&self) -> Result<Option<StopSnapshot>, self::Error>;
    fn save(&self, snapshot: &StopSnapshot) -> Result<(), self::Error>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StopRow {
    stop_num: String,
    stop_name: String,
    stop_lat: f64,
    stop_lon: f64,
    tram: bool,
    bus: bool,
}

impl From<&Stop> for StopRow {
    fn from(value: &Stop) -> Self {
        Self {
            stop_num: value.id.to_string(),
            stop_name: value.name.to_string(),
            stop_lat: value.coordinate.latitude,
            stop_lon: value.coordinate.longitude,
            tram: value.tram,
            bus: value.bus,
        }
    }
}

impl From<StopRow> for Stop {
    fn from(value: StopRow) -> Self {
        Self {
            id: value.stop_num.into(),
            name: value.stop_name.into(),
            coordinate: Coordinate::new(value.stop_lat, value.stop_lon),
            tram: value.tram,
            bus: value.bus,
        }
    }
}

/// Snapshot kept as a zip archive holding `stops.csv` and a millisecond
/// `timestamp` entry. A missing archive reads as "no snapshot".
#[derive(Debug, Clone)]
pub struct ZipSnapshotStore {
    path: PathBuf,
}

impl ZipSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for ZipSnapshotStore {
    fn load(&self) -> Result<Option<StopSnapshot>, self::Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let zip_file = File::open(&self.path)?;
        let mut archive = ZipArchive::new(zip_file)?;

        let mut timestamp = String::new();
        get_file(&mut archive, TIMESTAMP_ENTRY)?.read_to_string(&mut timestamp)?;
        let fetched_at = timestamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| self::Error::InvalidTimestamp(timestamp.clone()))?;

        // One bad row rejects the whole snapshot.
        let file = get_file(&mut archive, STOPS_ENTRY)?;
        let mut reader = csv::Reader::from_reader(file);
        let stops = reader
            .deserialize::<StopRow>()
            .map(|row| row.map(Stop::from))
            .collect::<Result<Vec<Stop>, csv::Error>>()?;

        Ok(Some(StopSnapshot::new(stops.into(), fetched_at)))
    }

    fn save(&self, snapshot: &StopSnapshot) -> Result<(), self::Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        // Write beside the target and rename, so readers never see half a file.
        let tmp_path = self.path.with_extension("tmp");
        let mut zip = ZipWriter::new(File::create(&tmp_path)?);

        zip.start_file(STOPS_ENTRY, SimpleFileOptions::default())?;
        {
            let mut writer = csv::Writer::from_writer(&mut zip);
            for stop in snapshot.stops.iter() {
                writer.serialize(StopRow::from(stop))?;
            }
            writer.flush()?;
        }

        zip.start_file(TIMESTAMP_ENTRY, SimpleFileOptions::default())?;
        zip.write_all(snapshot.fetched_at.timestamp_millis().to_string().as_bytes())?;
        zip.finish()?;

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn get_file<'a>(
    archive: &'a mut ZipArchive<File>,
    name: &'a str,
) -> Result<ZipFile<'a, File>, self::Error> {
    let index = archive
        .index_for_name(name)
        .ok_or(self::Error::EntryNotFound(name.to_string()))?;
    let file = archive.by_index(index)?;
    Ok(file)
}

/// In-process store, for embedders without a filesystem.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<StopSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_snapshot(snapshot: StopSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<StopSnapshot>, self::Error> {
        let snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshot.clone())
    }

    fn save(&self, snapshot: &StopSnapshot) -> Result<(), self::Error> {
        let mut current = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        *current = Some(snapshot.clone());
        Ok(())
    }
}

#[test]
fn expiry_test() {
    let now = Utc::now();
    let week = Duration::from_secs(7 * 24 * 60 * 60);
    let fresh = StopSnapshot::new(Arc::from(Vec::new()), now - chrono::Duration::days(6));
    let stale = StopSnapshot::new(Arc::from(Vec::new()), now - chrono::Duration::days(8));
    let future = StopSnapshot::new(Arc::from(Vec::new()), now + chrono::Duration::days(1));
    assert!(!fresh.is_expired(now, week));
    assert!(stale.is_expired(now, week));
    assert!(!future.is_expired(now, week));
}
