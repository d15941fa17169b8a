mod common;

use std::{fs, path::PathBuf};

use chrono::{DateTime, Utc};
use common::krakow_stops;
use tramspot::store::{SnapshotStore, StopSnapshot, ZipSnapshotStore};

fn temp_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tramspot-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir.join("stops_snapshot.zip")
}

#[test]
fn missing_archive_is_no_snapshot() {
    let store = ZipSnapshotStore::new(temp_path("missing"));
    assert!(store.load().unwrap().is_none());
}

#[test]
fn zip_store_keeps_stops_and_timestamp() {
    let path = temp_path("roundtrip");
    let store = ZipSnapshotStore::new(&path);
    let fetched_at = DateTime::from_timestamp_millis(1_741_600_000_123).unwrap();
    let stops = krakow_stops();
    store
        .save(&StopSnapshot::new(stops.clone().into(), fetched_at))
        .unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.fetched_at, fetched_at);
    assert_eq!(&*loaded.stops, stops.as_slice());
    assert!(!path.with_extension("tmp").exists());

    let _ = fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn save_replaces_previous_snapshot() {
    let path = temp_path("replace");
    let store = ZipSnapshotStore::new(&path);
    let stops = krakow_stops();
    store
        .save(&StopSnapshot::new(stops.clone().into(), Utc::now()))
        .unwrap();
    store
        .save(&StopSnapshot::new(stops[..1].to_vec().into(), Utc::now()))
        .unwrap();

    assert_eq!(store.load().unwrap().unwrap().stops.len(), 1);
    let _ = fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn corrupt_archive_is_an_error() {
    let path = temp_path("corrupt");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"not a zip").unwrap();
    assert!(ZipSnapshotStore::new(&path).load().is_err());
    let _ = fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn malformed_row_rejects_the_snapshot() {
    use std::io::Write;
    use zip::{ZipWriter, write::SimpleFileOptions};

    let path = temp_path("malformed-row");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = ZipWriter::new(fs::File::create(&path).unwrap());
    zip.start_file("stops.csv", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(
        b"stop_num,stop_name,stop_lat,stop_lon,tram,bus\n\
          1,Dworzec G\xc5\x82\xc3\xb3wny,50.0673,19.9447,false,true\n\
          2,Teatr S\xc5\x82owackiego,north,19.9419,true,false\n",
    )
    .unwrap();
    zip.start_file("timestamp", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"1741600000123").unwrap();
    zip.finish().unwrap();

    assert!(ZipSnapshotStore::new(&path).load().is_err());
    let _ = fs::remove_dir_all(path.parent().unwrap());
}
