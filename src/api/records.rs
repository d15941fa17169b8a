use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::{
    api::Error,
    models::{Stop, StopTime, TransportType, Vehicle, VehicleInfo},
    shared::geo::Coordinate,
};

#[derive(Debug, Clone, Deserialize)]
pub struct StopRecord {
    pub stop_num: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    #[serde(default)]
    pub tram: bool,
    #[serde(default)]
    pub bus: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopTimeRecord {
    pub category: String,
    #[serde(default)]
    pub trip_headsign: String,
    #[serde(default)]
    pub route_short_name: String,
    pub stop_num: String,
    pub planned_departure_time: String,
    #[serde(default)]
    pub predicted_departure_timestamp: Option<i64>,
    #[serde(default)]
    pub kmk_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleRecord {
    pub kmk_id: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub bearing: f64,
    #[serde(default)]
    pub route_short_name: String,
    #[serde(default)]
    pub trip_headsign: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleInfoRecord {
    pub kmk_id: String,
    pub category: String,
    #[serde(default)]
    pub full_kmk_id: String,
    #[serde(default)]
    pub full_model_name: String,
    #[serde(default)]
    pub short_model_name: String,
    #[serde(default)]
    pub floor: String,
}

fn coordinate(latitude: f64, longitude: f64) -> Result<Coordinate, &'static str> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err("coordinate out of range");
    }
    Ok(Coordinate::new(latitude, longitude))
}

fn category(value: &str) -> Result<TransportType, &'static str> {
    TransportType::parse(value).ok_or("unknown category")
}

impl TryFrom<StopRecord> for Stop {
    type Error = &'static str;

    fn try_from(value: StopRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.stop_num.into(),
            name: value.stop_name.into(),
            coordinate: coordinate(value.stop_lat, value.stop_lon)?,
            tram: value.tram,
            bus: value.bus,
        })
    }
}

impl TryFrom<StopTimeRecord> for StopTime {
    type Error = &'static str;

    fn try_from(value: StopTimeRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            category: category(&value.category)?,
            headsign: value.trip_headsign.into(),
            line: value.route_short_name.into(),
            stop_num: value.stop_num.into(),
            planned_departure: value.planned_departure_time.into(),
            predicted_departure: value.predicted_departure_timestamp,
            vehicle_ref: value.kmk_id.into(),
        })
    }
}

impl TryFrom<VehicleRecord> for Vehicle {
    type Error = &'static str;

    fn try_from(value: VehicleRecord) -> Result<Self, Self::Error> {
        if value.kmk_id.is_empty() {
            return Err("missing vehicle id");
        }
        Ok(Self {
            id: value.kmk_id.into(),
            category: category(&value.category)?,
            coordinate: coordinate(value.latitude, value.longitude)?,
            bearing: if value.bearing.is_finite() {
                value.bearing
            } else {
                0.0
            },
            line: value.route_short_name.into(),
            headsign: value.trip_headsign.into(),
        })
    }
}

impl TryFrom<VehicleInfoRecord> for VehicleInfo {
    type Error = &'static str;

    fn try_from(value: VehicleInfoRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.kmk_id.into(),
            category: category(&value.category)?,
            full_id: value.full_kmk_id.into(),
            model: value.full_model_name.into(),
            short_model: value.short_model_name.into(),
            floor: value.floor.into(),
        })
    }
}

/// Decodes `{ "<field>": [ ... ] }`, converting each element on its own.
/// Elements that don't deserialize or don't convert are dropped.
pub(crate) fn decode_list<R, T>(body: &[u8], field: &str) -> Result<Vec<T>, Error>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = &'static str>,
{
    let mut envelope: serde_json::Map<String, Value> = serde_json::from_slice(body)?;
    let items = match envelope.remove(field) {
        Some(Value::Array(items)) => items,
        _ => return Err(Error::MissingField(field.to_string())),
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<R>(item).ok())
        .filter_map(|record| match T::try_from(record) {
            Ok(value) => Some(value),
            Err(reason) => {
                debug!("Dropping {field} entry: {reason}");
                None
            }
        })
        .collect();
    if decoded.len() < total {
        debug!("Dropped {} of {total} {field} entries", total - decoded.len());
    }
    Ok(decoded)
}

#[test]
fn decode_stops_drops_malformed() {
    let body = br#"{"stops": [
        {"stop_num": "1", "stop_name": "Wawel", "stop_lat": 50.05, "stop_lon": 19.93, "tram": true},
        {"stop_num": "2", "stop_name": "Broken"},
        {"stop_num": "3", "stop_name": "Nowhere", "stop_lat": 250.0, "stop_lon": 19.0}
    ]}"#;
    let stops: Vec<Stop> = decode_list::<StopRecord, _>(body, "stops").unwrap();
    assert_eq!(stops.len(), 1);
    assert_eq!(&*stops[0].name, "Wawel");
    assert!(stops[0].tram);
    assert!(!stops[0].bus);
}

#[test]
fn decode_vehicles_rejects_unknown_category() {
    let body = br#"{"vehicles": [
        {"kmk_id": "HY101", "category": "tram", "latitude": 50.0, "longitude": 19.9, "bearing": 90},
        {"kmk_id": "X1", "category": "ferry", "latitude": 50.0, "longitude": 19.9}
    ]}"#;
    let vehicles: Vec<Vehicle> = decode_list::<VehicleRecord, _>(body, "vehicles").unwrap();
    assert_eq!(vehicles.len(), 1);
    assert_eq!(vehicles[0].category, TransportType::Tram);
    assert_eq!(vehicles[0].bearing, 90.0);
}

#[test]
fn decode_missing_field() {
    let body = br#"{"other": []}"#;
    let result = decode_list::<StopRecord, Stop>(body, "stops");
    assert!(matches!(result, Err(Error::MissingField(_))));
}
