use std::{fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::shared::{Located, geo::Coordinate};

/// Tram or bus. Both stops and vehicles are tagged with one of these, and
/// the upstream API spells them in lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    #[default]
    Tram,
    Bus,
}

impl TransportType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportType::Tram => "tram",
            TransportType::Bus => "bus",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tram" => Some(TransportType::Tram),
            "bus" => Some(TransportType::Bus),
            _ => None,
        }
    }
}

impl Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stop as held in the shared cache. Never mutated after load; request
/// scoped annotations (distance, departures) live in wrapper types.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Stop {
    /// Upstream stop number. Only unique together with `name`.
    pub id: Arc<str>,
    pub name: Arc<str>,
    pub coordinate: Coordinate,
    pub tram: bool,
    pub bus: bool,
}

impl Stop {
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.id)
    }

    pub fn serves(&self, transport: TransportType) -> bool {
        match transport {
            TransportType::Tram => self.tram,
            TransportType::Bus => self.bus,
        }
    }
}

impl Located for Stop {
    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }
}

/// One live vehicle as reported by a single poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    /// Stable across polls.
    pub id: Arc<str>,
    pub category: TransportType,
    pub coordinate: Coordinate,
    pub bearing: f64,
    pub line: Arc<str>,
    pub headsign: Arc<str>,
}

impl Located for Vehicle {
    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }
}

/// Static fleet metadata for one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleInfo {
    pub id: Arc<str>,
    pub category: TransportType,
    pub full_id: Arc<str>,
    pub model: Arc<str>,
    pub short_model: Arc<str>,
    pub floor: Arc<str>,
}

/// Raw scheduled/predicted passage of a trip through a stop.
#[derive(Debug, Clone, PartialEq)]
pub struct StopTime {
    pub category: TransportType,
    pub headsign: Arc<str>,
    pub line: Arc<str>,
    pub stop_num: Arc<str>,
    /// "HH:MM" as planned, may exceed 24h.
    pub planned_departure: Arc<str>,
    pub predicted_departure: Option<i64>,
    pub vehicle_ref: Arc<str>,
}
