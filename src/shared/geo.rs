use std::{cmp, fmt::Display};

use serde::{Deserialize, Serialize};

pub(crate) const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Distance(f64);

impl PartialEq for Distance {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Distance {
    pub const fn from_meters(distance: f64) -> Self {
        Self(distance)
    }

    pub const fn from_kilometers(distance: f64) -> Self {
        Self(distance * 1000.0)
    }

    pub const fn as_meters(&self) -> f64 {
        self.0
    }

    pub const fn as_kilometers(&self) -> f64 {
        self.0 / 1000.0
    }

    pub fn total_cmp(&self, other: &Self) -> cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}, {}", self.latitude, self.longitude))
    }
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance using the haversine formula.
    pub fn distance(&self, coord: &Self) -> Distance {
        Distance::from_kilometers(distance_km(
            self.latitude,
            self.longitude,
            coord.latitude,
            coord.longitude,
        ))
    }
}

/// Haversine distance in kilometers between two points given in degrees.
/// Symmetric, and zero for identical points.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dist_lat = f64::to_radians(lat2 - lat1);
    let dist_lon = f64::to_radians(lon2 - lon1);
    let a = f64::powi(f64::sin(dist_lat / 2.0), 2)
        + f64::cos(f64::to_radians(lat1))
            * f64::cos(f64::to_radians(lat2))
            * f64::sin(dist_lon / 2.0)
            * f64::sin(dist_lon / 2.0);
    // Rounding can push `a` a hair over 1 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * f64::atan2(f64::sqrt(a), f64::sqrt(1.0 - a));
    EARTH_RADIUS_KM * c
}

/// Geographic rectangle, the way a map widget reports its visible area.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: Coordinate,
    pub north_east: Coordinate,
}

impl Bounds {
    pub fn new(south_west: Coordinate, north_east: Coordinate) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Grows every edge outward by `ratio` times the span of its axis.
    /// A ratio of 0.3 inflates each side by 30% of the height/width.
    pub fn pad(&self, ratio: f64) -> Self {
        let lat_buffer = (self.north_east.latitude - self.south_west.latitude).abs() * ratio;
        let lon_buffer = (self.north_east.longitude - self.south_west.longitude).abs() * ratio;
        Self {
            south_west: Coordinate::new(
                self.south_west.latitude - lat_buffer,
                self.south_west.longitude - lon_buffer,
            ),
            north_east: Coordinate::new(
                self.north_east.latitude + lat_buffer,
                self.north_east.longitude + lon_buffer,
            ),
        }
    }

    /// Inclusive on every edge.
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        coordinate.latitude >= self.south_west.latitude
            && coordinate.latitude <= self.north_east.latitude
            && coordinate.longitude >= self.south_west.longitude
            && coordinate.longitude <= self.north_east.longitude
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.south_west.latitude + self.north_east.latitude) / 2.0,
            (self.south_west.longitude + self.north_east.longitude) / 2.0,
        )
    }
}

/// What the map currently shows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub bounds: Bounds,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(bounds: Bounds, zoom: f64) -> Self {
        Self { bounds, zoom }
    }

    pub fn center(&self) -> Coordinate {
        self.bounds.center()
    }
}

#[test]
fn distance_test() {
    let coord_a = Coordinate {
        latitude: 48.85800943005911,
        longitude: 2.3514350059357927,
    };

    let coord_b = Coordinate {
        latitude: 51.5052389927712,
        longitude: -0.12495407345099824,
    };
    let d = coord_a.distance(&coord_b);
    assert!((d.as_kilometers() - 343.5).abs() < 2.0);
}

#[test]
fn distance_eq_test() {
    let dist_a = Distance::from_meters(1000.0);
    let dist_b = Distance::from_kilometers(1.0);
    assert_eq!(dist_a, dist_b)
}

#[test]
fn distance_cmp_test() {
    let dist_a = Distance::from_meters(1000.0);
    let dist_b = Distance::from_kilometers(0.5);
    assert!(dist_a > dist_b)
}

#[test]
fn pad_test() {
    let bounds = Bounds::new(Coordinate::new(50.0, 19.0), Coordinate::new(51.0, 21.0));
    let padded = bounds.pad(0.5);
    assert_eq!(padded.south_west, Coordinate::new(49.5, 18.0));
    assert_eq!(padded.north_east, Coordinate::new(51.5, 22.0));
    assert_eq!(padded.center(), bounds.center());
}

