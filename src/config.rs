use std::{env, path::PathBuf, time::Duration};

use crate::location::PositionOptions;

pub const DEFAULT_API_URL: &str = "http://localhost:8787";
pub const DEFAULT_UPSTREAM_URL: &str = "https://tomekzaw-ttss-gtfs.herokuapp.com";
pub const DEFAULT_PORT: u16 = 8787;

/// Zoom thresholds and the number of stop markers allowed above each.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomCaps {
    pub high_detail_zoom: f64,
    pub medium_detail_zoom: f64,
    pub high_zoom_stops: usize,
    pub medium_zoom_stops: usize,
    pub low_zoom_stops: usize,
}

impl Default for ZoomCaps {
    fn default() -> Self {
        Self {
            high_detail_zoom: 15.0,
            medium_detail_zoom: 13.0,
            high_zoom_stops: 100,
            medium_zoom_stops: 60,
            low_zoom_stops: 40,
        }
    }
}

impl ZoomCaps {
    pub fn max_stops(&self, zoom: f64) -> usize {
        if zoom > self.high_detail_zoom {
            self.high_zoom_stops
        } else if zoom > self.medium_detail_zoom {
            self.medium_zoom_stops
        } else {
            self.low_zoom_stops
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub high_accuracy: PositionOptions,
    pub low_accuracy: PositionOptions,
    pub watch: PositionOptions,
    /// Time after which the low-accuracy tier is started even if the
    /// high-accuracy request is still pending.
    pub fallback_after: Duration,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: PositionOptions {
                high_accuracy: true,
                timeout: Duration::from_secs(5),
                maximum_age: Duration::from_secs(60),
            },
            low_accuracy: PositionOptions {
                high_accuracy: false,
                timeout: Duration::from_secs(10),
                maximum_age: Duration::from_secs(5 * 60),
            },
            watch: PositionOptions {
                high_accuracy: true,
                timeout: Duration::from_secs(10),
                maximum_age: Duration::from_secs(30),
            },
            fallback_after: Duration::from_secs(4),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL the client talks to, normally the same-origin proxy.
    pub api_url: String,
    /// Host the proxy forwards to.
    pub upstream_url: String,
    pub port: u16,
    pub snapshot_path: PathBuf,
    pub stop_cache_max_age: Duration,
    pub stop_bounds_padding: f64,
    pub vehicle_bounds_padding: f64,
    pub zoom_caps: ZoomCaps,
    pub viewport_debounce: Duration,
    pub vehicle_poll_interval: Duration,
    pub marker_animation: Duration,
    /// Displacement below which a vehicle is only re-oriented, not animated.
    pub movement_threshold_m: f64,
    pub nearest_stop_count: usize,
    pub departure_horizon: Duration,
    pub location: LocationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            upstream_url: DEFAULT_UPSTREAM_URL.into(),
            port: DEFAULT_PORT,
            snapshot_path: "stops_snapshot.zip".into(),
            stop_cache_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            stop_bounds_padding: 0.3,
            vehicle_bounds_padding: 0.2,
            zoom_caps: ZoomCaps::default(),
            viewport_debounce: Duration::from_millis(500),
            vehicle_poll_interval: Duration::from_millis(5000),
            marker_animation: Duration::from_millis(600),
            movement_threshold_m: 1.0,
            nearest_stop_count: 5,
            departure_horizon: Duration::from_secs(60 * 60),
            location: LocationConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, overridden by any `TRAMSPOT_*` variables present.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("TRAMSPOT_API_URL") {
            config.api_url = url;
        }
        if let Ok(url) = env::var("TRAMSPOT_UPSTREAM_URL") {
            config.upstream_url = url;
        }
        if let Ok(path) = env::var("TRAMSPOT_SNAPSHOT_PATH") {
            config.snapshot_path = path.into();
        }
        if let Some(port) = env::var("TRAMSPOT_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
        {
            config.port = port;
        }
        config
    }
}

#[test]
fn zoom_caps_test() {
    let caps = ZoomCaps::default();
    assert_eq!(caps.max_stops(16.0), 100);
    assert_eq!(caps.max_stops(15.0), 60);
    assert_eq!(caps.max_stops(14.0), 60);
    assert_eq!(caps.max_stops(13.0), 40);
    assert_eq!(caps.max_stops(10.0), 40);
}
