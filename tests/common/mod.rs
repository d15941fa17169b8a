#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{sync::mpsc, time::sleep};
use tramspot::{
    api::{Error, TransitApi},
    app::DepartureView,
    departures::Departure,
    filter::Ranked,
    loading::EnrichmentError,
    location::{Geolocation, LocationError, Position, PositionOptions, WatchId},
    models::{Stop, StopTime, TransportType, Vehicle, VehicleInfo},
    shared::geo::Coordinate,
    tween::Tween,
    vehicles::{Animation, VehicleLayer},
    visibility::{SelectHandler, StopLayer},
};

pub const USER: Coordinate = Coordinate::new(50.0671, 19.9445);

pub fn stop(id: &str, name: &str, latitude: f64, longitude: f64, tram: bool, bus: bool) -> Stop {
    Stop {
        id: id.into(),
        name: name.into(),
        coordinate: Coordinate::new(latitude, longitude),
        tram,
        bus,
    }
}

/// A handful of stops around the old town, roughly ordered by distance
/// from [`USER`].
pub fn krakow_stops() -> Vec<Stop> {
    vec![
        stop("1", "Dworzec Główny", 50.0673, 19.9447, false, true),
        stop("2", "Teatr Słowackiego", 50.0644, 19.9419, true, false),
        stop("3", "Basztowa LOT", 50.0654, 19.9449, true, true),
        stop("4", "Rondo Mogilskie", 50.0655, 19.9594, true, false),
        stop("5", "Salwator", 50.0541, 19.9046, false, true),
    ]
}

pub fn vehicle(id: &str, latitude: f64, longitude: f64, bearing: f64) -> Vehicle {
    Vehicle {
        id: id.into(),
        category: TransportType::Tram,
        coordinate: Coordinate::new(latitude, longitude),
        bearing,
        line: "4".into(),
        headsign: "Bronowice Małe".into(),
    }
}

pub fn stop_time(stop_num: &str, headsign: &str, predicted: i64) -> StopTime {
    StopTime {
        category: TransportType::Tram,
        headsign: headsign.into(),
        line: "8".into(),
        stop_num: stop_num.into(),
        planned_departure: "00:00".into(),
        predicted_departure: Some(predicted),
        vehicle_ref: "HF123".into(),
    }
}

fn failure(what: &str) -> Error {
    Error::EmptyBody(what.to_string())
}

/// Scripted upstream. Every fetch is counted.
#[derive(Default)]
pub struct FakeApi {
    pub stops: Mutex<Vec<Stop>>,
    pub fail_stops: AtomicBool,
    pub stop_delay: Duration,
    pub stop_times: Mutex<HashMap<String, Vec<StopTime>>>,
    pub stop_times_delay: Duration,
    pub failing_stop_times: Mutex<HashSet<String>>,
    pub vehicles: Mutex<Vec<Vehicle>>,
    pub fail_vehicles: AtomicBool,
    pub fleet: Vec<VehicleInfo>,
    pub stop_fetches: AtomicUsize,
    pub vehicle_fetches: AtomicUsize,
}

impl FakeApi {
    pub fn with_stops(stops: Vec<Stop>) -> Self {
        Self {
            stops: Mutex::new(stops),
            ..Default::default()
        }
    }

    pub fn stop_fetches(&self) -> usize {
        self.stop_fetches.load(Ordering::SeqCst)
    }

    pub fn vehicle_fetches(&self) -> usize {
        self.vehicle_fetches.load(Ordering::SeqCst)
    }

    pub fn set_vehicles(&self, vehicles: Vec<Vehicle>) {
        *self.vehicles.lock().unwrap() = vehicles;
    }
}

impl TransitApi for FakeApi {
    async fn fetch_stops(&self) -> Result<Vec<Stop>, Error> {
        self.stop_fetches.fetch_add(1, Ordering::SeqCst);
        if !self.stop_delay.is_zero() {
            sleep(self.stop_delay).await;
        }
        if self.fail_stops.load(Ordering::SeqCst) {
            return Err(failure("stops"));
        }
        Ok(self.stops.lock().unwrap().clone())
    }

    async fn fetch_stop_times(&self, stop_name: &str) -> Result<Vec<StopTime>, Error> {
        if !self.stop_times_delay.is_zero() {
            sleep(self.stop_times_delay).await;
        }
        if self.failing_stop_times.lock().unwrap().contains(stop_name) {
            return Err(failure(stop_name));
        }
        Ok(self
            .stop_times
            .lock()
            .unwrap()
            .get(stop_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_active_vehicles(&self) -> Result<Vec<Vehicle>, Error> {
        self.vehicle_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_vehicles.load(Ordering::SeqCst) {
            return Err(failure("vehicles"));
        }
        Ok(self.vehicles.lock().unwrap().clone())
    }

    async fn fetch_vehicle_info(&self) -> Result<Vec<VehicleInfo>, Error> {
        Ok(self.fleet.clone())
    }
}

/// One accuracy tier: answers `result` after `delay`.
#[derive(Clone)]
pub struct Tier {
    pub delay: Duration,
    pub result: Result<Position, LocationError>,
}

impl Tier {
    pub fn ok(delay_ms: u64, coordinate: Coordinate) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result: Ok(Position {
                coordinate,
                accuracy_m: 10.0,
            }),
        }
    }

    pub fn err(delay_ms: u64, err: LocationError) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result: Err(err),
        }
    }
}

pub struct FakeGeolocation {
    pub supported: bool,
    pub high: Tier,
    pub low: Tier,
    pub high_requests: AtomicUsize,
    pub low_requests: AtomicUsize,
    pub cleared: Mutex<Vec<WatchId>>,
    pub watchers: Mutex<Vec<mpsc::UnboundedSender<Result<Position, LocationError>>>>,
}

impl FakeGeolocation {
    pub fn new(high: Tier, low: Tier) -> Self {
        Self {
            supported: true,
            high,
            low,
            high_requests: AtomicUsize::new(0),
            low_requests: AtomicUsize::new(0),
            cleared: Mutex::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn at(coordinate: Coordinate) -> Self {
        Self::new(Tier::ok(10, coordinate), Tier::ok(10, coordinate))
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::at(USER)
        }
    }

    pub fn low_requests(&self) -> usize {
        self.low_requests.load(Ordering::SeqCst)
    }
}

impl Geolocation for FakeGeolocation {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn current_position(&self, options: PositionOptions) -> Result<Position, LocationError> {
        let tier = if options.high_accuracy {
            self.high_requests.fetch_add(1, Ordering::SeqCst);
            self.high.clone()
        } else {
            self.low_requests.fetch_add(1, Ordering::SeqCst);
            self.low.clone()
        };
        sleep(tier.delay).await;
        tier.result
    }

    fn watch_position(
        &self,
        _options: PositionOptions,
        sink: mpsc::UnboundedSender<Result<Position, LocationError>>,
    ) -> Result<WatchId, LocationError> {
        let mut watchers = self.watchers.lock().unwrap();
        watchers.push(sink);
        Ok(watchers.len() as WatchId)
    }

    fn clear_watch(&self, id: WatchId) {
        self.cleared.lock().unwrap().push(id);
    }
}

/// Records every render as the list of stop names shown.
#[derive(Default)]
pub struct RecordingStopLayer {
    pub renders: Mutex<Vec<Vec<String>>>,
    pub handler: Mutex<Option<SelectHandler>>,
    pub departures: Mutex<Vec<(String, TransportType, Result<Vec<Departure>, EnrichmentError>)>>,
}

impl RecordingStopLayer {
    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    pub fn last_render(&self) -> Vec<String> {
        self.renders.lock().unwrap().last().cloned().unwrap_or_default()
    }

    /// Simulates a click on the marker for `stop`.
    pub fn select(&self, stop: &Stop) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(stop);
        }
    }
}

impl StopLayer for RecordingStopLayer {
    fn show_stops(&self, stops: &[Ranked<'_, Stop>], on_select: SelectHandler) {
        let names = stops.iter().map(|ranked| ranked.item.name.to_string()).collect();
        self.renders.lock().unwrap().push(names);
        *self.handler.lock().unwrap() = Some(on_select);
    }
}

impl DepartureView for RecordingStopLayer {
    fn show_departures(
        &self,
        stop: &Stop,
        transport: TransportType,
        departures: Result<Vec<Departure>, EnrichmentError>,
    ) {
        self.departures
            .lock()
            .unwrap()
            .push((stop.name.to_string(), transport, departures));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerEvent {
    Add(String),
    Refresh(String, f64),
    Animate(String, Tween),
    Remove(String),
}

pub struct FakeAnimation(pub Arc<AtomicBool>);

impl Animation for FakeAnimation {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingVehicleLayer {
    pub events: Mutex<Vec<MarkerEvent>>,
    /// One flag per animation started, set when it gets cancelled.
    pub animations: Mutex<Vec<Arc<AtomicBool>>>,
}

impl RecordingVehicleLayer {
    pub fn events(&self) -> Vec<MarkerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<bool> {
        self.animations
            .lock()
            .unwrap()
            .iter()
            .map(|flag| flag.load(Ordering::SeqCst))
            .collect()
    }
}

impl VehicleLayer for RecordingVehicleLayer {
    type Animation = FakeAnimation;

    fn add_marker(&self, vehicle: &Vehicle, _heading: f64) {
        self.events
            .lock()
            .unwrap()
            .push(MarkerEvent::Add(vehicle.id.to_string()));
    }

    fn refresh_marker(&self, vehicle: &Vehicle, heading: f64) {
        self.events
            .lock()
            .unwrap()
            .push(MarkerEvent::Refresh(vehicle.id.to_string(), heading));
    }

    fn animate_marker(&self, vehicle: &Vehicle, _heading: f64, tween: Tween) -> FakeAnimation {
        self.events
            .lock()
            .unwrap()
            .push(MarkerEvent::Animate(vehicle.id.to_string(), tween));
        let flag = Arc::new(AtomicBool::new(false));
        self.animations.lock().unwrap().push(flag.clone());
        FakeAnimation(flag)
    }

    fn remove_marker(&self, id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(MarkerEvent::Remove(id.to_string()));
    }
}
