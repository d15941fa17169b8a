use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, warn};

use crate::{
    api::TransitApi,
    config::Config,
    models::Vehicle,
    shared::geo::{Bounds, Coordinate, Viewport},
    tween::{Tween, TweenHandle},
};

/// A marker animation that can be stopped midway.
pub trait Animation: Send + 'static {
    fn cancel(&self);
}

impl Animation for TweenHandle {
    fn cancel(&self) {
        TweenHandle::cancel(self);
    }
}

/// Where vehicle markers are drawn.
pub trait VehicleLayer: Send + Sync + 'static {
    type Animation: Animation;

    fn add_marker(&self, vehicle: &Vehicle, heading: f64);

    /// Same position, new icon orientation and popup details.
    fn refresh_marker(&self, vehicle: &Vehicle, heading: f64);

    /// Moves an existing marker along `tween`, updating its icon first.
    fn animate_marker(&self, vehicle: &Vehicle, heading: f64, tween: Tween) -> Self::Animation;

    fn remove_marker(&self, id: &str);
}

/// Icon rotation for a compass bearing. The icon artwork points east, and
/// headings that would draw it upside down are flipped by 180 degrees.
pub fn icon_heading(bearing: f64) -> f64 {
    let heading = (bearing - 90.0).rem_euclid(360.0);
    if heading > 90.0 && heading < 270.0 {
        (heading + 180.0).rem_euclid(360.0)
    } else {
        heading
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub moved: usize,
    pub refreshed: usize,
    pub removed: usize,
}

struct Tracked<H> {
    /// Where the marker is heading, i.e. the last reported position. Not
    /// the drawn position: a move that cancels a running animation starts
    /// the next one from here, so the marker can jump by what was left of
    /// the previous tween.
    position: Coordinate,
    animation: Option<H>,
    vehicle: Vehicle,
}

/// Diffs each poll against the markers on screen. Keyed by vehicle id, so
/// a vehicle keeps one marker for as long as it stays reported and in view.
pub struct VehicleTracker<L: VehicleLayer> {
    layer: Arc<L>,
    tracked: HashMap<Arc<str>, Tracked<L::Animation>>,
    padding: f64,
    movement_threshold_m: f64,
    animation: Duration,
}

impl<L: VehicleLayer> VehicleTracker<L> {
    pub fn new(layer: Arc<L>, padding: f64, movement_threshold_m: f64, animation: Duration) -> Self {
        Self {
            layer,
            tracked: HashMap::new(),
            padding,
            movement_threshold_m,
            animation,
        }
    }

    pub fn from_config(layer: Arc<L>, config: &Config) -> Self {
        Self::new(
            layer,
            config.vehicle_bounds_padding,
            config.movement_threshold_m,
            config.marker_animation,
        )
    }

    /// Applies one poll. Vehicles outside the padded `viewport` count as
    /// absent, and absent vehicles lose their marker.
    pub fn reconcile(&mut self, vehicles: &[Vehicle], viewport: &Bounds) -> ReconcileSummary {
        let bounds = viewport.pad(self.padding);
        let mut summary = ReconcileSummary::default();
        let mut active: HashSet<Arc<str>> = HashSet::new();

        for vehicle in vehicles.iter().filter(|v| bounds.contains(&v.coordinate)) {
            // Duplicate ids within one poll: first report wins.
            if !active.insert(vehicle.id.clone()) {
                continue;
            }
            let heading = icon_heading(vehicle.bearing);
            match self.tracked.get_mut(&vehicle.id) {
                Some(entry) => {
                    let moved = entry.position.distance(&vehicle.coordinate);
                    if moved.as_meters() > self.movement_threshold_m {
                        if let Some(animation) = entry.animation.take() {
                            animation.cancel();
                        }
                        let tween = Tween::new(entry.position, vehicle.coordinate, self.animation);
                        entry.animation = Some(self.layer.animate_marker(vehicle, heading, tween));
                        entry.position = vehicle.coordinate;
                        summary.moved += 1;
                    } else {
                        self.layer.refresh_marker(vehicle, heading);
                        summary.refreshed += 1;
                    }
                    entry.vehicle = vehicle.clone();
                }
                None => {
                    self.layer.add_marker(vehicle, heading);
                    self.tracked.insert(
                        vehicle.id.clone(),
                        Tracked {
                            position: vehicle.coordinate,
                            animation: None,
                            vehicle: vehicle.clone(),
                        },
                    );
                    summary.added += 1;
                }
            }
        }

        let gone: Vec<Arc<str>> = self
            .tracked
            .keys()
            .filter(|id| !active.contains(*id))
            .cloned()
            .collect();
        for id in gone {
            self.remove(&id);
            summary.removed += 1;
        }
        summary
    }

    /// Drops every marker, e.g. when the map closes.
    pub fn clear(&mut self) {
        let ids: Vec<Arc<str>> = self.tracked.keys().cloned().collect();
        for id in ids {
            self.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<Coordinate> {
        self.tracked.get(id).map(|entry| entry.position)
    }

    pub fn vehicle(&self, id: &str) -> Option<&Vehicle> {
        self.tracked.get(id).map(|entry| &entry.vehicle)
    }

    fn remove(&mut self, id: &str) {
        if let Some(entry) = self.tracked.remove(id) {
            if let Some(animation) = entry.animation {
                animation.cancel();
            }
            self.layer.remove_marker(id);
        }
    }
}

/// Polls live vehicles on a fixed interval and feeds each result to a
/// [`VehicleTracker`]. A failed poll is logged and skipped; the markers
/// already on screen stay as they are.
pub struct VehicleReconciler<L: VehicleLayer> {
    tracker: Arc<Mutex<VehicleTracker<L>>>,
    task: Option<JoinHandle<()>>,
}

impl<L: VehicleLayer> VehicleReconciler<L> {
    /// The first poll runs immediately.
    pub fn spawn<A: TransitApi>(
        api: Arc<A>,
        tracker: VehicleTracker<L>,
        viewport: watch::Receiver<Viewport>,
        period: Duration,
    ) -> Self {
        let tracker = Arc::new(Mutex::new(tracker));
        let task = tokio::spawn(poll_loop(api, tracker.clone(), viewport, period));
        Self {
            tracker,
            task: Some(task),
        }
    }

    pub fn tracker(&self) -> &Arc<Mutex<VehicleTracker<L>>> {
        &self.tracker
    }

    /// Stops polling. Markers stay until [`VehicleReconciler::shutdown`].
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub async fn shutdown(mut self) {
        self.stop();
        self.tracker.lock().await.clear();
    }
}

impl<L: VehicleLayer> Drop for VehicleReconciler<L> {
    fn drop(&mut self) {
        self.stop();
        match self.tracker.try_lock() {
            Ok(mut tracker) => tracker.clear(),
            Err(_) => debug!("Vehicle tracker locked on drop, markers not cleared"),
        }
    }
}

async fn poll_loop<A, L>(
    api: Arc<A>,
    tracker: Arc<Mutex<VehicleTracker<L>>>,
    viewport: watch::Receiver<Viewport>,
    period: Duration,
) where
    A: TransitApi,
    L: VehicleLayer,
{
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        match api.fetch_active_vehicles().await {
            Ok(vehicles) => {
                let bounds = viewport.borrow().bounds;
                let summary = tracker.lock().await.reconcile(&vehicles, &bounds);
                debug!(
                    "Vehicles: {} added, {} moved, {} refreshed, {} removed",
                    summary.added, summary.moved, summary.refreshed, summary.removed
                );
            }
            Err(err) => warn!("Failed to poll vehicles: {err}"),
        }
    }
}

#[test]
fn icon_heading_test() {
    let table = [
        (0.0, 270.0),
        (45.0, 315.0),
        (90.0, 0.0),
        (135.0, 45.0),
        (180.0, 90.0),
        (225.0, 315.0),
        (270.0, 0.0),
        (315.0, 45.0),
    ];
    for (bearing, heading) in table {
        assert_eq!(icon_heading(bearing), heading, "bearing {bearing}");
    }
}
