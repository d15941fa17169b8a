use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use chrono::Local;
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::{debug, warn};

use crate::{
    api::{self, TransitApi},
    cache::{self, StopCache},
    departures::{Departure, departures, directions},
    filter,
    location::{Geolocation, LocationError, LocationProvider},
    models::{Stop, TransportType},
    shared::geo::Distance,
    state::{LoadingUpdate, UiState},
    store::SnapshotStore,
};

pub const LOCATING_MESSAGE: &str = "Locating...";
pub const SEARCHING_MESSAGE: &str = "Searching for nearby stops...";
pub const LOCATION_ERROR: &str = "Location unavailable";
pub const STOPS_ERROR: &str = "Failed to load stops";

#[derive(Error, Debug, Clone)]
pub enum LoadError {
    #[error("Location error: {0}")]
    Location(#[from] LocationError),
    #[error("Stop error: {0}")]
    Stops(#[from] cache::Error),
}

/// Departure data for one stop could not be loaded. Only ever affects that
/// stop.
#[derive(Error, Debug, Clone)]
pub enum EnrichmentError {
    #[error("Failed to load stop times for {stop}: {source}")]
    Fetch {
        stop: String,
        source: Arc<api::Error>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    #[default]
    Idle,
    AcquiringLocation,
    LoadingStops,
    LoadingEnrichment,
    Settled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StopDetails {
    pub directions: Vec<Arc<str>>,
    pub departures: Vec<Departure>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Enrichment {
    #[default]
    Loading,
    Ready(StopDetails),
    Unavailable,
}

/// A stop near the user, with annotations private to this load cycle.
#[derive(Debug, Clone)]
pub struct NearbyStop {
    pub stop: Stop,
    pub distance: Distance,
    pub enrichment: Enrichment,
}

type EnrichmentUpdate = (usize, Result<StopDetails, EnrichmentError>);

/// One load cycle's handle on the shared phase. Only the latest cycle may
/// move it; an older cycle finishing late leaves it alone.
#[derive(Clone)]
struct Cycle {
    phase: Arc<watch::Sender<LoadPhase>>,
    latest: Arc<AtomicU64>,
    id: u64,
}

impl Cycle {
    fn enter(&self, phase: LoadPhase) {
        self.phase.send_if_modified(|current| {
            if self.latest.load(Ordering::SeqCst) != self.id || *current == phase {
                return false;
            }
            debug!("Load cycle {}: {phase:?}", self.id);
            *current = phase;
            true
        });
    }
}

/// The nearest stops, available immediately, with their enrichment
/// arriving in the background. The cycle settles once every enrichment
/// has finished, or when this is dropped, which aborts whatever is still
/// outstanding.
pub struct NearbyStops {
    pub stops: Vec<NearbyStop>,
    updates: mpsc::UnboundedReceiver<EnrichmentUpdate>,
    _tasks: JoinSet<()>,
    cycle: Cycle,
}

impl Drop for NearbyStops {
    fn drop(&mut self) {
        self.cycle.enter(LoadPhase::Settled);
    }
}

impl NearbyStops {
    /// Applies the next finished enrichment to its stop and returns the
    /// stop's index, or `None` once every stop has settled.
    pub async fn next_enrichment(&mut self) -> Option<usize> {
        match self.updates.recv().await {
            Some((index, result)) => {
                let stop = self.stops.get_mut(index)?;
                stop.enrichment = match result {
                    Ok(details) => Enrichment::Ready(details),
                    Err(_) => Enrichment::Unavailable,
                };
                Some(index)
            }
            None => None,
        }
    }

    pub async fn enrich_all(&mut self) {
        while self.next_enrichment().await.is_some() {}
    }
}

pub struct LoadingCoordinator<A, S, G> {
    api: Arc<A>,
    cache: StopCache<A, S>,
    location: Arc<LocationProvider<G>>,
    ui: UiState,
    nearest_count: usize,
    departure_horizon: Duration,
    phase: Arc<watch::Sender<LoadPhase>>,
    cycles: Arc<AtomicU64>,
}

impl<A, S, G> LoadingCoordinator<A, S, G>
where
    A: TransitApi,
    S: SnapshotStore,
    G: Geolocation,
{
    pub fn new(
        api: Arc<A>,
        cache: StopCache<A, S>,
        location: Arc<LocationProvider<G>>,
        ui: UiState,
        nearest_count: usize,
        departure_horizon: Duration,
    ) -> Self {
        Self {
            api,
            cache,
            location,
            ui,
            nearest_count,
            departure_horizon,
            phase: Arc::new(watch::Sender::new(LoadPhase::Idle)),
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn phase(&self) -> LoadPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<LoadPhase> {
        self.phase.subscribe()
    }

    /// One load cycle: locate, pick the nearest stops serving `transport`,
    /// return them, then enrich each one independently.
    ///
    /// Location and stop list failures end the cycle and surface in the UI
    /// error state. Nothing is retried here; calling again starts over.
    pub async fn load_nearest_stops(
        &self,
        transport: TransportType,
    ) -> Result<NearbyStops, LoadError> {
        let cycle = self.begin();
        cycle.enter(LoadPhase::AcquiringLocation);
        self.ui.set_loading(LoadingUpdate {
            is_loading: Some(true),
            is_loading_location: Some(true),
            message: Some(LOCATING_MESSAGE.into()),
        });
        self.ui.set_error(None);

        let position = match self.location.current_position().await {
            Ok(position) => position,
            Err(err) => return Err(self.fail(&cycle, LOCATION_ERROR, err.into())),
        };

        cycle.enter(LoadPhase::LoadingStops);
        self.ui.set_loading(LoadingUpdate {
            is_loading_location: Some(false),
            message: Some(SEARCHING_MESSAGE.into()),
            ..Default::default()
        });

        let stops = match self.cache.stops().await {
            Ok(stops) => stops,
            Err(err) => return Err(self.fail(&cycle, STOPS_ERROR, err.into())),
        };
        let serving: Vec<&Stop> = stops.iter().filter(|stop| stop.serves(transport)).collect();
        let nearest: Vec<NearbyStop> =
            filter::nearest(&serving, &position.coordinate, self.nearest_count)
                .into_iter()
                .map(|ranked| NearbyStop {
                    stop: ranked.item.clone(),
                    distance: ranked.distance,
                    enrichment: Enrichment::Loading,
                })
                .collect();

        self.ui.set_loading(LoadingUpdate {
            is_loading: Some(false),
            message: Some(String::new()),
            ..Default::default()
        });
        cycle.enter(LoadPhase::LoadingEnrichment);
        Ok(self.enrich(nearest, transport, cycle))
    }

    /// Upcoming departures for one stop, fetched now.
    pub async fn load_departures(
        &self,
        stop: &Stop,
        transport: TransportType,
    ) -> Result<Vec<Departure>, EnrichmentError> {
        let details = stop_details(&*self.api, stop, transport, self.departure_horizon).await?;
        Ok(details.departures)
    }

    pub async fn load_directions(
        &self,
        stop: &Stop,
        transport: TransportType,
    ) -> Result<Vec<Arc<str>>, EnrichmentError> {
        let details = stop_details(&*self.api, stop, transport, self.departure_horizon).await?;
        Ok(details.directions)
    }

    fn enrich(&self, stops: Vec<NearbyStop>, transport: TransportType, cycle: Cycle) -> NearbyStops {
        let (sink, updates) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        if stops.is_empty() {
            cycle.enter(LoadPhase::Settled);
        }
        let pending = Arc::new(AtomicUsize::new(stops.len()));
        for (index, nearby) in stops.iter().enumerate() {
            let api = self.api.clone();
            let stop = nearby.stop.clone();
            let sink = sink.clone();
            let horizon = self.departure_horizon;
            let pending = pending.clone();
            let cycle = cycle.clone();
            tasks.spawn(async move {
                let result = stop_details(&*api, &stop, transport, horizon).await;
                if let Err(err) = &result {
                    warn!("{err}");
                }
                let _ = sink.send((index, result));
                if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                    cycle.enter(LoadPhase::Settled);
                }
            });
        }

        NearbyStops {
            stops,
            updates,
            _tasks: tasks,
            cycle,
        }
    }

    /// Starts a new cycle, making every earlier one stale.
    fn begin(&self) -> Cycle {
        let id = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        Cycle {
            phase: self.phase.clone(),
            latest: self.cycles.clone(),
            id,
        }
    }

    fn fail(&self, cycle: &Cycle, message: &str, err: LoadError) -> LoadError {
        warn!("Load cycle failed: {err}");
        self.ui.set_error(Some(message.into()));
        self.ui.set_loading(LoadingUpdate {
            is_loading: Some(false),
            is_loading_location: Some(false),
            message: Some(String::new()),
        });
        cycle.enter(LoadPhase::Failed);
        err
    }
}

async fn stop_details<A: TransitApi>(
    api: &A,
    stop: &Stop,
    transport: TransportType,
    horizon: Duration,
) -> Result<StopDetails, EnrichmentError> {
    let records = api
        .fetch_stop_times(&stop.name)
        .await
        .map_err(|err| EnrichmentError::Fetch {
            stop: stop.name.to_string(),
            source: Arc::new(err),
        })?;
    Ok(StopDetails {
        directions: directions(&records, &stop.id, transport),
        departures: departures(&records, &stop.id, transport, &Local::now(), horizon),
    })
}
