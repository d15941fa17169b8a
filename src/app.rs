use std::sync::{Arc, Mutex, Weak};

use tokio::{
    runtime::Handle,
    sync::{OnceCell, watch},
    task::JoinSet,
};
use tracing::{debug, info};

use crate::{
    api::{self, TransitApi},
    cache::StopCache,
    config::Config,
    departures::Departure,
    fleet::FleetIndex,
    loading::{EnrichmentError, LoadError, LoadingCoordinator, NearbyStops},
    location::{Geolocation, LocationProvider},
    models::{Stop, TransportType},
    shared::geo::Viewport,
    state::{Tab, UiState},
    store::SnapshotStore,
    vehicles::{VehicleLayer, VehicleReconciler, VehicleTracker},
    visibility::{SelectHandler, StopLayer, VisibilityController, VisibilitySettings},
};

/// Receives the departures loaded after a stop marker was picked.
pub trait DepartureView: Send + Sync + 'static {
    fn show_departures(
        &self,
        stop: &Stop,
        transport: TransportType,
        departures: Result<Vec<Departure>, EnrichmentError>,
    );
}

/// Wires the components together. One per running client.
pub struct TransitApp<A, S, G> {
    config: Config,
    api: Arc<A>,
    ui: UiState,
    cache: StopCache<A, S>,
    coordinator: Arc<LoadingCoordinator<A, S, G>>,
    fleet: OnceCell<Arc<FleetIndex>>,
}

impl<A, S, G> TransitApp<A, S, G>
where
    A: TransitApi,
    S: SnapshotStore,
    G: Geolocation,
{
    pub fn new(config: Config, api: Arc<A>, store: Arc<S>, platform: Arc<G>) -> Self {
        let ui = UiState::new();
        let cache = StopCache::new(api.clone(), store, config.stop_cache_max_age);
        let location = Arc::new(LocationProvider::new(platform, config.location.clone()));
        let coordinator = Arc::new(LoadingCoordinator::new(
            api.clone(),
            cache.clone(),
            location,
            ui.clone(),
            config.nearest_stop_count,
            config.departure_horizon,
        ));
        Self {
            config,
            api,
            ui,
            cache,
            coordinator,
            fleet: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn cache(&self) -> &StopCache<A, S> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<LoadingCoordinator<A, S, G>> {
        &self.coordinator
    }

    /// Loads the nearest stops for the transport tab currently selected.
    pub async fn load_nearest_stops(&self) -> Result<NearbyStops, LoadError> {
        let transport = self.ui.tabs().transport;
        self.coordinator.load_nearest_stops(transport).await
    }

    /// Fleet metadata, fetched on first use and kept for the app's lifetime.
    pub async fn fleet(&self) -> Result<Arc<FleetIndex>, api::Error> {
        self.fleet
            .get_or_try_init(|| async { FleetIndex::load(&*self.api).await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Starts stop visibility and vehicle tracking for a map showing
    /// `viewport`. Both stop, along with any departure loads started from
    /// a stop marker, when the returned session is shut down or dropped.
    /// Must be called from within a Tokio runtime.
    pub fn open_map<SL, VL>(
        &self,
        viewport: Viewport,
        stop_layer: Arc<SL>,
        vehicle_layer: Arc<VL>,
    ) -> MapSession<VL>
    where
        SL: StopLayer + DepartureView,
        VL: VehicleLayer,
    {
        info!("Opening map at {}", viewport.center());
        self.ui.set_active_tab(Tab::Map);
        let (sender, receiver) = watch::channel(viewport);

        let selections = Arc::new(Mutex::new(JoinSet::new()));
        let on_select = self.select_handler(stop_layer.clone(), Arc::downgrade(&selections));
        let visibility = VisibilityController::spawn(
            self.cache.clone(),
            stop_layer,
            receiver.clone(),
            on_select,
            VisibilitySettings::from(&self.config),
        );
        let vehicles = VehicleReconciler::spawn(
            self.api.clone(),
            VehicleTracker::from_config(vehicle_layer, &self.config),
            receiver,
            self.config.vehicle_poll_interval,
        );

        MapSession {
            viewport: sender,
            visibility,
            vehicles,
            selections,
        }
    }

    /// Selections after the session is gone are ignored.
    fn select_handler<V: DepartureView>(
        &self,
        view: Arc<V>,
        selections: Weak<Mutex<JoinSet<()>>>,
    ) -> SelectHandler {
        let coordinator = self.coordinator.clone();
        let runtime = Handle::current();
        Arc::new(move |stop: &Stop| {
            let Some(selections) = selections.upgrade() else {
                debug!("Map closed, ignoring selection of {}", stop.name);
                return;
            };
            let Ok(mut tasks) = selections.lock() else {
                return;
            };
            while tasks.try_join_next().is_some() {}

            let transport = departure_transport(stop);
            let coordinator = coordinator.clone();
            let view = view.clone();
            let stop = stop.clone();
            tasks.spawn_on(
                async move {
                    let departures = coordinator.load_departures(&stop, transport).await;
                    view.show_departures(&stop, transport, departures);
                },
                &runtime,
            );
        })
    }
}

/// Tram departures for any stop trams serve, bus otherwise.
fn departure_transport(stop: &Stop) -> TransportType {
    if stop.tram {
        TransportType::Tram
    } else {
        TransportType::Bus
    }
}

/// A map that is open.
pub struct MapSession<L: VehicleLayer> {
    viewport: watch::Sender<Viewport>,
    visibility: VisibilityController,
    vehicles: VehicleReconciler<L>,
    /// Departure loads started from stop markers. Dropped with the session,
    /// which aborts them.
    selections: Arc<Mutex<JoinSet<()>>>,
}

impl<L: VehicleLayer> MapSession<L> {
    /// Reports a pan or zoom. Stop markers follow after the debounce, the
    /// next vehicle poll uses the new bounds.
    pub fn set_viewport(&self, viewport: Viewport) {
        self.viewport.send_replace(viewport);
    }

    pub fn viewport(&self) -> Viewport {
        *self.viewport.borrow()
    }

    pub fn vehicles(&self) -> &VehicleReconciler<L> {
        &self.vehicles
    }

    /// Stops both loops, aborts pending departure loads and removes every
    /// vehicle marker.
    pub async fn shutdown(self) {
        drop(self.selections);
        self.visibility.stop();
        self.vehicles.shutdown().await;
    }
}

#[test]
fn departure_transport_test() {
    let bus_only = Stop {
        bus: true,
        ..Default::default()
    };
    let tram_only = Stop {
        tram: true,
        ..Default::default()
    };
    let both = Stop {
        tram: true,
        bus: true,
        ..Default::default()
    };
    assert_eq!(departure_transport(&bus_only), TransportType::Bus);
    assert_eq!(departure_transport(&tram_only), TransportType::Tram);
    assert_eq!(departure_transport(&both), TransportType::Tram);
}
