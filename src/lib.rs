pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod departures;
pub mod filter;
pub mod fleet;
pub mod loading;
pub mod location;
pub mod models;
pub mod shared;
pub mod state;
pub mod store;
pub mod tween;
pub mod vehicles;
pub mod visibility;

pub mod prelude {
    pub use crate::api::{HttpTransitApi, TransitApi};
    pub use crate::app::{DepartureView, MapSession, TransitApp};
    pub use crate::cache::StopCache;
    pub use crate::config::Config;
    pub use crate::loading::{LoadingCoordinator, NearbyStop, NearbyStops};
    pub use crate::location::{Geolocation, LocationProvider};
    pub use crate::models::{Stop, TransportType, Vehicle};
    pub use crate::shared::geo::{Bounds, Coordinate, Distance, Viewport};
    pub use crate::state::UiState;
    pub use crate::store::{MemorySnapshotStore, SnapshotStore, ZipSnapshotStore};
    pub use crate::vehicles::{VehicleLayer, VehicleReconciler};
    pub use crate::visibility::{StopLayer, VisibilityController};
}
