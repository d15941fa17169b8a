use std::{sync::Arc, time::Duration};

use chrono::Utc;
use futures_util::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use thiserror::Error;
use tokio::{sync::Mutex, task};
use tracing::{debug, info, warn};

use crate::{
    api::{self, TransitApi},
    models::Stop,
    store::{SnapshotStore, StopSnapshot},
};

/// Clonable so that every caller waiting on one fetch receives the same
/// failure.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Failed to fetch stops: {0}")]
    Fetch(Arc<api::Error>),
}

type Flight = Shared<BoxFuture<'static, Result<Arc<[Stop]>, Error>>>;

enum State {
    Empty,
    Loading(Flight),
    Loaded(StopSnapshot),
}

struct Inner<A, S> {
    api: Arc<A>,
    store: Arc<S>,
    max_age: Duration,
    state: Mutex<State>,
}

/// Process-wide cache of the full stop dataset.
///
/// At most one upstream fetch is outstanding at any time: callers arriving
/// while a fetch is in flight wait on that same fetch. A failed fetch
/// returns the cache to empty and publishes nothing.
pub struct StopCache<A, S> {
    inner: Arc<Inner<A, S>>,
}

impl<A, S> Clone for StopCache<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: TransitApi, S: SnapshotStore> StopCache<A, S> {
    pub fn new(api: Arc<A>, store: Arc<S>, max_age: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                max_age,
                state: Mutex::new(State::Empty),
            }),
        }
    }

    /// Every stop, loading them on first use. Safe to call from any number
    /// of consumers at once.
    pub async fn stops(&self) -> Result<Arc<[Stop]>, Error> {
        let flight = {
            let mut state = self.inner.state.lock().await;
            match &*state {
                State::Loaded(snapshot) if !snapshot.is_expired(Utc::now(), self.inner.max_age) => {
                    return Ok(snapshot.stops.clone());
                }
                State::Loading(flight) => flight.clone(),
                State::Loaded(_) => {
                    debug!("Stop cache expired, refetching");
                    self.start_flight(&mut state)
                }
                State::Empty => {
                    if let Some(snapshot) = self.warm_start() {
                        let stops = snapshot.stops.clone();
                        *state = State::Loaded(snapshot);
                        return Ok(stops);
                    }
                    self.start_flight(&mut state)
                }
            }
        };
        flight.await
    }

    pub async fn is_loaded(&self) -> bool {
        matches!(&*self.inner.state.lock().await, State::Loaded(_))
    }

    fn start_flight(&self, state: &mut State) -> Flight {
        let inner = self.inner.clone();
        let flight = async move { inner.fetch().await }.boxed().shared();
        *state = State::Loading(flight.clone());
        flight
    }

    fn warm_start(&self) -> Option<StopSnapshot> {
        match self.inner.store.load() {
            Ok(Some(snapshot)) if !snapshot.is_expired(Utc::now(), self.inner.max_age) => {
                info!("Loaded {} stops from snapshot", snapshot.stops.len());
                Some(snapshot)
            }
            Ok(Some(_)) => {
                debug!("Stop snapshot expired");
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!("Failed to read stop snapshot: {err}");
                None
            }
        }
    }
}

impl<A: TransitApi, S: SnapshotStore> Inner<A, S> {
    /// Runs once per flight, however many callers share it.
    async fn fetch(&self) -> Result<Arc<[Stop]>, Error> {
        info!("Fetching stops...");
        match self.api.fetch_stops().await {
            Ok(stops) => {
                let snapshot = StopSnapshot::new(stops.into(), Utc::now());
                info!("Fetched {} stops", snapshot.stops.len());
                let stops = snapshot.stops.clone();
                *self.state.lock().await = State::Loaded(snapshot.clone());
                self.persist(snapshot).await;
                Ok(stops)
            }
            Err(err) => {
                warn!("Failed to fetch stops: {err}");
                *self.state.lock().await = State::Empty;
                Err(Error::Fetch(Arc::new(err)))
            }
        }
    }

    /// Writes the snapshot off the async workers, with the state unlocked.
    async fn persist(&self, snapshot: StopSnapshot) {
        let store = self.store.clone();
        match task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => debug!("Saved stop snapshot"),
            Ok(Err(err)) => warn!("Failed to save stop snapshot: {err}"),
            Err(err) => warn!("Stop snapshot writer failed: {err}"),
        }
    }
}
