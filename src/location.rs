use std::{future::Future, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    sync::mpsc,
    time::{sleep, timeout},
};
use tracing::{debug, warn};

use crate::{config::LocationConfig, shared::geo::Coordinate};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Geolocation is not supported on this platform")]
    Unsupported,
    #[error("Permission to read the location was denied")]
    PermissionDenied,
    #[error("Location unavailable: {0}")]
    Unavailable(String),
    #[error("Timed out waiting for a location")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coordinate: Coordinate,
    pub accuracy_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the platform may answer with.
    pub maximum_age: Duration,
}

pub type WatchId = u64;

/// The device's location capability.
pub trait Geolocation: Send + Sync + 'static {
    fn is_supported(&self) -> bool {
        true
    }

    fn current_position(
        &self,
        options: PositionOptions,
    ) -> impl Future<Output = Result<Position, LocationError>> + Send;

    /// Starts pushing every platform update into `sink` until
    /// [`Geolocation::clear_watch`] is called with the returned id.
    fn watch_position(
        &self,
        options: PositionOptions,
        sink: mpsc::UnboundedSender<Result<Position, LocationError>>,
    ) -> Result<WatchId, LocationError>;

    fn clear_watch(&self, id: WatchId);
}

/// Wraps a [`Geolocation`] with the two tier high/low accuracy race.
pub struct LocationProvider<G> {
    platform: Arc<G>,
    config: LocationConfig,
}

impl<G: Geolocation> LocationProvider<G> {
    pub fn new(platform: Arc<G>, config: LocationConfig) -> Self {
        Self { platform, config }
    }

    /// Resolves exactly once.
    ///
    /// A high accuracy request is started together with a fallback timer.
    /// Whichever of {high accuracy failure, timer} comes first starts a
    /// single low accuracy request; from then on the first tier to succeed
    /// wins. Fails only when both tiers fail.
    pub async fn current_position(&self) -> Result<Position, LocationError> {
        if !self.platform.is_supported() {
            warn!("Geolocation is not supported");
            return Err(LocationError::Unsupported);
        }

        let high = tier(&*self.platform, self.config.high_accuracy);
        tokio::pin!(high);
        let fallback = sleep(self.config.fallback_after);
        tokio::pin!(fallback);

        let high_failed = tokio::select! {
            biased;
            result = &mut high => match result {
                Ok(position) => return Ok(position),
                Err(err) => {
                    debug!("High accuracy location failed: {err}");
                    true
                }
            },
            _ = &mut fallback => {
                debug!("High accuracy location still pending, starting low accuracy");
                false
            }
        };

        let low = tier(&*self.platform, self.config.low_accuracy);
        tokio::pin!(low);

        let result = if high_failed {
            low.await
        } else {
            tokio::select! {
                result = &mut high => match result {
                    Ok(position) => Ok(position),
                    Err(_) => low.await,
                },
                result = &mut low => match result {
                    Ok(position) => Ok(position),
                    Err(err) => high.await.map_err(|_| err),
                },
            }
        };

        if let Err(err) = &result {
            warn!("Could not determine location: {err}");
        }
        result
    }

    /// Subscribes to continuous updates. The platform watch is released when
    /// the returned handle is dropped or cancelled.
    pub fn watch_position(&self) -> Result<PositionWatch<G>, LocationError> {
        if !self.platform.is_supported() {
            return Err(LocationError::Unsupported);
        }
        let (sink, updates) = mpsc::unbounded_channel();
        let id = self.platform.watch_position(self.config.watch, sink)?;
        debug!("Started position watch {id}");
        Ok(PositionWatch {
            platform: self.platform.clone(),
            id,
            updates,
        })
    }
}

async fn tier<G: Geolocation>(
    platform: &G,
    options: PositionOptions,
) -> Result<Position, LocationError> {
    match timeout(options.timeout, platform.current_position(options)).await {
        Ok(result) => result,
        Err(_) => Err(LocationError::Timeout),
    }
}

pub struct PositionWatch<G: Geolocation> {
    platform: Arc<G>,
    id: WatchId,
    updates: mpsc::UnboundedReceiver<Result<Position, LocationError>>,
}

impl<G: Geolocation> PositionWatch<G> {
    /// `None` once the platform stops emitting.
    pub async fn next(&mut self) -> Option<Result<Position, LocationError>> {
        self.updates.recv().await
    }

    pub fn cancel(self) {}
}

impl<G: Geolocation> Drop for PositionWatch<G> {
    fn drop(&mut self) {
        debug!("Clearing position watch {}", self.id);
        self.platform.clear_watch(self.id);
    }
}
