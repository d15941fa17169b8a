use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, warn};

use crate::{
    api::TransitApi,
    cache::StopCache,
    config::{Config, ZoomCaps},
    filter::{self, Ranked},
    models::Stop,
    shared::geo::Viewport,
    store::SnapshotStore,
};

/// Invoked when the user picks a stop marker.
pub type SelectHandler = Arc<dyn Fn(&Stop) + Send + Sync>;

/// Where stop markers are drawn.
pub trait StopLayer: Send + Sync + 'static {
    /// Replaces whatever stops are shown with `stops`, nearest the
    /// viewport center first.
    fn show_stops(&self, stops: &[Ranked<'_, Stop>], on_select: SelectHandler);
}

#[derive(Debug, Clone, Copy)]
pub struct VisibilitySettings {
    pub padding: f64,
    pub caps: ZoomCaps,
    pub debounce: Duration,
}

impl From<&Config> for VisibilitySettings {
    fn from(config: &Config) -> Self {
        Self {
            padding: config.stop_bounds_padding,
            caps: config.zoom_caps,
            debounce: config.viewport_debounce,
        }
    }
}

/// Keeps the stop layer in sync with the viewport. Renders once on start,
/// then once per burst of viewport changes after the burst has been quiet
/// for the debounce period.
pub struct VisibilityController {
    task: JoinHandle<()>,
}

impl VisibilityController {
    pub fn spawn<A, S, L>(
        cache: StopCache<A, S>,
        layer: Arc<L>,
        viewport: watch::Receiver<Viewport>,
        on_select: SelectHandler,
        settings: VisibilitySettings,
    ) -> Self
    where
        A: TransitApi,
        S: SnapshotStore,
        L: StopLayer,
    {
        let task = tokio::spawn(run(cache, layer, viewport, on_select, settings));
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for VisibilityController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<A, S, L>(
    cache: StopCache<A, S>,
    layer: Arc<L>,
    mut viewport: watch::Receiver<Viewport>,
    on_select: SelectHandler,
    settings: VisibilitySettings,
) where
    A: TransitApi,
    S: SnapshotStore,
    L: StopLayer,
{
    let current = *viewport.borrow_and_update();
    render(&cache, &*layer, &current, &on_select, &settings).await;

    // At most one render is ever pending.
    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            changed = viewport.changed() => {
                if changed.is_err() {
                    break;
                }
                deadline = Some(Instant::now() + settings.debounce);
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                let current = *viewport.borrow_and_update();
                render(&cache, &*layer, &current, &on_select, &settings).await;
            }
        }
    }
}

async fn render<A, S, L>(
    cache: &StopCache<A, S>,
    layer: &L,
    viewport: &Viewport,
    on_select: &SelectHandler,
    settings: &VisibilitySettings,
) where
    A: TransitApi,
    S: SnapshotStore,
    L: StopLayer,
{
    let stops = match cache.stops().await {
        Ok(stops) => stops,
        Err(err) => {
            warn!("Cannot update visible stops: {err}");
            return;
        }
    };
    let visible = filter::visible(
        &stops,
        &viewport.bounds,
        settings.padding,
        viewport.zoom,
        &settings.caps,
    );
    debug!("Showing {} of {} stops", visible.len(), stops.len());
    layer.show_stops(&visible, on_select.clone());
}
