use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::models::TransportType;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingState {
    pub is_loading: bool,
    pub is_loading_location: bool,
    pub message: String,
}

/// Partial change to [`LoadingState`]; `None` fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct LoadingUpdate {
    pub is_loading: Option<bool>,
    pub is_loading_location: Option<bool>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Tram,
    Bus,
    Map,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TabState {
    pub active: Tab,
    /// Last tram/bus tab, kept while the map tab is showing.
    pub transport: TransportType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Loading(LoadingState),
    Error(Option<String>),
    Tab(TabState),
}

struct Inner {
    loading: watch::Sender<LoadingState>,
    error: watch::Sender<Option<String>>,
    tabs: watch::Sender<TabState>,
    events: broadcast::Sender<UiEvent>,
}

/// Status projection the presentation layer renders from. Holds no entity
/// data. Cloning shares the same state.
#[derive(Clone)]
pub struct UiState {
    inner: Arc<Inner>,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

impl UiState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                loading: watch::Sender::new(LoadingState::default()),
                error: watch::Sender::new(None),
                tabs: watch::Sender::new(TabState::default()),
                events,
            }),
        }
    }

    pub fn loading(&self) -> LoadingState {
        self.inner.loading.borrow().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.error.borrow().clone()
    }

    pub fn tabs(&self) -> TabState {
        *self.inner.tabs.borrow()
    }

    pub fn watch_loading(&self) -> watch::Receiver<LoadingState> {
        self.inner.loading.subscribe()
    }

    pub fn watch_error(&self) -> watch::Receiver<Option<String>> {
        self.inner.error.subscribe()
    }

    /// Every change, in order, from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.inner.events.subscribe()
    }

    pub fn set_loading(&self, update: LoadingUpdate) {
        self.inner.loading.send_modify(|state| {
            if let Some(is_loading) = update.is_loading {
                state.is_loading = is_loading;
            }
            if let Some(is_loading_location) = update.is_loading_location {
                state.is_loading_location = is_loading_location;
            }
            if let Some(message) = update.message {
                state.message = message;
            }
        });
        self.emit(UiEvent::Loading(self.loading()));
    }

    pub fn set_error(&self, error: Option<String>) {
        self.inner.error.send_replace(error.clone());
        self.emit(UiEvent::Error(error));
    }

    /// Selecting tram or bus also remembers it as the transport tab.
    pub fn set_active_tab(&self, tab: Tab) {
        self.inner.tabs.send_modify(|state| {
            state.active = tab;
            match tab {
                Tab::Tram => state.transport = TransportType::Tram,
                Tab::Bus => state.transport = TransportType::Bus,
                Tab::Map => {}
            }
        });
        self.emit(UiEvent::Tab(self.tabs()));
    }

    pub fn set_transport_tab(&self, transport: TransportType) {
        self.inner
            .tabs
            .send_modify(|state| state.transport = transport);
        self.emit(UiEvent::Tab(self.tabs()));
    }

    fn emit(&self, event: UiEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

#[test]
fn partial_loading_update_merges() {
    let state = UiState::new();
    state.set_loading(LoadingUpdate {
        is_loading: Some(true),
        is_loading_location: Some(true),
        message: Some("locating".into()),
    });
    state.set_loading(LoadingUpdate {
        is_loading_location: Some(false),
        ..Default::default()
    });
    assert_eq!(
        state.loading(),
        LoadingState {
            is_loading: true,
            is_loading_location: false,
            message: "locating".into(),
        }
    );
}

#[test]
fn map_tab_keeps_transport() {
    let state = UiState::new();
    state.set_active_tab(Tab::Bus);
    state.set_active_tab(Tab::Map);
    assert_eq!(
        state.tabs(),
        TabState {
            active: Tab::Map,
            transport: TransportType::Bus,
        }
    );
}
