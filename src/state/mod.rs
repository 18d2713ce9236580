/// Per-code session registry and code generation.
pub mod registry;
/// Session state machine and data model.
pub mod session;
mod sse;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{config::AppConfig, dao::session_store::SessionStore, state::registry::SessionRegistry};

pub use self::sse::{RoomBus, SseHub};

/// Shared handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Side index entry mapping a connected event stream back to its session and
/// participant, so disconnects resolve in O(1) instead of scanning sessions.
#[derive(Debug, Clone)]
pub struct ConnectionRef {
    /// Code of the session the connection is attached to.
    pub code: String,
    /// Participant handle the connection authenticated with.
    pub handle: Uuid,
}

/// Central application state storing live sessions, fan-out hubs, and the
/// storage handle.
pub struct AppState {
    config: AppConfig,
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    registry: SessionRegistry,
    rooms: RoomBus,
    connections: DashMap<Uuid, ConnectionRef>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            session_store: RwLock::new(None),
            registry: SessionRegistry::new(),
            rooms: RoomBus::new(16),
            connections: DashMap::new(),
            degraded: degraded_tx,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// In-memory authority over live sessions.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Per-session broadcast rooms.
    pub fn rooms(&self) -> &RoomBus {
        &self.rooms
    }

    /// Registry of attached event streams keyed by connection identifier.
    pub fn connections(&self) -> &DashMap<Uuid, ConnectionRef> {
        &self.connections
    }
}
