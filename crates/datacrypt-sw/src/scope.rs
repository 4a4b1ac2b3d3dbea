//! State shared between the worker and the pages it serves.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::trace;

use crate::cache::{CacheStorage, SharedCacheStorage};
use crate::clients::Clients;
use crate::lifecycle::{ServiceWorkerId, ServiceWorkerState};
use crate::notification::NotificationCenter;
use crate::share::SharedPayload;

/// Signals raised toward pages.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceWorkerEvent {
    /// A worker changed state.
    StateChange {
        registration_scope: String,
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A new worker started installing.
    UpdateFound { registration_scope: String },
    /// A new version installed while an older one controls the scope.
    UpdateAvailable {
        registration_scope: String,
        version: String,
    },
    /// Pages are now controlled by `version`.
    ControllerChange {
        registration_scope: String,
        version: String,
    },
    /// Pages should reload so the new worker takes effect uniformly.
    Reload { registration_scope: String },
    /// Content arrived through the share target.
    Shared(SharedPayload),
}

/// Handles the runtime gives every worker instance.
#[derive(Clone)]
pub struct WorkerGlobalScope {
    pub caches: SharedCacheStorage,
    pub clients: Arc<RwLock<Clients>>,
    pub notifications: Arc<RwLock<NotificationCenter>>,
    events: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl WorkerGlobalScope {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                caches: CacheStorage::shared(),
                clients: Arc::new(RwLock::new(Clients::new())),
                notifications: Arc::new(RwLock::new(NotificationCenter::new())),
                events,
            },
            rx,
        )
    }

    /// Emit an event; dropped when no page listens.
    pub fn emit(&self, event: ServiceWorkerEvent) {
        trace!(?event, "Emitting event");
        let _ = self.events.send(event);
    }
}
