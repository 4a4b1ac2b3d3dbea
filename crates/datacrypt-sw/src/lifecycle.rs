//! Worker lifecycle: `parsed → installing → installed → activating → activated`.
//!
//! A registration holds at most one worker per slot. A failed install leaves
//! the active worker untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::controller::OfflineCacheController;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Script evaluated, nothing run yet.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activate handler running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced, or install failed.
    Redundant,
}

/// A service worker instance.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    pub id: ServiceWorkerId,
    pub script_url: Url,
    pub state: ServiceWorkerState,
    controller: Arc<OfflineCacheController>,
}

impl ServiceWorker {
    pub fn new(script_url: Url, controller: Arc<OfflineCacheController>) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            script_url,
            state: ServiceWorkerState::Parsed,
            controller,
        }
    }

    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }

    /// Cache version this worker serves.
    pub fn version(&self) -> &str {
        self.controller.version()
    }

    /// The worker script's handlers.
    pub fn controller(&self) -> Arc<OfflineCacheController> {
        Arc::clone(&self.controller)
    }
}

/// A service worker registration.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    pub scope: Url,
    pub installing: Option<ServiceWorker>,
    pub waiting: Option<ServiceWorker>,
    pub active: Option<ServiceWorker>,
}

impl ServiceWorkerRegistration {
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Start installing `worker`, discarding any install already in flight.
    pub fn start_install(&mut self, mut worker: ServiceWorker) -> ServiceWorkerId {
        if let Some(mut previous) = self.installing.take() {
            previous.set_state(ServiceWorkerState::Redundant);
        }
        worker.set_state(ServiceWorkerState::Installing);
        let id = worker.id;
        self.installing = Some(worker);
        id
    }

    /// Move the installing worker to waiting. Returns `true` when an older
    /// worker is active, i.e. this is an update rather than a first install.
    pub fn install_complete(&mut self, id: ServiceWorkerId) -> Option<bool> {
        let mut worker = self.installing.take_if(|w| w.id == id)?;
        worker.set_state(ServiceWorkerState::Installed);

        if let Some(mut superseded) = self.waiting.take() {
            superseded.set_state(ServiceWorkerState::Redundant);
        }
        self.waiting = Some(worker);
        Some(self.active.is_some())
    }

    /// Drop the installing worker after a failed install.
    pub fn install_failed(&mut self, id: ServiceWorkerId) -> Option<ServiceWorker> {
        let mut worker = self.installing.take_if(|w| w.id == id)?;
        worker.set_state(ServiceWorkerState::Redundant);
        Some(worker)
    }

    /// Promote the waiting worker to activating and retire the old active
    /// worker. Returns the promoted worker and whether one was replaced.
    pub fn begin_activate(&mut self) -> Option<(ServiceWorker, bool)> {
        let mut worker = self.waiting.take()?;
        worker.set_state(ServiceWorkerState::Activating);

        let replaced = match self.active.take() {
            Some(mut old) => {
                old.set_state(ServiceWorkerState::Redundant);
                true
            }
            None => false,
        };

        self.active = Some(worker.clone());
        Some((worker, replaced))
    }

    /// Mark the activating worker as activated.
    pub fn activation_complete(&mut self, id: ServiceWorkerId) -> bool {
        match self.active.as_mut() {
            Some(worker) if worker.id == id => {
                worker.set_state(ServiceWorkerState::Activated);
                true
            }
            _ => false,
        }
    }

    /// Mark every worker redundant.
    pub fn unregister(&mut self) {
        for slot in [&mut self.installing, &mut self.waiting, &mut self.active] {
            if let Some(mut worker) = slot.take() {
                worker.set_state(ServiceWorkerState::Redundant);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::scope::WorkerGlobalScope;
    use crate::testing::MockFetcher;

    fn worker(version: &str) -> ServiceWorker {
        let (scope, _rx) = WorkerGlobalScope::new();
        let controller = OfflineCacheController::new(
            ControllerConfig::default().with_version(version),
            Arc::new(MockFetcher::new()),
            scope,
        )
        .unwrap();
        ServiceWorker::new(
            Url::parse("http://localhost:8080/sw.js").unwrap(),
            Arc::new(controller),
        )
    }

    fn registration() -> ServiceWorkerRegistration {
        ServiceWorkerRegistration::new(Url::parse("http://localhost:8080/").unwrap())
    }

    #[test]
    fn test_first_install_is_not_update() {
        let mut reg = registration();
        let id = reg.start_install(worker("v3.0"));
        assert_eq!(reg.installing.as_ref().unwrap().state, ServiceWorkerState::Installing);

        assert_eq!(reg.install_complete(id), Some(false));
        assert_eq!(reg.waiting.as_ref().unwrap().state, ServiceWorkerState::Installed);
        assert!(reg.installing.is_none());
    }

    #[test]
    fn test_full_cycle_and_update() {
        let mut reg = registration();
        let first = reg.start_install(worker("v3.0"));
        reg.install_complete(first);
        let (promoted, replaced) = reg.begin_activate().unwrap();
        assert!(!replaced);
        assert_eq!(promoted.state, ServiceWorkerState::Activating);
        assert!(reg.activation_complete(first));
        assert!(reg.active.as_ref().unwrap().is_active());

        let second = reg.start_install(worker("v4.0"));
        assert_eq!(reg.install_complete(second), Some(true));
        let (_, replaced) = reg.begin_activate().unwrap();
        assert!(replaced);
        reg.activation_complete(second);
        assert_eq!(reg.active.as_ref().unwrap().version(), "v4.0");
    }

    #[test]
    fn test_failed_install_keeps_active() {
        let mut reg = registration();
        let first = reg.start_install(worker("v3.0"));
        reg.install_complete(first);
        reg.begin_activate();
        reg.activation_complete(first);

        let second = reg.start_install(worker("v4.0"));
        let failed = reg.install_failed(second).unwrap();
        assert!(failed.is_redundant());
        assert!(reg.waiting.is_none());
        assert_eq!(reg.active.as_ref().unwrap().version(), "v3.0");
    }

    #[test]
    fn test_stale_install_id_is_ignored() {
        let mut reg = registration();
        let stale = reg.start_install(worker("v3.0"));
        let current = reg.start_install(worker("v3.1"));

        assert_eq!(reg.install_complete(stale), None);
        assert_eq!(reg.install_complete(current), Some(false));
    }

    #[test]
    fn test_unregister() {
        let mut reg = registration();
        let id = reg.start_install(worker("v3.0"));
        reg.install_complete(id);
        reg.unregister();
        assert!(reg.waiting.is_none());
        assert!(reg.active.is_none());
    }
}
