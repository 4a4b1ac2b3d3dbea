//! Page-side registration container.
//!
//! Drives worker lifecycles for each scope and forwards page traffic to the
//! active worker. Lifecycle signals reach pages through the event channel
//! returned by [`ServiceWorkerContainer::new`].

use std::sync::Arc;

use datacrypt_net::{Fetcher, Request};
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ControllerConfig;
use crate::controller::OfflineCacheController;
use crate::error::{CacheControllerError, Result};
use crate::keepalive::WaitUntil;
use crate::lifecycle::{ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
use crate::message::{MessageEffect, ReplyPort, WorkerMessage};
use crate::scope::{ServiceWorkerEvent, WorkerGlobalScope};
use crate::strategy::FetchOutcome;

/// Script path the worker is registered from.
pub const SCRIPT_PATH: &str = "/sw.js";

/// Service worker container (navigator.serviceWorker).
pub struct ServiceWorkerContainer {
    /// Registrations by scope.
    registrations: Arc<RwLock<HashMap<String, ServiceWorkerRegistration>>>,

    /// Janitor task of each scope's active worker.
    janitors: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,

    scope: WorkerGlobalScope,
}

impl ServiceWorkerContainer {
    /// Create a new container.
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (scope, events) = WorkerGlobalScope::new();
        (
            Self {
                registrations: Arc::new(RwLock::new(HashMap::new())),
                janitors: Arc::new(RwLock::new(HashMap::new())),
                scope,
            },
            events,
        )
    }

    /// State shared by every worker this container runs.
    pub fn global_scope(&self) -> &WorkerGlobalScope {
        &self.scope
    }

    /// Register (or update) the worker at the root of `config.origin` and
    /// run its install. Returns the registration scope.
    pub async fn register(
        &self,
        config: ControllerConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<String> {
        let controller = Arc::new(OfflineCacheController::new(
            config,
            fetcher,
            self.scope.clone(),
        )?);
        let origin = controller.config().origin_url()?;
        let scope = origin.join("/")?;
        let script_url = origin.join(SCRIPT_PATH)?;
        let scope_str = scope.to_string();

        let worker = ServiceWorker::new(script_url, Arc::clone(&controller));
        let id = {
            let mut registrations = self.registrations.write().await;
            registrations
                .entry(scope_str.clone())
                .or_insert_with(|| ServiceWorkerRegistration::new(scope))
                .start_install(worker)
        };
        info!(scope = %scope_str, version = controller.version(), "Registering service worker");
        self.scope.emit(ServiceWorkerEvent::UpdateFound {
            registration_scope: scope_str.clone(),
        });
        self.emit_state(&scope_str, id, ServiceWorkerState::Installing);

        // The install runs unlocked; pages keep being served meanwhile.
        let installed = controller.install().await;

        let report = {
            let mut registrations = self.registrations.write().await;
            let registration = registrations
                .get_mut(&scope_str)
                .ok_or_else(|| CacheControllerError::NotFound(scope_str.clone()))?;

            match installed {
                Err(e) => {
                    registration.install_failed(id);
                    self.emit_state(&scope_str, id, ServiceWorkerState::Redundant);
                    return Err(e);
                }
                Ok(report) => {
                    let is_update = registration.install_complete(id).ok_or_else(|| {
                        CacheControllerError::state("install superseded by a newer registration")
                    })?;
                    self.emit_state(&scope_str, id, ServiceWorkerState::Installed);
                    if is_update {
                        info!(scope = %scope_str, version = controller.version(), "Update available");
                        self.scope.emit(ServiceWorkerEvent::UpdateAvailable {
                            registration_scope: scope_str.clone(),
                            version: controller.version().to_string(),
                        });
                    }
                    report
                }
            }
        };

        if report.skip_waiting {
            self.skip_waiting(&scope_str).await?;
        }
        Ok(scope_str)
    }

    /// Activate the waiting worker of `scope`. Returns `false` when nothing
    /// was waiting.
    pub async fn skip_waiting(&self, scope: &str) -> Result<bool> {
        let (worker, replaced) = {
            let mut registrations = self.registrations.write().await;
            let registration = registrations
                .get_mut(scope)
                .ok_or_else(|| CacheControllerError::NotFound(scope.to_string()))?;
            match registration.begin_activate() {
                Some(promoted) => promoted,
                None => return Ok(false),
            }
        };
        self.emit_state(scope, worker.id, ServiceWorkerState::Activating);

        let controller = worker.controller();
        let report = controller.activate().await?;
        debug!(scope, deleted = ?report.deleted, claimed = report.claimed, "Activated");

        let activated = self
            .registrations
            .write()
            .await
            .get_mut(scope)
            .map(|r| r.activation_complete(worker.id))
            .unwrap_or(false);
        if !activated {
            warn!(scope, worker = worker.id.raw(), "Worker replaced while activating");
            return Ok(false);
        }

        self.emit_state(scope, worker.id, ServiceWorkerState::Activated);
        self.restart_janitor(scope, &controller).await;

        self.scope.emit(ServiceWorkerEvent::ControllerChange {
            registration_scope: scope.to_string(),
            version: controller.version().to_string(),
        });
        if replaced {
            self.scope.emit(ServiceWorkerEvent::Reload {
                registration_scope: scope.to_string(),
            });
        }
        Ok(true)
    }

    /// Ask the waiting worker of `scope` to take over.
    pub async fn apply_update(&self, scope: &str) -> Result<bool> {
        let waiting = {
            let registrations = self.registrations.read().await;
            let registration = registrations
                .get(scope)
                .ok_or_else(|| CacheControllerError::NotFound(scope.to_string()))?;
            registration.waiting.as_ref().map(ServiceWorker::controller)
        };
        let Some(controller) = waiting else {
            debug!(scope, "No waiting worker to apply");
            return Ok(false);
        };

        let message = serde_json::to_string(&WorkerMessage::SkipWaiting)
            .map_err(|e| CacheControllerError::state(e.to_string()))?;
        match controller.handle_message(&message, None).await {
            MessageEffect::SkipWaiting => self.skip_waiting(scope).await,
            MessageEffect::None => Ok(false),
        }
    }

    /// Post a message to the active worker of `scope`.
    pub async fn post_message(
        &self,
        scope: &str,
        data: &str,
        port: Option<ReplyPort>,
    ) -> Result<MessageEffect> {
        let controller = self
            .active_controller(scope)
            .await
            .ok_or_else(|| CacheControllerError::state(format!("no active worker for {}", scope)))?;

        let effect = controller.handle_message(data, port).await;
        if effect == MessageEffect::SkipWaiting {
            self.skip_waiting(scope).await?;
        }
        Ok(effect)
    }

    /// Handlers of the active worker of `scope`.
    pub async fn active_controller(&self, scope: &str) -> Option<Arc<OfflineCacheController>> {
        let registrations = self.registrations.read().await;
        registrations
            .get(scope)?
            .active
            .as_ref()
            .map(ServiceWorker::controller)
    }

    /// Active worker controlling `url`, by longest matching scope.
    pub async fn controller_for(&self, url: &Url) -> Option<Arc<OfflineCacheController>> {
        let registrations = self.registrations.read().await;
        registrations
            .iter()
            .filter(|(scope, _)| url.as_str().starts_with(scope.as_str()))
            .max_by_key(|(scope, _)| scope.len())
            .and_then(|(_, registration)| registration.active.as_ref())
            .map(ServiceWorker::controller)
    }

    /// Route a page request through its controlling worker. `Ok(None)` means
    /// the request goes straight to the network.
    ///
    /// Background refreshes are registered on `wait_until`; the caller must
    /// keep it alive and [`WaitUntil::settle`] it, or they are aborted when
    /// the last handle drops.
    pub async fn fetch(
        &self,
        request: &Request,
        wait_until: &WaitUntil,
    ) -> Result<Option<FetchOutcome>> {
        match self.controller_for(&request.url).await {
            Some(controller) => controller.handle_fetch(request, wait_until).await,
            None => Ok(None),
        }
    }

    /// Get registration for a URL.
    pub async fn get_registration(&self, url: &Url) -> Option<String> {
        let registrations = self.registrations.read().await;
        registrations
            .keys()
            .filter(|scope| url.as_str().starts_with(scope.as_str()))
            .max_by_key(|scope| scope.len())
            .cloned()
    }

    /// Get all registrations.
    pub async fn get_registrations(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.registrations.read().await.keys().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Unregister a service worker.
    pub async fn unregister(&self, scope: &str) -> Result<bool> {
        let removed = self.registrations.write().await.remove(scope);
        if let Some(janitor) = self.janitors.write().await.remove(scope) {
            janitor.abort();
        }
        match removed {
            Some(mut registration) => {
                registration.unregister();
                info!(scope, "Service worker unregistered");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn restart_janitor(&self, scope: &str, controller: &OfflineCacheController) {
        let handle = controller.spawn_janitor();
        if let Some(previous) = self.janitors.write().await.insert(scope.to_string(), handle) {
            previous.abort();
        }
    }

    fn emit_state(&self, scope: &str, worker_id: ServiceWorkerId, new_state: ServiceWorkerState) {
        self.scope.emit(ServiceWorkerEvent::StateChange {
            registration_scope: scope.to_string(),
            worker_id,
            new_state,
        });
    }
}

impl Drop for ServiceWorkerContainer {
    fn drop(&mut self) {
        if let Ok(mut janitors) = self.janitors.try_write() {
            for (_, janitor) in janitors.drain() {
                janitor.abort();
            }
        }
    }
}
