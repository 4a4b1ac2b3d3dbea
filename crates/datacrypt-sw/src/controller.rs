//! The worker script: one handler per lifecycle or functional event.
//!
//! Holds only immutable configuration and handles into shared state, so a
//! fresh instance per event behaves the same as a long-lived one.

use std::fmt;
use std::sync::Arc;

use datacrypt_net::{Fetcher, Request};
use futures::future::try_join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheKey};
use crate::classify::{Classifier, Route};
use crate::clients::{ClientMatchOptions, ClientType};
use crate::config::ControllerConfig;
use crate::error::{CacheControllerError, Result};
use crate::janitor::Janitor;
use crate::keepalive::WaitUntil;
use crate::message::{MessageEffect, MessageReply, ReplyPort, WorkerMessage};
use crate::notification::{ClickOutcome, Notification, PushPayload, ACTION_DISMISS};
use crate::scope::{ServiceWorkerEvent, WorkerGlobalScope};
use crate::share::{self, FAILED_REDIRECT, SHARED_REDIRECT};
use crate::strategy::{FetchOutcome, ResponseSource, StrategyExecutor};
use crate::sync::{self, SyncReport, BACKGROUND_SYNC_TAG};

/// Result of the install handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub cache: String,
    pub assets: usize,
    /// The worker asked to skip the waiting phase.
    pub skip_waiting: bool,
}

/// Result of the activate handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Orphaned generations that were deleted.
    pub deleted: Vec<String>,
    /// Pages newly brought under control.
    pub claimed: usize,
}

/// Offline cache controller.
pub struct OfflineCacheController {
    config: ControllerConfig,
    origin: Url,
    classifier: Classifier,
    executor: StrategyExecutor,
    fetcher: Arc<dyn Fetcher>,
    scope: WorkerGlobalScope,
    static_cache: String,
    dynamic_cache: String,
}

impl OfflineCacheController {
    /// Build a controller; fails on invalid configuration.
    pub fn new(
        config: ControllerConfig,
        fetcher: Arc<dyn Fetcher>,
        scope: WorkerGlobalScope,
    ) -> Result<Self> {
        config.validate()?;
        let origin = config.origin_url()?;
        let classifier = Classifier::from_config(&config)?;
        let static_cache = config.static_cache_name();
        let dynamic_cache = config.dynamic_cache_name();
        let shell = CacheKey::get(&config.resolve(&config.offline_shell)?);

        let executor = StrategyExecutor::new(
            scope.caches.clone(),
            Arc::clone(&fetcher),
            static_cache.clone(),
            dynamic_cache.clone(),
            shell,
        );

        Ok(Self {
            config,
            origin,
            classifier,
            executor,
            fetcher,
            scope,
            static_cache,
            dynamic_cache,
        })
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn static_cache_name(&self) -> &str {
        &self.static_cache
    }

    pub fn dynamic_cache_name(&self) -> &str {
        &self.dynamic_cache
    }

    pub fn global_scope(&self) -> &WorkerGlobalScope {
        &self.scope
    }

    /// Precache the core assets. Nothing is stored unless every asset fetched.
    #[instrument(skip(self), fields(version = %self.config.version))]
    pub async fn install(&self) -> Result<InstallReport> {
        let fetches = self.config.core_assets.iter().map(|asset| async move {
            let url = self.config.resolve(asset)?;
            let request = Request::get(url);
            let response = self.fetcher.fetch(&request).await.map_err(|e| {
                CacheControllerError::InstallFailed {
                    asset: asset.clone(),
                    reason: e.to_string(),
                }
            })?;
            if !response.ok() {
                return Err(CacheControllerError::InstallFailed {
                    asset: asset.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok::<_, CacheControllerError>((
                CacheKey::get(&request.url),
                CacheEntry::from_response(&response),
            ))
        });

        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Install aborted");
                return Err(e);
            }
        };

        let assets = entries.len();
        {
            let mut caches = self.scope.caches.write().await;
            caches.open(&self.static_cache).put_all(entries);
        }

        info!(cache = %self.static_cache, assets, "Core assets cached");
        Ok(InstallReport {
            cache: self.static_cache.clone(),
            assets,
            skip_waiting: self.config.skip_waiting_on_install,
        })
    }

    /// Delete orphaned generations and claim open pages.
    #[instrument(skip(self), fields(version = %self.config.version))]
    pub async fn activate(&self) -> Result<ActivateReport> {
        let deleted = {
            let mut caches = self.scope.caches.write().await;
            let orphaned: Vec<String> = caches
                .keys()
                .into_iter()
                .filter(|name| *name != self.static_cache && *name != self.dynamic_cache)
                .collect();
            for name in &orphaned {
                caches.delete(name);
            }
            orphaned
        };
        if !deleted.is_empty() {
            info!(?deleted, "Deleted old cache generations");
        }

        let claimed = self
            .scope
            .clients
            .write()
            .await
            .claim(&self.origin, &self.config.version);

        Ok(ActivateReport { deleted, claimed })
    }

    /// Handle a fetch event. `Ok(None)` means the request is not intercepted.
    pub async fn handle_fetch(
        &self,
        request: &Request,
        wait_until: &WaitUntil,
    ) -> Result<Option<FetchOutcome>> {
        match self.classifier.route(request) {
            Route::Passthrough => Ok(None),
            Route::ShareTarget => self.handle_share_target(request).await.map(Some),
            Route::Cached(strategy) => {
                debug!(url = %request.url, strategy = strategy.as_str(), "Handling fetch");
                self.executor
                    .execute(strategy, request, wait_until)
                    .await
                    .map(Some)
            }
        }
    }

    /// Read a share-target POST and redirect to the shell.
    pub async fn handle_share_target(&self, request: &Request) -> Result<FetchOutcome> {
        let location = match share::parse_share_request(request).await {
            Ok(payload) => {
                info!(
                    title = ?payload.title,
                    text = ?payload.text,
                    url = ?payload.url,
                    "Received shared content"
                );
                self.scope.emit(ServiceWorkerEvent::Shared(payload));
                SHARED_REDIRECT
            }
            Err(e) => {
                warn!(error = %e, "Unreadable share payload");
                FAILED_REDIRECT
            }
        };

        Ok(FetchOutcome {
            response: share::share_redirect(request, location)?,
            source: ResponseSource::Synthesized,
        })
    }

    /// Handle a posted message, replying through `port` where the protocol
    /// has a reply.
    pub async fn handle_message(&self, data: &str, port: Option<ReplyPort>) -> MessageEffect {
        let Some(message) = WorkerMessage::parse(data) else {
            return MessageEffect::None;
        };
        debug!(?message, "Message received");

        let reply = match message {
            WorkerMessage::SkipWaiting => return MessageEffect::SkipWaiting,
            WorkerMessage::GetVersion => MessageReply::Version {
                version: self.config.version.clone(),
                static_cache: self.static_cache.clone(),
                dynamic_cache: self.dynamic_cache.clone(),
            },
            WorkerMessage::ClearCache => {
                let deleted = self.scope.caches.write().await.delete(&self.dynamic_cache);
                info!(cache = %self.dynamic_cache, deleted, "Dynamic cache cleared");
                MessageReply::Cleared {
                    cache: self.dynamic_cache.clone(),
                    deleted,
                }
            }
        };

        match port {
            Some(port) => {
                if port.send(reply).is_err() {
                    debug!("Reply port closed before reply");
                }
            }
            None => debug!(?message, "No reply port supplied"),
        }
        MessageEffect::None
    }

    /// Show a notification for a push message.
    pub async fn handle_push(&self, data: Option<&[u8]>) -> Notification {
        let notification =
            Notification::from_push(PushPayload::decode(data), &self.config.notification);
        info!(title = %notification.title, tag = %notification.tag, "Showing notification");
        self.scope
            .notifications
            .write()
            .await
            .show(notification.clone());
        notification
    }

    /// Close the clicked notification and bring its target page forward.
    pub async fn handle_notification_click(
        &self,
        tag: &str,
        action: Option<&str>,
    ) -> Result<ClickOutcome> {
        let notification = self
            .scope
            .notifications
            .write()
            .await
            .close(tag)
            .ok_or_else(|| CacheControllerError::NotFound(format!("notification {}", tag)))?;

        if action == Some(ACTION_DISMISS) {
            return Ok(ClickOutcome::Dismissed);
        }

        let target = self.config.resolve(&notification.url)?;
        let mut clients = self.scope.clients.write().await;
        let options = ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        };
        let existing = clients
            .match_all(&options)
            .into_iter()
            .find(|c| c.url == target)
            .map(|c| c.id.clone());

        match existing {
            Some(id) => {
                let client = clients.focus(&id)?;
                debug!(client = %client.id, url = %target, "Focused existing window");
                Ok(ClickOutcome::Focused(client.id))
            }
            None => {
                let client = clients.open_window(target);
                debug!(client = %client.id, url = %client.url, "Opened window");
                Ok(ClickOutcome::Opened(client.id))
            }
        }
    }

    /// Handle a background sync event.
    pub async fn handle_sync(&self, tag: &str) -> SyncReport {
        if tag != BACKGROUND_SYNC_TAG {
            debug!(tag, "Ignoring unknown sync tag");
            return SyncReport::default();
        }
        sync::revalidate_cache(&self.executor, &self.scope.caches, &self.dynamic_cache).await
    }

    /// Janitor for the dynamic generation.
    pub fn janitor(&self) -> Janitor {
        Janitor::new(
            self.scope.caches.clone(),
            self.dynamic_cache.clone(),
            self.config.max_dynamic_entries,
            self.config.trim_interval(),
        )
    }

    /// Start trimming the dynamic generation periodically.
    pub fn spawn_janitor(&self) -> JoinHandle<()> {
        self.janitor().spawn()
    }
}

impl fmt::Debug for OfflineCacheController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineCacheController")
            .field("origin", &self.origin.as_str())
            .field("static_cache", &self.static_cache)
            .field("dynamic_cache", &self.dynamic_cache)
            .finish()
    }
}
