//! # DataCrypt Offline Cache Controller
//!
//! Service worker for the DataCrypt marketing site: precaching, per-request
//! caching strategies, cache generation cutover and the push, share-target
//! and background-sync surfaces.
//!
//! ## Features
//!
//! - **Lifecycle**: all-or-nothing precache on install, orphaned generation
//!   cleanup on activate, update detection and skip-waiting
//! - **Routing**: ordered regex rules picking network-first, cache-first or
//!   stale-while-revalidate
//! - **Offline**: cached shell served to navigations the network cannot answer
//! - **Janitor**: daily size bound on the dynamic generation
//! - **Push**: notifications with at most two actions, click to focus or open
//! - **Share target**: form POSTs parsed and redirected to `/?shared=true`
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer
//!     │
//!     └── ServiceWorkerRegistration (scope "/")
//!             ├── installing / waiting / active (ServiceWorker)
//!             │       └── OfflineCacheController
//!             │               ├── Classifier
//!             │               └── StrategyExecutor ──► Fetcher
//!             └── Janitor
//!
//! WorkerGlobalScope
//!     ├── CacheStorage (static-<version>, dynamic-<version>)
//!     ├── Clients
//!     └── NotificationCenter
//! ```

pub mod cache;
pub mod classify;
pub mod clients;
pub mod config;
pub mod container;
pub mod controller;
pub mod error;
pub mod janitor;
pub mod keepalive;
pub mod lifecycle;
pub mod message;
pub mod notification;
pub mod scope;
pub mod share;
pub mod strategy;
pub mod sync;

#[cfg(test)]
mod testing;

pub use cache::{Cache, CacheEntry, CacheKey, CacheStorage, SharedCacheStorage};
pub use classify::{Classifier, Route, RouteRule, Strategy};
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::{ControllerConfig, NotificationConfig};
pub use container::{ServiceWorkerContainer, SCRIPT_PATH};
pub use controller::{ActivateReport, InstallReport, OfflineCacheController};
pub use error::{CacheControllerError, Result};
pub use janitor::{trim_cache, Janitor};
pub use keepalive::WaitUntil;
pub use lifecycle::{ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
pub use message::{MessageEffect, MessageReply, ReplyPort, WorkerMessage};
pub use notification::{ClickOutcome, Notification, NotificationAction, NotificationCenter, PushPayload};
pub use scope::{ServiceWorkerEvent, WorkerGlobalScope};
pub use share::{parse_share_request, SharedPayload};
pub use strategy::{FetchOutcome, ResponseSource, StrategyExecutor};
pub use sync::{SyncReport, BACKGROUND_SYNC_TAG};
