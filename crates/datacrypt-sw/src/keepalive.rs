//! Event lifetime extension ("wait until").
//!
//! Work registered here must complete before the host may terminate the
//! worker. Hosts drain it with [`WaitUntil::settle`]. Dropping the last
//! handle aborts whatever is still running.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinSet;
use tracing::warn;

/// Set of background tasks an event depends on.
///
/// Clones share one set. When the last clone is dropped, unsettled tasks are
/// aborted and a warning is logged.
#[derive(Clone, Default)]
pub struct WaitUntil {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl WaitUntil {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the worker alive until `work` settles.
    pub fn extend<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.lock().spawn(work);
    }

    /// Tasks not yet collected.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait for every registered task, including ones registered while
    /// waiting. Returns how many settled.
    pub async fn settle(&self) -> usize {
        let mut settled = 0;
        loop {
            let mut batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                return settled;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background task did not complete");
                }
                settled += 1;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for WaitUntil {
    fn drop(&mut self) {
        if Arc::strong_count(&self.tasks) > 1 {
            return;
        }
        let pending = self.pending();
        if pending > 0 {
            warn!(pending, "Event ended before its background work settled; aborting");
        }
    }
}

impl std::fmt::Debug for WaitUntil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitUntil")
            .field("pending", &self.pending())
            .finish()
    }
}
