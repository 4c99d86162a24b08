//! Scan token bookkeeping and cooperative cancellation.

use derive_more::Display;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Opaque identifier for one in-flight background enumeration.
///
/// A new scan always gets a fresh token, even against a source that was
/// scanned before.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display("scan-{_0}")]
pub struct ScanToken(pub u64);

/// Issues and tracks cancellable scan tokens.
///
/// An explicit instance owned by the ingestor — not module-level state — so
/// cancellation is unit-testable in isolation. Cloning shares the registry;
/// background tasks carry a clone so they can release their bookkeeping
/// when they finish.
///
/// Cancellation is cooperative: [`cancel`](Self::cancel) only raises a flag
/// that scan loops check at chunk boundaries.
#[derive(Debug, Clone, Default)]
pub struct ScanCoordinator {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next: AtomicU64,
    active: Mutex<HashMap<ScanToken, CancellationToken>>,
}

impl ScanCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashMap<ScanToken, CancellationToken>> {
        // The registry holds no invariants across panics worth preserving.
        self.inner.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a fresh token for a scan about to begin background work.
    pub fn issue(&self) -> ScanToken {
        ScanToken(self.inner.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a cancellation handle for `token`.
    ///
    /// If a handle already exists for the token it is cancelled first, then
    /// replaced with a fresh one.
    pub fn begin(&self, token: ScanToken) -> CancellationToken {
        let handle = CancellationToken::new();
        if let Some(previous) = self.active().insert(token, handle.clone()) {
            tracing::debug!(%token, "token re-registered; cancelling previous scan");
            previous.cancel();
        }
        handle
    }

    /// Signal cancellation for `token`. Returns whether a handle existed.
    pub fn cancel(&self, token: ScanToken) -> bool {
        match self.active().get(&token) {
            Some(handle) => {
                handle.cancel();
                true
            },
            None => false,
        }
    }

    pub fn is_cancelled(&self, token: ScanToken) -> bool {
        self.active().get(&token).is_some_and(CancellationToken::is_cancelled)
    }

    /// Remove the bookkeeping for `token` once its scan has finished,
    /// cancelled, or errored.
    ///
    /// Prefer [`completion_guard`](Self::completion_guard) inside scan
    /// tasks, which calls this on every exit path.
    pub fn complete(&self, token: ScanToken) {
        self.active().remove(&token);
    }

    /// A guard that calls [`complete`](Self::complete) when dropped, so a
    /// token can never leak out of a scan task.
    pub fn completion_guard(&self, token: ScanToken) -> CompletionGuard {
        CompletionGuard { coordinator: self.clone(), token }
    }

    /// Number of scans currently registered.
    pub fn active_scans(&self) -> usize {
        self.active().len()
    }
}

pub struct CompletionGuard {
    coordinator: ScanCoordinator,
    token: ScanToken,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.coordinator.complete(self.token);
    }
}
