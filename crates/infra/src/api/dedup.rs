//! In-flight request coalescing.
//!
//! Concurrent calls with the same [`RequestKey`] share one underlying
//! request. The request runs as its own task under a token owned by the
//! registry, not by any caller. Each caller holds a [`SharedRequest`];
//! dropping it only ends that caller's wait. The request is cancelled once
//! every waiter has gone.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{RequestError, RequestKey, RequestResult};
use crate::http::ResponseBody;

/// Future shared by every caller waiting on the same key
pub type SharedResponse = Shared<BoxFuture<'static, RequestResult<ResponseBody>>>;

struct Pending {
    generation: u64,
    future: SharedResponse,
    waiters: usize,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Registry {
    pending: Mutex<HashMap<RequestKey, Pending>>,
    next_generation: AtomicU64,
}

/// Registry of in-flight requests keyed by [`RequestKey`].
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Default)]
pub struct RequestDeduplicator {
    inner: Arc<Registry>,
}

impl fmt::Debug for RequestDeduplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDeduplicator").field("pending", &self.pending_count()).finish()
    }
}

impl RequestDeduplicator {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the pending request for `key`, or start one with `factory`.
    ///
    /// `factory` is only invoked when nothing is pending for `key`. It
    /// receives the token that cancels the shared request and must pass it
    /// down to the transport. It is called with the registry locked and
    /// must not re-enter the deduplicator. Must be called from within a
    /// Tokio runtime.
    pub fn get_or_create<F, Fut>(&self, key: RequestKey, factory: F) -> SharedRequest
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = RequestResult<ResponseBody>> + Send + 'static,
    {
        let mut pending = self.inner.pending.lock();
        if let Some(existing) = pending.get_mut(&key) {
            existing.waiters += 1;
            debug!(%key, waiters = existing.waiters, "joining in-flight request");
            return SharedRequest {
                future: existing.future.clone(),
                leader: false,
                lease: Lease {
                    registry: Arc::clone(&self.inner),
                    key,
                    generation: existing.generation,
                },
            };
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let guard =
            PendingGuard { registry: Arc::clone(&self.inner), key: key.clone(), generation };
        let request = factory(cancel.clone());

        // The guard lives inside the task, so the entry is removed on
        // completion, panic or abort. It needs the lock we hold, so removal
        // cannot overtake the insert below.
        let handle = tokio::spawn(async move {
            let _guard = guard;
            request.await
        });

        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(RequestError::Cancelled),
                Err(err) => {
                    error!(error = %err, "request task panicked");
                    Err(RequestError::Internal(format!("request task failed: {err}")))
                }
            }
        }
        .boxed()
        .shared();

        debug!(%key, generation, "registered request");
        pending.insert(
            key.clone(),
            Pending { generation, future: future.clone(), waiters: 1, cancel },
        );
        SharedRequest {
            future,
            leader: true,
            lease: Lease { registry: Arc::clone(&self.inner), key, generation },
        }
    }

    /// Number of requests currently in flight
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Whether a request for `key` is in flight.
    pub fn is_pending(&self, key: &RequestKey) -> bool {
        self.inner.pending.lock().contains_key(key)
    }

    /// Callers currently waiting on the request for `key`.
    pub fn waiter_count(&self, key: &RequestKey) -> usize {
        self.inner.pending.lock().get(key).map_or(0, |entry| entry.waiters)
    }
}

/// One caller's interest in a shared request.
///
/// Resolves to the shared outcome. Dropping it before completion
/// withdraws this caller; the last withdrawal cancels the request.
pub struct SharedRequest {
    future: SharedResponse,
    leader: bool,
    lease: Lease,
}

impl SharedRequest {
    /// Whether this caller started the request rather than joining it
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Key of the underlying request
    pub fn key(&self) -> &RequestKey {
        &self.lease.key
    }
}

impl fmt::Debug for SharedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRequest")
            .field("key", &self.lease.key)
            .field("generation", &self.lease.generation)
            .field("leader", &self.leader)
            .finish_non_exhaustive()
    }
}

impl Future for SharedRequest {
    type Output = RequestResult<ResponseBody>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.future).poll(cx)
    }
}

struct Lease {
    registry: Arc<Registry>,
    key: RequestKey,
    generation: u64,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut pending = self.registry.pending.lock();
        let Some(entry) = pending.get_mut(&self.key) else {
            return;
        };
        if entry.generation != self.generation {
            return;
        }

        entry.waiters = entry.waiters.saturating_sub(1);
        if entry.waiters == 0 {
            // Unregister now so a new caller starts a fresh request instead
            // of joining one that is being cancelled.
            if let Some(abandoned) = pending.remove(&self.key) {
                debug!(key = %self.key, "all waiters gone; cancelling request");
                abandoned.cancel.cancel();
            }
        }
    }
}

struct PendingGuard {
    registry: Arc<Registry>,
    key: RequestKey,
    generation: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.registry.pending.lock();
        // A newer registration under the same key is not ours to remove.
        if pending.get(&self.key).is_some_and(|entry| entry.generation == self.generation) {
            pending.remove(&self.key);
        }
    }
}
