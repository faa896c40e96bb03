//! Process-wide request state shared by every client and poller.

use std::sync::Arc;

use parking_lot::RwLock;
use tablesync_common::resilience::{BreakerPolicy, CircuitBreaker, Clock, SystemClock};
use tracing::info;

use super::RequestDeduplicator;

/// Shared circuit breaker, in-flight request registry and ambient tenant.
///
/// Build one per process and hand an `Arc` to every [`ApiClient`]; tests
/// build isolated instances.
///
/// [`ApiClient`]: super::ApiClient
#[derive(Debug)]
pub struct SyncContext {
    breaker: Arc<CircuitBreaker>,
    deduplicator: RequestDeduplicator,
    tenant: RwLock<Option<String>>,
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SyncContext {
    /// Context with the default breaker policy and no tenant
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a context
    pub fn builder() -> SyncContextBuilder {
        SyncContextBuilder::default()
    }

    /// Breaker shared by every client on this context
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Registry of in-flight requests
    pub fn deduplicator(&self) -> &RequestDeduplicator {
        &self.deduplicator
    }

    /// Tenant injected as `X-Tenant-Id`, if any
    pub fn tenant(&self) -> Option<String> {
        self.tenant.read().clone()
    }

    /// Switch the ambient tenant (restaurant selection, QR billing session).
    pub fn set_tenant(&self, tenant: impl Into<String>) {
        let tenant = tenant.into();
        info!(tenant = %tenant, "tenant selected");
        *self.tenant.write() = Some(tenant);
    }

    /// Stop sending a tenant header from this context
    pub fn clear_tenant(&self) {
        *self.tenant.write() = None;
    }
}

/// Builder for [`SyncContext`]
#[derive(Default)]
pub struct SyncContextBuilder {
    policy: BreakerPolicy,
    clock: Option<Arc<dyn Clock>>,
    tenant: Option<String>,
}

impl SyncContextBuilder {
    /// Threshold and cooldown of the shared breaker
    pub fn breaker_policy(mut self, policy: BreakerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drive breaker cooldowns from a custom clock
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Initial tenant; blank values are ignored
    pub fn tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant.filter(|t| !t.trim().is_empty());
        self
    }

    /// Build the context
    pub fn build(self) -> SyncContext {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        SyncContext {
            breaker: Arc::new(CircuitBreaker::with_shared_clock(self.policy, clock)),
            deduplicator: RequestDeduplicator::new(),
            tenant: RwLock::new(self.tenant),
        }
    }
}
