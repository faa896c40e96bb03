use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use tablesync_common::resilience::{BreakerPolicy, Clock};
use tablesync_domain::{ApiConfig, PollerConfig};
use tablesync_infra::{ApiClient, SyncContext};
use wiremock::MockServer;

/// Breaker scaled for tests: five failures, one second cooldown.
pub fn scaled_policy() -> BreakerPolicy {
    BreakerPolicy::new(5, Duration::from_millis(1_000)).expect("valid breaker policy")
}

/// Context with the scaled breaker on the system clock.
pub fn scaled_context() -> Arc<SyncContext> {
    Arc::new(SyncContext::builder().breaker_policy(scaled_policy()).build())
}

/// Context with the scaled breaker driven by `clock`.
pub fn scaled_context_with_clock<C: Clock>(clock: C) -> Arc<SyncContext> {
    Arc::new(SyncContext::builder().breaker_policy(scaled_policy()).clock(clock).build())
}

/// Client whose base URL points at the mock server's `/api` prefix.
pub fn client_for(server: &MockServer, context: Arc<SyncContext>) -> ApiClient {
    client_for_url(&format!("{}/api", server.uri()), context)
}

pub fn client_for_url(base_url: &str, context: Arc<SyncContext>) -> ApiClient {
    let config = ApiConfig {
        base_url: base_url.to_string(),
        timeout_ms: 5_000,
        ..ApiConfig::default()
    };
    ApiClient::new(&config, context).expect("api client should be created")
}

/// Base URL of a port nothing is listening on.
pub fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}/api")
}

/// Poller intervals shrunk to milliseconds so tests run on the real clock.
pub fn fast_poller_config() -> PollerConfig {
    PollerConfig {
        base_interval_ms: 20,
        short_interval_ms: 10,
        normal_interval_ms: 50,
        max_interval_ms: 200,
        stop_timeout_ms: 1_000,
    }
}
