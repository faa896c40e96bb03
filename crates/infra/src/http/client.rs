use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client as ReqwestClient, RequestBuilder};
use tablesync_common::resilience::CircuitBreaker;
use tablesync_domain::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use tablesync_domain::{TableSyncError, TimeoutPolicy};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{HttpRequest, RequestPayload, ResponseBody};
use crate::api::{RequestError, RequestResult};

/// Single-attempt HTTP executor with a hard timeout and cooperative
/// cancellation.
///
/// Every dispatched outcome is reported to the shared circuit breaker,
/// except cancellation. The executor never retries.
#[derive(Clone)]
pub struct RequestExecutor {
    client: ReqwestClient,
    breaker: Arc<CircuitBreaker>,
    default_timeout: Duration,
    timeout_policy: TimeoutPolicy,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("default_timeout", &self.default_timeout)
            .field("timeout_policy", &self.timeout_policy)
            .finish_non_exhaustive()
    }
}

enum Race {
    Cancelled,
    TimedOut,
    Finished(RequestResult<ResponseBody>),
}

impl RequestExecutor {
    /// Start building a new executor.
    pub fn builder() -> RequestExecutorBuilder {
        RequestExecutorBuilder::default()
    }

    /// Breaker this executor reports outcomes to
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Timeout used when a request sets none
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// How timed out requests are reported
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.timeout_policy
    }

    /// Execute one request.
    ///
    /// # Errors
    /// - `Cancelled` when the caller's token fires, or on timeout under
    ///   [`TimeoutPolicy::Cancel`]
    /// - `Timeout` on timeout under [`TimeoutPolicy::Fail`]
    /// - `Connection` for transport failures, `Http` for non-2xx responses
    /// - `InvalidRequest` when the request cannot be built (nothing is sent)
    #[instrument(
        skip_all,
        fields(request_id = %Uuid::new_v4(), method = %request.method, url = %request.url)
    )]
    pub async fn execute(&self, request: HttpRequest) -> RequestResult<ResponseBody> {
        let external = request.cancel.clone().unwrap_or_default();
        if external.is_cancelled() {
            debug!("caller cancelled before dispatch");
            return Err(RequestError::Cancelled);
        }

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let builder = self.prepare(request)?;

        // Fires on caller cancellation or when the timeout elapses.
        let token = external.child_token();
        let race = tokio::select! {
            biased;
            () = token.cancelled() => Race::Cancelled,
            outcome = tokio::time::timeout(timeout, dispatch(builder)) => match outcome {
                Ok(result) => Race::Finished(result),
                Err(_) => {
                    token.cancel();
                    Race::TimedOut
                }
            },
        };

        let result = match race {
            Race::Cancelled => {
                debug!("request cancelled by caller");
                Err(RequestError::Cancelled)
            }
            Race::TimedOut => {
                warn!(?timeout, "request timed out");
                match self.timeout_policy {
                    TimeoutPolicy::Cancel => Err(RequestError::Cancelled),
                    TimeoutPolicy::Fail => Err(RequestError::Timeout(timeout)),
                }
            }
            Race::Finished(result) => result,
        };

        self.report(&result);
        result
    }

    fn prepare(&self, request: HttpRequest) -> RequestResult<RequestBuilder> {
        let builder = self.client.request(request.method, request.url).headers(request.headers);
        let builder = match request.payload {
            RequestPayload::Empty => builder,
            RequestPayload::Json(body) => builder.body(body),
            RequestPayload::Multipart(form) => builder.multipart(form.into_multipart()?),
        };
        Ok(builder)
    }

    fn report(&self, result: &RequestResult<ResponseBody>) {
        match result {
            Ok(_) => self.breaker.record_success(),
            Err(err) if err.counts_as_breaker_failure() => {
                debug!(error = %err, kind = err.label(), "recording breaker failure");
                self.breaker.record_failure();
            }
            Err(err) => debug!(kind = err.label(), "outcome not recorded by breaker"),
        }
    }
}

/// Send the request and read the whole body.
async fn dispatch(builder: RequestBuilder) -> RequestResult<ResponseBody> {
    let response = builder.send().await?;
    let status = response.status();
    let content_type =
        response.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()).map(str::to_owned);
    let bytes = response.bytes().await?;
    let body = ResponseBody::from_bytes(content_type.as_deref(), &bytes);

    debug!(%status, "received HTTP response");
    if status.is_success() {
        Ok(body)
    } else {
        Err(body.into_http_error(status))
    }
}

/// Builder for [`RequestExecutor`].
#[derive(Debug)]
pub struct RequestExecutorBuilder {
    default_timeout: Duration,
    timeout_policy: TimeoutPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl Default for RequestExecutorBuilder {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            timeout_policy: TimeoutPolicy::default(),
            breaker: None,
            user_agent: None,
            default_headers: None,
        }
    }
}

impl RequestExecutorBuilder {
    /// Timeout used when a request sets none
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// How timed out requests are reported
    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Share a circuit breaker with other consumers.
    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// `User-Agent` sent with every request
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Headers sent with every request
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Build the executor.
    ///
    /// # Errors
    /// Returns `TableSyncError::Config` if the HTTP client cannot be built
    pub fn build(self) -> Result<RequestExecutor, TableSyncError> {
        let mut builder = ReqwestClient::builder().no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|err| TableSyncError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(RequestExecutor {
            client,
            breaker: self.breaker.unwrap_or_default(),
            default_timeout: self.default_timeout,
            timeout_policy: self.timeout_policy,
        })
    }
}
