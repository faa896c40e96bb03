//! Resilient API client
//!
//! Resolves paths against the configured base URL, attaches default and
//! tenant headers, then runs every call through the shared circuit breaker,
//! the in-flight deduplicator and the request executor, in that order.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tablesync_domain::constants::TENANT_HEADER;
use tablesync_domain::{ApiConfig, TableSyncError, TimeoutPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{RequestError, RequestKey, RequestResult, SyncContext};
use crate::http::{HttpRequest, RequestExecutor, RequestPayload, ResponseBody, UploadForm};

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// Options with no extra headers, default timeout and no cancellation
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header; explicit headers win over injected defaults.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the client's default timeout for this call
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the call (or stop waiting on a shared one) when `token` fires
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// API client over a shared [`SyncContext`]
///
/// All verb methods return `Ok(None)` when the call was cancelled, so
/// callers can stay silent without treating it as a failure.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    tenant_header: HeaderName,
    default_tenant: Option<String>,
    executor: RequestExecutor,
    context: Arc<SyncContext>,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// # Arguments
    ///
    /// * `config` - Base URL, default timeout, timeout policy and fallback tenant
    /// * `context` - Shared breaker, deduplicator and ambient tenant
    ///
    /// # Errors
    ///
    /// Returns `TableSyncError::Config` if the configuration is invalid or the
    /// HTTP client cannot be built
    pub fn new(config: &ApiConfig, context: Arc<SyncContext>) -> Result<Self, TableSyncError> {
        config.validate()?;

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|err| {
            TableSyncError::Config(format!("invalid api.base_url '{base_url}': {err}"))
        })?;

        let tenant_header = HeaderName::from_bytes(TENANT_HEADER.as_bytes())
            .map_err(|err| TableSyncError::Config(format!("invalid tenant header name: {err}")))?;

        let executor = RequestExecutor::builder()
            .default_timeout(config.timeout())
            .timeout_policy(config.timeout_policy)
            .breaker(Arc::clone(context.breaker()))
            .user_agent(concat!("tablesync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url,
            tenant_header,
            default_tenant: config.tenant_id.clone().filter(|t| !t.trim().is_empty()),
            executor,
            context,
        })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Shared breaker, deduplicator and tenant
    pub fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    /// Resolve `path` against the base URL; absolute URLs pass through.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidRequest` if the result is not a valid URL
    pub fn resolve(&self, path: &str) -> RequestResult<Url> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        };
        Url::parse(&raw).map_err(|err| RequestError::InvalidRequest(format!("url '{raw}': {err}")))
    }

    /// Execute a GET request
    pub async fn get(&self, path: &str, options: RequestOptions) -> RequestResult<Option<ResponseBody>> {
        self.send(Method::GET, path, RequestPayload::Empty, options).await
    }

    /// Execute a DELETE request
    pub async fn delete(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> RequestResult<Option<ResponseBody>> {
        self.send(Method::DELETE, path, RequestPayload::Empty, options).await
    }

    /// Execute a POST request with a JSON body
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be serialized, the breaker is open,
    /// or the request fails
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> RequestResult<Option<ResponseBody>> {
        self.send(Method::POST, path, RequestPayload::json(body)?, options).await
    }

    /// Execute a PUT request with a JSON body
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> RequestResult<Option<ResponseBody>> {
        self.send(Method::PUT, path, RequestPayload::json(body)?, options).await
    }

    /// Execute a PATCH request with a JSON body
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> RequestResult<Option<ResponseBody>> {
        self.send(Method::PATCH, path, RequestPayload::json(body)?, options).await
    }

    /// POST a multipart form (bill scans, attachments).
    ///
    /// The multipart boundary header is written by the transport; a caller
    /// supplied `Content-Type` is dropped.
    pub async fn upload(
        &self,
        path: &str,
        form: UploadForm,
        options: RequestOptions,
    ) -> RequestResult<Option<ResponseBody>> {
        self.send(Method::POST, path, RequestPayload::Multipart(form), options).await
    }

    /// GET and deserialize the body
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::get`], plus `RequestError::Decode` when the body
    /// does not match `T`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> RequestResult<Option<T>> {
        self.get(path, options).await?.map(ResponseBody::deserialize).transpose()
    }

    /// POST a JSON body and deserialize the response
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> RequestResult<Option<T>> {
        self.post(path, body, options).await?.map(ResponseBody::deserialize).transpose()
    }

    #[instrument(skip_all, fields(method = %method, path = %path))]
    async fn send(
        &self,
        method: Method,
        path: &str,
        payload: RequestPayload,
        options: RequestOptions,
    ) -> RequestResult<Option<ResponseBody>> {
        // Checked before the deduplicator so an open breaker never hands out
        // a request that is already pending.
        let breaker = self.context.breaker();
        if !breaker.should_allow() {
            let retry_after = breaker.retry_after().unwrap_or_default();
            warn!(?retry_after, "circuit open; request rejected");
            return Err(RequestError::CircuitOpen { retry_after });
        }

        let waiter = options.cancel.clone().unwrap_or_default();
        if waiter.is_cancelled() {
            debug!("caller cancelled before dispatch");
            return Ok(None);
        }
        let wait_limit = options.timeout.unwrap_or_else(|| self.executor.default_timeout());

        let request = self.build_request(method, path, payload, options)?;
        let key = RequestKey::for_request(&request);

        // The shared request runs under the registry's token; the caller's
        // own token and timeout only bound the caller's wait.
        let executor = self.executor.clone();
        let shared = self.context.deduplicator().get_or_create(key, move |cancel| async move {
            executor.execute(request.cancel_token(cancel)).await
        });

        let outcome = if shared.is_leader() {
            tokio::select! {
                biased;
                () = waiter.cancelled() => Err(RequestError::Cancelled),
                result = shared => result,
            }
        } else {
            tokio::select! {
                biased;
                () = waiter.cancelled() => Err(RequestError::Cancelled),
                result = tokio::time::timeout(wait_limit, shared) => match result {
                    Ok(result) => result,
                    Err(_) => self.joined_wait_elapsed(wait_limit),
                },
            }
        };

        match outcome {
            Ok(body) => Ok(Some(body)),
            Err(RequestError::Cancelled) => {
                debug!("request cancelled");
                Ok(None)
            }
            Err(err) => {
                debug!(error = %err, kind = err.label(), "request failed");
                Err(err)
            }
        }
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        payload: RequestPayload,
        options: RequestOptions,
    ) -> RequestResult<HttpRequest> {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                RequestError::InvalidRequest(format!("header name '{name}': {err}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|err| {
                RequestError::InvalidRequest(format!("header value for '{name}': {err}"))
            })?;
            headers.insert(name, value);
        }

        match &payload {
            RequestPayload::Json(_) if !headers.contains_key(CONTENT_TYPE) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            RequestPayload::Multipart(_) => {
                headers.remove(CONTENT_TYPE);
            }
            _ => {}
        }

        if !headers.contains_key(&self.tenant_header) {
            if let Some(tenant) = self.context.tenant().or_else(|| self.default_tenant.clone()) {
                let value = HeaderValue::from_str(&tenant).map_err(|err| {
                    RequestError::InvalidRequest(format!("tenant id '{tenant}': {err}"))
                })?;
                headers.insert(self.tenant_header.clone(), value);
            }
        }

        let mut request = HttpRequest::new(method, self.resolve(path)?).payload(payload);
        request.headers = headers;
        request.timeout = options.timeout;
        Ok(request)
    }

    /// Outcome for a joined caller whose own timeout ran out first. The
    /// shared request keeps running and nothing is reported to the breaker.
    fn joined_wait_elapsed(&self, waited: Duration) -> RequestResult<ResponseBody> {
        warn!(?waited, "timed out waiting on shared request");
        match self.executor.timeout_policy() {
            TimeoutPolicy::Cancel => Err(RequestError::Cancelled),
            TimeoutPolicy::Fail => Err(RequestError::Timeout(waited)),
        }
    }
}
