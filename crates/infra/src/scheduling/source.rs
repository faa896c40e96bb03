//! What a poller fetches.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, RequestOptions, RequestResult};

/// A resource polled by [`AdaptivePoller`](super::AdaptivePoller).
///
/// `fetch` returns `Ok(None)` when the call was cancelled. `cancel` fires
/// when the poller stops and must be passed down to the request.
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    async fn fetch(&self, cancel: CancellationToken) -> RequestResult<Option<Self::Output>>;

    /// Whether the data needs attention soon (low stock, pending orders).
    /// Urgent data is re-fetched at the short interval.
    fn is_urgent(&self, _data: &Self::Output) -> bool {
        false
    }
}

/// [`PollSource`] built from a fetch closure and an urgency predicate
pub struct FnSource<F, U, T> {
    fetch: F,
    urgency: U,
    _output: PhantomData<fn() -> T>,
}

impl<F, Fut, U, T> FnSource<F, U, T>
where
    F: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = RequestResult<Option<T>>>,
    U: Fn(&T) -> bool,
{
    /// Source calling `fetch` on every cycle and `urgency` on each result
    pub fn new(fetch: F, urgency: U) -> Self {
        Self { fetch, urgency, _output: PhantomData }
    }
}

#[async_trait]
impl<F, Fut, U, T> PollSource for FnSource<F, U, T>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RequestResult<Option<T>>> + Send + 'static,
    U: Fn(&T) -> bool + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    type Output = T;

    async fn fetch(&self, cancel: CancellationToken) -> RequestResult<Option<T>> {
        (self.fetch)(cancel).await
    }

    fn is_urgent(&self, data: &T) -> bool {
        (self.urgency)(data)
    }
}

type Urgency<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Polls one JSON endpoint through a shared [`ApiClient`]
pub struct EndpointSource<T> {
    client: Arc<ApiClient>,
    path: String,
    urgency: Option<Urgency<T>>,
}

impl<T> EndpointSource<T> {
    /// Poll `path` through `client`; data is never urgent until [`with_urgency`](Self::with_urgency) is set
    pub fn new(client: Arc<ApiClient>, path: impl Into<String>) -> Self {
        Self { client, path: path.into(), urgency: None }
    }

    /// Mark fetched data matching `urgency` as urgent
    pub fn with_urgency(mut self, urgency: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.urgency = Some(Arc::new(urgency));
        self
    }

    /// Path polled on every cycle
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl<T> PollSource for EndpointSource<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    type Output = T;

    async fn fetch(&self, cancel: CancellationToken) -> RequestResult<Option<T>> {
        let options = RequestOptions::new().cancel_token(cancel);
        self.client.get_json(&self.path, options).await
    }

    fn is_urgent(&self, data: &T) -> bool {
        self.urgency.as_ref().is_some_and(|urgent| urgent(data))
    }
}
