//! Adaptive poller
//!
//! Re-fetches a [`PollSource`] on a self-adjusting period: exponential
//! backoff after failures, the short interval while the data is urgent and
//! the normal interval otherwise. Cancelled fetches and circuit-open
//! rejections pause the poller without counting as failures.
//!
//! Cycles never overlap: the next timer is armed only after the current
//! fetch settles. After `stop` no state is mutated, even by a fetch that
//! resolves late.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tablesync_common::resilience::exponential_delay;
use tablesync_domain::PollerConfig;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::{SchedulerError, SchedulerResult};
use super::source::PollSource;
use crate::api::{ErrorCategory, RequestError, RequestResult};

/// Delay before the next cycle.
///
/// `min(max, base * 2^failure_count)` after failures, otherwise the short
/// interval for urgent data and the normal interval for the rest.
pub fn next_period(config: &PollerConfig, failure_count: u32, urgent: bool) -> Duration {
    if failure_count > 0 {
        exponential_delay(config.base_interval(), config.max_interval(), failure_count)
    } else if urgent {
        config.short_interval()
    } else {
        config.normal_interval()
    }
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerPhase {
    /// Never started
    Idle,
    /// Started; first fetch in flight
    Running,
    /// Last fetch succeeded with ordinary data
    Normal,
    /// Last fetch succeeded with urgent data
    Urgent,
    /// Last fetch failed; waiting out the backoff period
    Backoff,
    /// Last fetch was cancelled or rejected by an open circuit
    Paused,
    Stopped,
}

impl fmt::Display for PollerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Normal => "normal",
            Self::Urgent => "urgent",
            Self::Backoff => "backoff",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Observable poller state
#[derive(Debug)]
pub struct PollerSnapshot<T> {
    /// Lifecycle phase
    pub phase: PollerPhase,
    /// Data from the last successful fetch
    pub data: Option<Arc<T>>,
    /// Whether the last successful data was urgent
    pub urgent: bool,
    /// Consecutive failed fetches
    pub failure_count: u32,
    /// Delay until the next cycle
    pub current_period: Duration,
    /// When the last fetch settled
    pub last_fetch_at: Option<DateTime<Utc>>,
    /// When the last fetch succeeded
    pub last_success_at: Option<DateTime<Utc>>,
    /// Error of the last failed or rejected fetch
    pub last_error: Option<RequestError>,
    /// Fetches settled since creation
    pub fetch_count: u64,
    run_id: u64,
}

impl<T> Clone for PollerSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            phase: self.phase,
            data: self.data.clone(),
            urgent: self.urgent,
            failure_count: self.failure_count,
            current_period: self.current_period,
            last_fetch_at: self.last_fetch_at,
            last_success_at: self.last_success_at,
            last_error: self.last_error.clone(),
            fetch_count: self.fetch_count,
            run_id: self.run_id,
        }
    }
}

impl<T> PollerSnapshot<T> {
    fn idle(config: &PollerConfig) -> Self {
        Self {
            phase: PollerPhase::Idle,
            data: None,
            urgent: false,
            failure_count: 0,
            current_period: config.normal_interval(),
            last_fetch_at: None,
            last_success_at: None,
            last_error: None,
            fetch_count: 0,
            run_id: 0,
        }
    }

    /// Whether the poller has been stopped
    pub fn is_stopped(&self) -> bool {
        self.phase == PollerPhase::Stopped
    }
}

/// Adaptive poller over a [`PollSource`]
///
/// Dropping the poller stops it.
pub struct AdaptivePoller<S: PollSource> {
    source: Arc<S>,
    config: PollerConfig,
    state: Arc<watch::Sender<PollerSnapshot<S::Output>>>,
    refresh: Arc<Notify>,
    cancellation_token: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    run_id: u64,
}

impl<S: PollSource> AdaptivePoller<S> {
    /// Create a poller; nothing is fetched until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the intervals are zero or
    /// out of order
    pub fn new(source: S, config: PollerConfig) -> SchedulerResult<Self> {
        Self::with_shared_source(Arc::new(source), config)
    }

    /// Same as [`new`](Self::new) for a source shared with other owners.
    pub fn with_shared_source(source: Arc<S>, config: PollerConfig) -> SchedulerResult<Self> {
        config.validate().map_err(|err| SchedulerError::InvalidConfig(err.to_string()))?;

        let (state, _) = watch::channel(PollerSnapshot::idle(&config));
        Ok(Self {
            source,
            config,
            state: Arc::new(state),
            refresh: Arc::new(Notify::new()),
            cancellation_token: CancellationToken::new(),
            task_handle: None,
            run_id: 0,
        })
    }

    /// Intervals this poller runs with
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Start polling: fetch immediately, then keep re-scheduling.
    ///
    /// Can be called again after `stop`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if the poll task is active
    #[instrument(skip(self))]
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.run_id += 1;
        self.cancellation_token = CancellationToken::new();
        // A refresh requested during the previous run must not leak into
        // this one as a stored permit.
        self.refresh = Arc::new(Notify::new());

        let run_id = self.run_id;
        let normal = self.config.normal_interval();
        self.state.send_modify(|snapshot| {
            snapshot.run_id = run_id;
            snapshot.phase = PollerPhase::Running;
            snapshot.failure_count = 0;
            snapshot.current_period = normal;
        });

        let poll_loop = PollLoop {
            source: Arc::clone(&self.source),
            config: self.config,
            state: Arc::clone(&self.state),
            refresh: Arc::clone(&self.refresh),
            cancel: self.cancellation_token.clone(),
            run_id,
        };
        self.task_handle = Some(tokio::spawn(poll_loop.run()));

        info!(run_id, "poller started");
        Ok(())
    }

    /// Stop polling and abort any in-flight fetch.
    ///
    /// Idempotent; a no-op if the poller is not running.
    pub fn stop(&mut self) {
        self.cancellation_token.cancel();
        let stopped = self.mark_stopped();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
        if stopped {
            info!(run_id = self.run_id, "poller stopped");
        }
    }

    /// Stop polling and wait for the poll task to finish.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Timeout` if the task does not finish within
    /// the configured stop timeout (it is then aborted), or
    /// `SchedulerError::TaskJoinFailed` if it panicked
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) -> SchedulerResult<()> {
        self.cancellation_token.cancel();
        self.mark_stopped();

        let Some(mut handle) = self.task_handle.take() else {
            return Ok(());
        };

        let join_timeout = self.config.stop_timeout();
        match tokio::time::timeout(join_timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!(run_id = self.run_id, "poller shut down");
                Ok(())
            }
            Ok(Err(err)) if err.is_cancelled() => Ok(()),
            Ok(Err(err)) => Err(SchedulerError::TaskJoinFailed(err.to_string())),
            Err(_) => {
                handle.abort();
                warn!(?join_timeout, "poll task did not stop in time; aborted");
                Err(SchedulerError::Timeout { duration: join_timeout })
            }
        }
    }

    /// Run a cycle now instead of waiting for the timer.
    ///
    /// If a fetch is in flight, the next cycle starts as soon as it settles.
    pub fn refresh_now(&self) {
        if self.is_running() {
            debug!("manual refresh requested");
            self.refresh.notify_one();
        }
    }

    /// Whether the poll task is active
    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<PollerSnapshot<S::Output>> {
        self.state.subscribe()
    }

    /// Current state
    pub fn snapshot(&self) -> PollerSnapshot<S::Output> {
        self.state.borrow().clone()
    }

    fn mark_stopped(&self) -> bool {
        self.state.send_if_modified(|snapshot| match snapshot.phase {
            PollerPhase::Idle | PollerPhase::Stopped => false,
            _ => {
                snapshot.phase = PollerPhase::Stopped;
                true
            }
        })
    }
}

impl<S: PollSource> Drop for AdaptivePoller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: PollSource> fmt::Debug for AdaptivePoller<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.state.borrow();
        f.debug_struct("AdaptivePoller")
            .field("config", &self.config)
            .field("phase", &snapshot.phase)
            .field("failure_count", &snapshot.failure_count)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// State owned by the spawned poll task
struct PollLoop<S: PollSource> {
    source: Arc<S>,
    config: PollerConfig,
    state: Arc<watch::Sender<PollerSnapshot<S::Output>>>,
    refresh: Arc<Notify>,
    cancel: CancellationToken,
    run_id: u64,
}

impl<S: PollSource> PollLoop<S> {
    async fn run(self) {
        loop {
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = self.source.fetch(self.cancel.child_token()) => result,
            };

            let Some(period) = self.apply(result) else {
                break;
            };

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = self.refresh.notified() => debug!("refreshing ahead of schedule"),
                () = tokio::time::sleep(period) => {}
            }
        }
        debug!(run_id = self.run_id, "poll loop exited");
    }

    /// Fold one fetch outcome into the shared state and return the next
    /// period, or `None` once the poller has been stopped.
    fn apply(&self, result: RequestResult<Option<S::Output>>) -> Option<Duration> {
        let now = Utc::now();
        let mut next = None;

        // The stop check and the mutation happen under the channel lock, so
        // a result that lands after `stop` is discarded whole.
        self.state.send_if_modified(|snapshot| {
            if self.cancel.is_cancelled()
                || snapshot.run_id != self.run_id
                || snapshot.is_stopped()
            {
                return false;
            }

            snapshot.fetch_count += 1;
            snapshot.last_fetch_at = Some(now);

            match result {
                Ok(Some(data)) => {
                    let urgent = self.source.is_urgent(&data);
                    snapshot.failure_count = 0;
                    snapshot.urgent = urgent;
                    snapshot.data = Some(Arc::new(data));
                    snapshot.last_success_at = Some(now);
                    snapshot.last_error = None;
                    snapshot.phase = if urgent { PollerPhase::Urgent } else { PollerPhase::Normal };
                    snapshot.current_period = next_period(&self.config, 0, urgent);
                    debug!(urgent, period = ?snapshot.current_period, "poll succeeded");
                }
                Ok(None) => self.pause(snapshot, None),
                Err(err) if err.category() == ErrorCategory::Cancelled => self.pause(snapshot, None),
                Err(err) if err.category() == ErrorCategory::Degraded => {
                    self.pause(snapshot, err.retry_after());
                    snapshot.last_error = Some(err);
                }
                Err(err) => {
                    snapshot.failure_count = snapshot.failure_count.saturating_add(1);
                    snapshot.phase = PollerPhase::Backoff;
                    snapshot.current_period =
                        next_period(&self.config, snapshot.failure_count, snapshot.urgent);
                    warn!(
                        error = %err,
                        kind = err.label(),
                        failure_count = snapshot.failure_count,
                        period = ?snapshot.current_period,
                        "poll failed; backing off"
                    );
                    snapshot.last_error = Some(err);
                }
            }

            next = Some(snapshot.current_period);
            true
        });

        next
    }

    /// Keep the failure count; wait at least `retry_after` (capped at max).
    fn pause(&self, snapshot: &mut PollerSnapshot<S::Output>, retry_after: Option<Duration>) {
        let floor = retry_after.unwrap_or_default();
        snapshot.phase = PollerPhase::Paused;
        snapshot.current_period = snapshot.current_period.max(floor).min(self.config.max_interval());
        debug!(period = ?snapshot.current_period, "poll paused");
    }
}
