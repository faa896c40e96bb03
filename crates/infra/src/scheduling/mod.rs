//! Background polling
//!
//! [`AdaptivePoller`] keeps a resource fresh (inventory levels, open
//! orders, table status) with explicit lifecycle management:
//! - start/stop with a join handle for the spawned task
//! - cancellation token passed down to every in-flight fetch
//! - failure backoff and urgency-driven speed-up
//! - state published through a `watch` channel

pub mod error;
pub mod poller;
pub mod source;

pub use error::{SchedulerError, SchedulerResult};
pub use poller::{next_period, AdaptivePoller, PollerPhase, PollerSnapshot};
pub use source::{EndpointSource, FnSource, PollSource};
