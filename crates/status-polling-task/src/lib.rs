//! Status polling for remote resources that only report state on request.
//!
//! A [`PollingTask`] repeatedly fetches the status of one resource, waits
//! between fetches according to a [`BackoffStrategy`], and yields a snapshot
//! only when the [`ChangePredicate`] reports a meaningful change. It pauses
//! itself while the application is in the background.

mod backoff;
mod handle;
mod polling;

pub use backoff::{BackoffStrategy, PollingConfig, BACKOFF_UNIT};
pub use handle::PollingHandle;
pub use polling::{
    default_change_predicate, ChangePredicate, PollingState, PollingTask, Snapshot, StatusFetcher,
};
