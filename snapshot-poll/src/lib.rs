//! Backoff-driven status polling for snapshot and restore jobs
//!
//! The bridge performs the bulk transfer asynchronously; callers observe
//! progress by asking for status repeatedly. This crate owns the waiting
//! between those requests so every caller polls with the same policies.
//!
//! Failures reported by the status probe are never retried here. A probe that
//! errors ends the poll immediately and the error is handed back unchanged.

use backoff::backoff::Backoff;
pub use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Outcome of a single status probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState<T> {
    /// The job is still running; carries the status tag last reported
    Pending(String),
    /// The job reached a state the caller was waiting for
    Ready(T),
}

/// Errors that end a poll
#[derive(Error, Debug)]
pub enum PollError<E> {
    #[error("'{operation}' still pending after {attempts} attempts (last status: {last_status})")]
    TimedOut {
        operation: &'static str,
        attempts: usize,
        last_status: String,
    },
    #[error("'{operation}' failed on attempt {attempt}: {source}")]
    Failed {
        operation: &'static str,
        attempt: usize,
        #[source]
        source: E,
    },
}

impl<E> PollError<E> {
    /// Number of probes made before the poll ended
    pub fn attempts(&self) -> usize {
        match self {
            PollError::TimedOut { attempts, .. } => *attempts,
            PollError::Failed { attempt, .. } => *attempt,
        }
    }
}

/// Poll `probe` until it reports [`PollState::Ready`], sleeping on the current thread
pub fn poll_until<T, E, F>(
    op_name: &'static str,
    policy: ExponentialBackoff,
    probe: F,
) -> Result<T, PollError<E>>
where
    F: FnMut(usize) -> Result<PollState<T>, E>,
{
    poll_until_with_sleeper(op_name, policy, std::thread::sleep, probe)
}

/// Poll `probe` with an injectable sleeper
///
/// The policy decides the delay between probes and when to give up: once
/// `next_backoff` returns `None` the poll ends with [`PollError::TimedOut`].
pub fn poll_until_with_sleeper<T, E, F, S>(
    op_name: &'static str,
    mut policy: ExponentialBackoff,
    mut sleeper: S,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    F: FnMut(usize) -> Result<PollState<T>, E>,
    S: FnMut(Duration),
{
    policy.reset();
    let mut attempt = 1;

    loop {
        debug!("Polling '{}' (attempt {})", op_name, attempt);

        match probe(attempt) {
            Ok(PollState::Ready(value)) => {
                debug!("'{}' ready after {} attempts", op_name, attempt);
                return Ok(value);
            }
            Ok(PollState::Pending(status)) => match policy.next_backoff() {
                Some(delay) => {
                    debug!(
                        "'{}' pending with status {}, next poll in {:?}",
                        op_name, status, delay
                    );
                    sleeper(delay);
                    attempt += 1;
                }
                None => {
                    warn!(
                        "'{}' still pending after {} attempts, giving up",
                        op_name, attempt
                    );
                    return Err(PollError::TimedOut {
                        operation: op_name,
                        attempts: attempt,
                        last_status: status,
                    });
                }
            },
            Err(source) => {
                warn!("'{}' status probe failed on attempt {}", op_name, attempt);
                return Err(PollError::Failed {
                    operation: op_name,
                    attempt,
                    source,
                });
            }
        }
    }
}

/// Policy for waiting on bridge jobs; transfers can run for hours
pub fn job_status_poll_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(5))
        .with_max_interval(Duration::from_secs(300))
        .with_max_elapsed_time(Some(Duration::from_secs(12 * 60 * 60)))
        .with_multiplier(1.5)
        .build()
}

/// Short policy for interactive use where the caller only waits briefly
pub fn interactive_poll_policy(max_wait: Duration) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(Duration::from_secs(10))
        .with_max_elapsed_time(Some(max_wait))
        .with_multiplier(2.0)
        .build()
}
