//! Bounded polling over a backend that only answers "ask again later".
//!
//! A wait has two independent termination paths that race each other:
//! - a wall-clock deadline (`WaitPolicy::timeout`), authoritative
//! - an iteration cap (`WaitPolicy::max_polls` checks, `poll_interval` apart), a backstop
//!
//! With the default policy the cap spans 50s against a 10s deadline, so the
//! deadline always fires first. Both paths report `Error::Timeout`.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::{conversation::types::Readiness, errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            poll_interval: Duration::from_millis(500),
            max_polls: 100,
        }
    }
}

impl WaitPolicy {
    /// Time the iteration cap alone would allow.
    pub fn poll_budget(&self) -> Duration {
        self.poll_interval
            .saturating_mul(self.max_polls.saturating_sub(1))
    }

    /// True when the deadline, not the iteration cap, bounds the wait.
    pub fn deadline_binds(&self) -> bool {
        self.poll_budget() >= self.timeout
    }
}

/// Poll `check_ready` until it reports ready, then run `on_ready` once.
///
/// - `Readiness::Failed` ends the wait with `Error::RunFailed`; `on_ready` is not called.
/// - An error from `check_ready` ends the wait with that error.
/// - Deadline or iteration cap exhausted: `Error::Timeout`.
///
/// The deadline only covers polling. When it fires the in-flight check is dropped.
pub async fn wait_for<T, C, CF, A, AF>(
    check_ready: C,
    on_ready: A,
    policy: WaitPolicy,
) -> Result<T>
where
    C: FnMut() -> CF,
    CF: Future<Output = Result<Readiness>>,
    A: FnOnce() -> AF,
    AF: Future<Output = Result<T>>,
{
    let started = Instant::now();

    tokio::select! {
        polled = poll_until_ready(check_ready, policy, started) => polled?,
        _ = sleep(policy.timeout) => {
            debug!(timeout_ms = policy.timeout.as_millis() as u64, "run wait deadline reached");
            return Err(Error::Timeout(policy.timeout));
        }
    }

    on_ready().await
}

async fn poll_until_ready<C, CF>(
    mut check_ready: C,
    policy: WaitPolicy,
    started: Instant,
) -> Result<()>
where
    C: FnMut() -> CF,
    CF: Future<Output = Result<Readiness>>,
{
    for attempt in 1..=policy.max_polls {
        match check_ready().await? {
            Readiness::Ready => {
                debug!(attempt, "run ready");
                return Ok(());
            }
            Readiness::Failed(status) => {
                debug!(attempt, %status, "run failed");
                return Err(Error::RunFailed { status });
            }
            Readiness::NotReady => {
                if attempt < policy.max_polls {
                    sleep(policy.poll_interval).await;
                }
            }
        }
    }

    debug!(max_polls = policy.max_polls, "run wait poll budget exhausted");
    Err(Error::Timeout(started.elapsed()))
}
