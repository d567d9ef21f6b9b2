//! Wait - Retry and state-refresh primitives
//!
//! The log service applies changes asynchronously: a mutation that returned
//! success is not necessarily visible to the next read. Resource handlers wrap
//! mutating calls in [`retry_mutate`] to ride out transient failures, and then
//! use [`poll_until`] to wait until the remote side reflects the change.
//!
//! Both run on the caller's task and only suspend in `tokio::time::sleep`
//! between attempts.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::provider::{ErrorKind, ProviderError};

// =============================================================================
// Retry
// =============================================================================

/// Linear backoff schedule: `initial`, `initial + increment`, ... capped at `cap`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub increment: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub const fn new(initial: Duration, increment: Duration, cap: Duration) -> Self {
        Self {
            initial,
            increment,
            cap,
        }
    }

    /// Same delay between every attempt
    pub const fn constant(delay: Duration) -> Self {
        Self::new(delay, Duration::ZERO, delay)
    }

    /// Delay to wait after the given (zero-based) failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial
            .saturating_add(self.increment.saturating_mul(attempt))
            .min(self.cap)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
    }
}

/// Error returned by [`retry_mutate`]
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation failed with an error that is not worth retrying
    #[error("{0}")]
    Terminal(#[source] E),
    /// The operation kept failing transiently until the timeout elapsed
    #[error("gave up after {attempts} attempts in {elapsed:?}: {last}")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        last: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying operation error
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Terminal(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl<E: Into<ProviderError>> From<RetryError<E>> for ProviderError {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Terminal(e) => e.into(),
            RetryError::Exhausted {
                attempts,
                elapsed,
                last,
            } => {
                let mut inner: ProviderError = last.into();
                inner.kind = ErrorKind::Timeout;
                inner.message = format!(
                    "gave up after {} attempts in {:?}: {}",
                    attempts, elapsed, inner.message
                );
                inner
            }
        }
    }
}

/// Invoke a mutating operation, retrying transient failures until `timeout`
///
/// The operation is retried only while `is_retryable` accepts the error and
/// the deadline has not passed. Each sleep is clamped to the time left, so the
/// whole call overruns `timeout` by at most the duration of the last attempt.
pub async fn retry_mutate<T, E, F, Fut, R>(
    mut operation: F,
    is_retryable: R,
    timeout: Duration,
    backoff: Backoff,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: fmt::Display,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempts: u32 = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        attempts += 1;

        if !is_retryable(&err) {
            return Err(RetryError::Terminal(err));
        }

        let now = Instant::now();
        if now >= deadline {
            log::warn!(
                "giving up after {} attempts ({:?}): {}",
                attempts,
                now - start,
                err
            );
            return Err(RetryError::Exhausted {
                attempts,
                elapsed: now - start,
                last: err,
            });
        }

        let delay = backoff.delay(attempts - 1).min(deadline - now);
        log::debug!(
            "attempt {} failed with a retryable error, retrying in {:?}: {}",
            attempts,
            delay,
            err
        );
        sleep(delay).await;
    }
}

// =============================================================================
// State refresh
// =============================================================================

/// Result of one state fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// The object exists and reports this state label
    State(String),
    /// The object does not exist
    NotFound,
}

impl Fetched {
    pub fn state(label: impl Into<String>) -> Self {
        Fetched::State(label.into())
    }
}

/// How a poll ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The object reported one of the target labels
    ReachedTarget(String),
    /// The object disappeared while awaiting deletion
    Deleted,
    /// The object reported one of the failure labels
    ReachedFailState(String),
    /// The timeout elapsed first
    TimedOut { last_state: Option<String> },
    /// The object kept being absent while it was expected to exist
    NotFound,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::ReachedTarget(_) | PollOutcome::Deleted)
    }
}

/// Configuration of a state-refresh poll
#[derive(Debug, Clone)]
pub struct StateConf {
    /// Expected intermediate labels; only reported, never enforced
    pub pending: Vec<String>,
    /// Labels that end the poll successfully
    pub target: Vec<String>,
    /// Labels that end the poll with a failure
    pub fail: Vec<String>,
    /// Treat "not found" as success
    pub awaiting_deletion: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Minimum wait before the first check
    pub delay: Duration,
    /// Consecutive "not found" results tolerated while the object should exist
    pub not_found_checks: u32,
}

impl StateConf {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

    /// Wait for the object to report one of `target`
    pub fn new<S: AsRef<str>>(target: &[S], timeout: Duration) -> Self {
        Self {
            pending: Vec::new(),
            target: target.iter().map(|s| s.as_ref().to_string()).collect(),
            fail: Vec::new(),
            awaiting_deletion: false,
            timeout,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            delay: Duration::ZERO,
            not_found_checks: Self::DEFAULT_NOT_FOUND_CHECKS,
        }
    }

    /// Wait for the object to disappear
    pub fn deletion(timeout: Duration) -> Self {
        let mut conf = Self::new::<&str>(&[], timeout);
        conf.awaiting_deletion = true;
        conf
    }

    pub fn with_pending<S: AsRef<str>>(mut self, pending: &[S]) -> Self {
        self.pending = pending.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_fail<S: AsRef<str>>(mut self, fail: &[S]) -> Self {
        self.fail = fail.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Poll and turn every outcome other than success into a [`PollError`]
    pub async fn wait<F, Fut, E>(&self, fetch_state: F) -> Result<PollOutcome, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Fetched, E>>,
    {
        match poll_until(self, fetch_state).await.map_err(PollError::Fetch)? {
            outcome @ (PollOutcome::ReachedTarget(_) | PollOutcome::Deleted) => Ok(outcome),
            PollOutcome::ReachedFailState(state) => Err(PollError::Failed { state }),
            PollOutcome::TimedOut { last_state } => Err(PollError::Timeout {
                timeout: self.timeout,
                last_state,
            }),
            PollOutcome::NotFound => Err(PollError::NotFound {
                checks: self.not_found_checks,
            }),
        }
    }
}

/// Repeatedly fetch the object's state until it settles or `conf.timeout` elapses
///
/// Fetch errors are returned immediately; retrying them is the caller's job.
/// The timeout is checked after every sleep, so a poll can overrun it by at
/// most one poll interval.
pub async fn poll_until<F, Fut, E>(conf: &StateConf, mut fetch_state: F) -> Result<PollOutcome, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Fetched, E>>,
{
    let deadline = Instant::now() + conf.timeout;
    let mut last_state: Option<String> = None;
    let mut not_found_ticks: u32 = 0;

    if !conf.delay.is_zero() {
        sleep(conf.delay).await;
    }

    loop {
        match fetch_state().await? {
            Fetched::NotFound => {
                if conf.awaiting_deletion {
                    return Ok(PollOutcome::Deleted);
                }
                not_found_ticks += 1;
                if not_found_ticks > conf.not_found_checks {
                    return Ok(PollOutcome::NotFound);
                }
            }
            Fetched::State(label) => {
                not_found_ticks = 0;
                if conf.target.contains(&label) {
                    return Ok(PollOutcome::ReachedTarget(label));
                }
                if conf.fail.contains(&label) {
                    return Ok(PollOutcome::ReachedFailState(label));
                }
                if !conf.pending.is_empty() && !conf.pending.contains(&label) {
                    log::warn!(
                        "unexpected state '{}', wanted target {:?}",
                        label,
                        conf.target
                    );
                }
                last_state = Some(label);
            }
        }

        sleep(conf.poll_interval).await;
        if Instant::now() >= deadline {
            return Ok(PollOutcome::TimedOut { last_state });
        }
    }
}

/// Error returned by [`StateConf::wait`]
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    /// Fetching the state failed
    #[error("{0}")]
    Fetch(#[source] E),
    /// The object reached a failure state
    #[error("resource entered failure state '{state}'")]
    Failed { state: String },
    /// The object did not settle in time
    #[error(
        "timeout after {timeout:?} waiting for state to settle{}",
        last_state_suffix(.last_state)
    )]
    Timeout {
        timeout: Duration,
        last_state: Option<String>,
    },
    /// The object was absent for too many consecutive checks
    #[error("resource not found after {checks} consecutive checks")]
    NotFound { checks: u32 },
}

fn last_state_suffix(last_state: &Option<String>) -> String {
    match last_state {
        Some(state) => format!(" (last state: '{}')", state),
        None => String::new(),
    }
}

impl<E> From<PollError<E>> for ProviderError
where
    E: Into<ProviderError> + fmt::Display,
{
    fn from(err: PollError<E>) -> Self {
        let kind = match err {
            PollError::Fetch(e) => return e.into(),
            PollError::Failed { .. } => ErrorKind::Remote,
            PollError::Timeout { .. } => ErrorKind::Timeout,
            PollError::NotFound { .. } => ErrorKind::NotFound,
        };
        ProviderError::with_kind(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    fn script(states: &[Fetched]) -> VecDeque<Fetched> {
        states.iter().cloned().collect()
    }

    fn pending() -> Fetched {
        Fetched::state("Pending")
    }

    fn available() -> Fetched {
        Fetched::state("Available")
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        let backoff = Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(6),
        );
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(3));
        assert_eq!(backoff.delay(2), Duration::from_secs(5));
        assert_eq!(backoff.delay(3), Duration::from_secs(6));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(6));

        let constant = Backoff::constant(Duration::from_millis(500));
        assert_eq!(constant.delay(7), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = retry_mutate(
            || {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err("Throttling".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            |e: &String| e == "Throttling",
            Duration::from_secs(60),
            Backoff::default(),
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_returns_terminal_error_without_retrying() {
        let mut calls = 0;
        let result: Result<(), _> = retry_mutate(
            || {
                calls += 1;
                async { Err("QuotaExceed".to_string()) }
            },
            |e: &String| e == "Throttling",
            Duration::from_secs(60),
            Backoff::default(),
        )
        .await;

        assert!(matches!(result, Err(RetryError::Terminal(ref e)) if e == "QuotaExceed"));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_never_overruns_timeout_by_more_than_one_interval() {
        let backoff = Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(5),
        );

        for timeout_secs in [0, 1, 7, 30, 61] {
            let timeout = Duration::from_secs(timeout_secs);
            let start = Instant::now();
            let result: Result<(), _> = retry_mutate(
                || async { Err("ServerBusy".to_string()) },
                |_| true,
                timeout,
                backoff,
            )
            .await;

            let elapsed = start.elapsed();
            assert!(elapsed <= timeout + backoff.cap, "{:?} > {:?}", elapsed, timeout);
            match result {
                Err(RetryError::Exhausted { attempts, last, .. }) => {
                    assert!(attempts >= 1);
                    assert_eq!(last, "ServerBusy");
                }
                other => panic!("Expected Exhausted, got {:?}", other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_retries_at_least_once_when_time_remains() {
        let mut calls = 0;
        let _: Result<(), _> = retry_mutate(
            || {
                calls += 1;
                async { Err("RequestTimeout".to_string()) }
            },
            |_| true,
            Duration::from_millis(10),
            Backoff::constant(Duration::from_secs(1)),
        )
        .await;

        assert!(calls >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_reaches_target_after_pending_states() {
        let mut states = script(&[pending(), pending(), available()]);
        let mut calls = 0;
        let conf = StateConf::new(&["Available"], Duration::from_secs(60))
            .with_pending(&["Pending"])
            .with_poll_interval(Duration::from_secs(1));

        let outcome = poll_until(&conf, || {
            calls += 1;
            let next = states.pop_front().unwrap_or_else(pending);
            async move { Ok::<_, String>(next) }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::ReachedTarget("Available".to_string()));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_deletion_succeeds_on_not_found() {
        let mut states = script(&[available(), Fetched::NotFound]);
        let mut calls = 0;
        let conf = StateConf::deletion(Duration::from_secs(60))
            .with_poll_interval(Duration::from_secs(1));

        let outcome = poll_until(&conf, || {
            calls += 1;
            let next = states.pop_front().unwrap_or_else(available);
            async move { Ok::<_, String>(next) }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Deleted);
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_deletion_ignores_pending_contents() {
        for pending_states in [vec![], vec!["Deleting"], vec!["Available", "NotFound"]] {
            let conf = StateConf::deletion(Duration::from_secs(60)).with_pending(&pending_states);
            let outcome = poll_until(&conf, || async { Ok::<_, String>(Fetched::NotFound) })
                .await
                .unwrap();
            assert_eq!(outcome, PollOutcome::Deleted);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poll_stops_on_fail_state() {
        let mut states = script(&[pending(), Fetched::state("Failed"), available()]);
        let mut calls = 0;
        let conf = StateConf::new(&["Available"], Duration::from_secs(60))
            .with_fail(&["Failed"])
            .with_poll_interval(Duration::from_secs(1));

        let outcome = poll_until(&conf, || {
            calls += 1;
            let next = states.pop_front().unwrap_or_else(available);
            async move { Ok::<_, String>(next) }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::ReachedFailState("Failed".to_string()));
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_propagates_fetch_errors_immediately() {
        let mut calls = 0;
        let conf = StateConf::new(&["Available"], Duration::from_secs(60));

        let result = poll_until(&conf, || {
            calls += 1;
            async { Err::<Fetched, _>("Unauthorized".to_string()) }
        })
        .await;

        assert_eq!(result, Err("Unauthorized".to_string()));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_with_last_state() {
        let timeout = Duration::from_secs(10);
        let interval = Duration::from_secs(3);
        let conf = StateConf::new(&["Available"], timeout).with_poll_interval(interval);
        let start = Instant::now();

        let outcome = poll_until(&conf, || async { Ok::<_, String>(pending()) })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                last_state: Some("Pending".to_string())
            }
        );
        assert!(start.elapsed() >= timeout);
        assert!(start.elapsed() <= timeout + interval);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_gives_up_after_not_found_checks() {
        let mut calls = 0;
        let conf = StateConf::new(&["Available"], Duration::from_secs(3600))
            .with_poll_interval(Duration::from_secs(1))
            .with_not_found_checks(3);

        let outcome = poll_until(&conf, || {
            calls += 1;
            async { Ok::<_, String>(Fetched::NotFound) }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::NotFound);
        assert_eq!(calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_waits_for_delay_before_first_check() {
        let delay = Duration::from_secs(2);
        let conf = StateConf::new(&["Available"], Duration::from_secs(60)).with_delay(delay);
        let start = Instant::now();
        let mut first_check = None;

        poll_until(&conf, || {
            first_check.get_or_insert_with(|| start.elapsed());
            async { Ok::<_, String>(available()) }
        })
        .await
        .unwrap();

        assert!(first_check.unwrap() >= delay);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_converts_timeout_into_provider_error() {
        let conf = StateConf::new(&["enabled"], Duration::from_secs(5))
            .with_poll_interval(Duration::from_secs(1));

        let err = conf
            .wait(|| async { Ok::<_, ProviderError>(Fetched::state("disabled")) })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PollError::Timeout { last_state: Some(ref s), .. } if s == "disabled"
        ));

        let err: ProviderError = err.into();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("last state: 'disabled'"));
    }

    #[test]
    fn exhausted_retry_becomes_timeout_provider_error() {
        let err: RetryError<ProviderError> = RetryError::Exhausted {
            attempts: 4,
            elapsed: Duration::from_secs(10),
            last: ProviderError::with_kind(ErrorKind::Transient, "Throttling"),
        };
        let err: ProviderError = err.into();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.starts_with("gave up after 4 attempts"));
    }

    #[test]
    fn errors_keep_their_cause_as_source() {
        use std::error::Error;

        let err: RetryError<ProviderError> = RetryError::Exhausted {
            attempts: 2,
            elapsed: Duration::from_secs(3),
            last: ProviderError::with_kind(ErrorKind::Transient, "ServerBusy"),
        };
        assert_eq!(err.to_string(), "gave up after 2 attempts in 3s: ServerBusy");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("ServerBusy"));

        let err: PollError<ProviderError> = PollError::Fetch(ProviderError::new("Unauthorized"));
        assert_eq!(err.to_string(), "Unauthorized");
        assert!(err.source().is_some());

        let err: PollError<ProviderError> = PollError::Timeout {
            timeout: Duration::from_secs(30),
            last_state: None,
        };
        assert_eq!(err.to_string(), "timeout after 30s waiting for state to settle");
        assert!(err.source().is_none());
    }
}
