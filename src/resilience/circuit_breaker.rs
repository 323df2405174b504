//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first call attempted after the open duration elapsed
//! Half-Open → Closed: the trial call succeeds (counter reset)
//! Half-Open → Open: the trial call fails (retry time restarts from now)
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global)
//! - Fail fast in Open state; rejected calls are not counted as failures
//! - Single trial call in Half-Open; concurrent callers are rejected
//! - Each transition starts a new generation; a call only reports into the
//!   generation it was admitted in, so stragglers cannot decide a trial
//! - No jitter, no sampling: transitions are fully deterministic
//! - Every failure kind (timeout, refused connection, error status) counts
//!   the same

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The call was rejected without being attempted.
    #[error("Circuit breaker is OPEN for {service}")]
    Open { service: String },

    /// The call was attempted and failed.
    #[error(transparent)]
    Inner(E),
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub open_duration: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            open_duration: config.open_duration(),
        }
    }
}

/// Read-only view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    /// Only set while the breaker is open.
    pub earliest_retry: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    earliest_retry: Option<Instant>,
    generation: u64,
}

impl BreakerInner {
    fn enter(&mut self, state: BreakerState) {
        self.state = state;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Circuit breaker guarding calls to one backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker for `service`.
    pub fn new(service: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            service: service.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                earliest_retry: None,
                generation: 0,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            earliest_retry: inner.earliest_retry,
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns the operation's result (recording success), its error
    /// wrapped in [`BreakerError::Inner`] (recording failure), or
    /// [`BreakerError::Open`] without invoking the operation at all.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = self.admit()?;
        match operation().await {
            Ok(value) => {
                attempt.succeed();
                Ok(value)
            }
            Err(e) => {
                attempt.fail();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Decide whether a call may proceed.
    fn admit<E>(&self) -> Result<Attempt<'_>, BreakerError<E>> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {}
            BreakerState::Open => {
                let ready = inner
                    .earliest_retry
                    .map_or(true, |retry_at| Instant::now() >= retry_at);
                if !ready {
                    return Err(self.rejected());
                }
                inner.enter(BreakerState::HalfOpen);
                inner.earliest_retry = None;
                let generation = inner.generation;
                drop(inner);
                self.transitioned(BreakerState::HalfOpen);
                return Ok(Attempt {
                    breaker: self,
                    generation,
                    finished: false,
                });
            }
            // The single trial call is already in flight.
            BreakerState::HalfOpen => return Err(self.rejected()),
        }
        Ok(Attempt {
            breaker: self,
            generation: inner.generation,
            finished: false,
        })
    }

    fn on_success(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(service = %self.service, "Ignoring result from an earlier breaker state");
            return;
        }
        match inner.state {
            BreakerState::Closed => inner.consecutive_failures = 0,
            BreakerState::HalfOpen => {
                inner.enter(BreakerState::Closed);
                inner.consecutive_failures = 0;
                inner.earliest_retry = None;
                drop(inner);
                self.transitioned(BreakerState::Closed);
            }
            // Open never admits calls, so nothing reports into it.
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(service = %self.service, "Ignoring result from an earlier breaker state");
            return;
        }
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let should_open = match inner.state {
            BreakerState::Closed => inner.consecutive_failures >= self.settings.failure_threshold,
            BreakerState::HalfOpen => true,
            BreakerState::Open => false,
        };
        if should_open {
            inner.enter(BreakerState::Open);
            inner.earliest_retry = Some(Instant::now() + self.settings.open_duration);
            let failures = inner.consecutive_failures;
            drop(inner);
            tracing::warn!(
                service = %self.service,
                consecutive_failures = failures,
                open_for = ?self.settings.open_duration,
                "Circuit opened"
            );
            metrics::record_breaker_transition(&self.service, BreakerState::Open);
        }
    }

    fn transitioned(&self, state: BreakerState) {
        tracing::info!(service = %self.service, state = state.as_str(), "Circuit state changed");
        metrics::record_breaker_transition(&self.service, state);
    }

    fn rejected<E>(&self) -> BreakerError<E> {
        tracing::debug!(service = %self.service, "Call rejected by open circuit");
        BreakerError::Open {
            service: self.service.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// An admitted call. Dropping it unresolved (the caller's future was
/// cancelled) counts as a failure so a half-open breaker cannot wedge.
struct Attempt<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    finished: bool,
}

impl Attempt<'_> {
    fn succeed(&mut self) {
        self.finished = true;
        self.breaker.on_success(self.generation);
    }

    fn fail(&mut self) {
        self.finished = true;
        self.breaker.on_failure(self.generation);
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.on_failure(self.generation);
        }
    }
}
