//! Circuit breaker guarding the upstream tracking service.
//!
//! ```text
//! Closed --(failure_threshold consecutive failures)--> Open
//! Open --(recovery_timeout since last failure)--> HalfOpen (one trial admitted)
//! HalfOpen --(trial succeeds)--> Closed
//! HalfOpen --(trial fails)--> Open
//! ```
//!
//! All transitions happen under one lock so concurrent callers cannot lose an
//! update or both be admitted as the HalfOpen trial.

use crate::metrics_defs::BREAKER_TRANSITIONS;
use parking_lot::Mutex;
use serde::Serialize;
use shared::counter;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Closed,
    Open { since: Instant },
    HalfOpen { trial_in_flight: bool },
}

impl State {
    fn kind(&self) -> BreakerState {
        match self {
            State::Closed => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }
}

struct Inner {
    state: State,
    failure_count: u32,
    last_failure: Option<SystemTime>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    /// Unix timestamp (seconds) of the most recent failure.
    pub last_failure_time: Option<f64>,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        CircuitBreaker {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Returns true if the caller may attempt an upstream call. A caller
    /// admitted in HalfOpen holds the trial and must report its outcome, or
    /// call [`CircuitBreaker::release_trial`] if it abandons the call.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => true,
            State::Open { since } => {
                if since.elapsed() >= self.recovery_timeout {
                    transition(&mut inner, State::HalfOpen {
                        trial_in_flight: true,
                    });
                    true
                } else {
                    false
                }
            }
            State::HalfOpen { trial_in_flight } => {
                if trial_in_flight {
                    false
                } else {
                    inner.state = State::HalfOpen {
                        trial_in_flight: true,
                    };
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => inner.failure_count = 0,
            State::HalfOpen { .. } => {
                inner.failure_count = 0;
                transition(&mut inner, State::Closed);
            }
            // A call admitted before the breaker opened finished late.
            State::Open { .. } => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(SystemTime::now());

        let now = Instant::now();
        match inner.state {
            State::Closed => {
                if inner.failure_count >= self.failure_threshold {
                    tracing::warn!(
                        failure_count = inner.failure_count,
                        "circuit breaker opened"
                    );
                    transition(&mut inner, State::Open { since: now });
                }
            }
            State::HalfOpen { .. } => {
                tracing::warn!("circuit breaker trial failed, reopening");
                transition(&mut inner, State::Open { since: now });
            }
            State::Open { .. } => inner.state = State::Open { since: now },
        }
    }

    /// Gives back a HalfOpen trial whose caller went away before the upstream
    /// answered. Records no outcome.
    pub fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if let State::HalfOpen {
            trial_in_flight: true,
        } = inner.state
        {
            inner.state = State::HalfOpen {
                trial_in_flight: false,
            };
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;
        inner.last_failure = None;
        if inner.state != State::Closed {
            tracing::info!("circuit breaker reset");
            transition(&mut inner, State::Closed);
        }
    }

    pub fn current_state(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state.kind(),
            failure_count: inner.failure_count,
            last_failure_time: inner
                .last_failure
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64()),
        }
    }
}

fn transition(inner: &mut Inner, to: State) {
    if inner.state.kind() != to.kind() {
        counter!(BREAKER_TRANSITIONS, "state" => to.kind().as_str()).increment(1);
        tracing::info!(
            from = inner.state.kind().as_str(),
            to = to.kind().as_str(),
            "circuit breaker transition"
        );
    }
    inner.state = to;
}
