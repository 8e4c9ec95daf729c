//! Per-provider circuit breaker.
//!
//! Closed counts consecutive failures up to a threshold, open short-circuits
//! until the timeout elapses, half-open admits a bounded number of probes
//! and lets the first terminal outcome decide.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use {finmux_config::CircuitBreakerSettings, tracing::debug};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Returned when the breaker refuses a call. The dispatcher treats this as
/// "skip this provider", never as a terminal error for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker open")]
pub struct CircuitOpen;

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_state_change: Option<Instant>,
    half_open_inflight: u32,
}

pub struct CircuitBreaker {
    inner: Mutex<BreakerState>,
    settings: CircuitBreakerSettings,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self {
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_state_change: None,
                half_open_inflight: 0,
            }),
            settings,
        }
    }

    /// Ask permission for one call. The lock is released before the call
    /// itself runs; report the outcome with [`on_success`]/[`on_failure`].
    ///
    /// [`on_success`]: CircuitBreaker::on_success
    /// [`on_failure`]: CircuitBreaker::on_failure
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> Result<(), CircuitOpen> {
        if !self.settings.enabled {
            return Ok(());
        }
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed_enough = inner.last_failure.is_some_and(|at| {
                    now.duration_since(at) >= Duration::from_millis(self.settings.timeout_ms)
                });
                if elapsed_enough {
                    debug!("circuit breaker half-open, permitting trial call");
                    inner.state = CircuitState::HalfOpen;
                    inner.last_state_change = Some(now);
                    inner.half_open_inflight = 1;
                    Ok(())
                } else {
                    Err(CircuitOpen)
                }
            },
            CircuitState::HalfOpen => {
                if inner.half_open_inflight < self.settings.half_open_max_attempts {
                    inner.half_open_inflight += 1;
                    Ok(())
                } else {
                    Err(CircuitOpen)
                }
            },
        }
    }

    pub fn on_success(&self) {
        self.on_success_at(Instant::now());
    }

    pub fn on_success_at(&self, now: Instant) {
        if !self.settings.enabled {
            return;
        }
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            debug!("circuit breaker closing after successful call");
            inner.state = CircuitState::Closed;
            inner.last_state_change = Some(now);
        }
        inner.failure_count = 0;
        inner.half_open_inflight = 0;
    }

    pub fn on_failure(&self) {
        self.on_failure_at(Instant::now());
    }

    pub fn on_failure_at(&self, now: Instant) {
        if !self.settings.enabled {
            return;
        }
        let mut inner = self.lock();
        inner.last_failure = Some(now);
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.settings.failure_threshold {
                    debug!(failures = inner.failure_count, "circuit breaker opening");
                    inner.state = CircuitState::Open;
                    inner.last_state_change = Some(now);
                }
            },
            CircuitState::HalfOpen => {
                debug!("circuit breaker re-opening after failed trial");
                inner.state = CircuitState::Open;
                inner.last_state_change = Some(now);
                inner.half_open_inflight = 0;
            },
            CircuitState::Open => {},
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    #[must_use]
    pub fn last_state_change(&self) -> Option<Instant> {
        self.lock().last_state_change
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
