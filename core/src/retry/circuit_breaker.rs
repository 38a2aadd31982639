//! Consecutive-failure circuit breaker
//!
//! One breaker is shared by every caller of the retry wrapper. Each retryable
//! failure bumps the counter; when it reaches the threshold (3 by default)
//! the circuit opens for the cool-down (30 s by default) and every call fails
//! fast. Any success, on any call path, resets the counter and closes the
//! circuit.
//!
//! State is two atomics (failure count plus a monotonic "open until"
//! timestamp), so the breaker can be shared across tasks and threads without
//! a lock.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;

/// Failures in a row before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// How long an open circuit rejects calls.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Threshold reached, cool-down running: calls fail fast
    Open,
    /// Cool-down elapsed with the threshold still reached: the next call is a probe
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Returned by [`CircuitBreaker::check`] while the circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit open after {failures} consecutive failures, resets in {}ms", retry_after.as_millis())]
pub struct CircuitOpen {
    pub failures: u32,
    pub retry_after: Duration,
}

pub struct CircuitBreaker {
    failures: AtomicU32,
    /// Microseconds since `epoch` when the circuit closes again (0 = not armed).
    open_until_us: AtomicU64,
    threshold: u32,
    cooldown: Duration,
    epoch: Instant,
}

static SHARED: OnceLock<Arc<CircuitBreaker>> = OnceLock::new();

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }

    pub fn with_params(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            open_until_us: AtomicU64::new(0),
            threshold: threshold.max(1),
            cooldown,
            epoch: Instant::now(),
        }
    }

    /// Process-wide breaker with default parameters.
    pub fn shared() -> Arc<CircuitBreaker> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(CircuitBreaker::new())))
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn state(&self) -> CircuitState {
        if !self.remaining_open().is_zero() {
            return CircuitState::Open;
        }
        if self.failure_count() >= self.threshold {
            return CircuitState::HalfOpen;
        }
        CircuitState::Closed
    }

    /// Time left until an open circuit lets calls through again.
    pub fn remaining_open(&self) -> Duration {
        let open_until = self.open_until_us.load(Ordering::Acquire);
        let now = self.now_us();
        if open_until == 0 || now >= open_until {
            return Duration::ZERO;
        }
        Duration::from_micros(open_until - now)
    }

    /// Gate a call. Clears an expired cool-down as a side effect.
    pub fn check(&self) -> Result<(), CircuitOpen> {
        let open_until = self.open_until_us.load(Ordering::Acquire);
        if open_until == 0 {
            return Ok(());
        }
        let now = self.now_us();
        if now < open_until {
            return Err(CircuitOpen {
                failures: self.failure_count(),
                retry_after: Duration::from_micros(open_until - now),
            });
        }
        // Another caller may have re-armed it in between; only clear our value.
        let _ = self.open_until_us.compare_exchange(
            open_until,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        Ok(())
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.open_until_us.store(0, Ordering::Release);
    }

    /// Count a retryable failure. Returns `true` when the circuit is now open.
    pub fn record_failure(&self) -> bool {
        let count = self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if count < self.threshold {
            return false;
        }
        let open_until = self
            .now_us()
            .saturating_add(micros(self.cooldown))
            .max(1);
        self.open_until_us.store(open_until, Ordering::Release);
        true
    }

    fn now_us(&self) -> u64 {
        micros(self.epoch.elapsed())
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failures", &self.failure_count())
            .field("threshold", &self.threshold)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
