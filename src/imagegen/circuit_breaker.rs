//! Per-provider circuit breaker.
//!
//! Each adapter owns one breaker. After `failure_threshold` consecutive
//! failures the circuit opens and every call is rejected with
//! [`ErrorKind::CircuitOpen`](super::interface::ErrorKind) until the cooldown
//! elapses; the first call after that runs as a single half-open probe whose
//! outcome closes or re-opens the circuit. Other calls arriving while the
//! probe is in flight are rejected as if the circuit were still open.

use super::interface::{ImageGenError, ProviderId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    30_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    next_attempt_at: Option<Instant>,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    provider: ProviderId,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, config: &CircuitBreakerConfig) -> Self {
        Self {
            provider,
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_millis(config.cooldown_ms),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                next_attempt_at: None,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        // State is plain data; a panic elsewhere cannot leave it half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Gate an outbound call. Moves an expired open circuit to half-open and
    /// lets the caller through as the only probe.
    pub fn check(&self) -> Result<(), ImageGenError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                Ok(())
            }
            CircuitState::HalfOpen => Err(self.open_error(1)),
            CircuitState::Open => {
                let now = Instant::now();
                let next_attempt_at = inner.next_attempt_at.unwrap_or(now);
                if now >= next_attempt_at {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(target: "imagegen", provider = %self.provider, "Circuit half-open, probing backend");
                    return Ok(());
                }

                let remaining = next_attempt_at - now;
                let secs = (remaining.as_millis() as u64).div_ceil(1000).max(1);
                Err(self.open_error(secs))
            }
        }
    }

    fn open_error(&self, secs: u64) -> ImageGenError {
        ImageGenError::circuit_open(
            format!(
                "{} is temporarily unavailable. Try again in {} seconds.",
                self.provider.label(),
                secs
            ),
            secs,
        )
    }

    /// Give up a half-open probe whose call was dropped before finishing, so
    /// the next caller can probe instead.
    pub fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(target: "imagegen", provider = %self.provider, "Circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.next_attempt_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.probe_in_flight = false;

        if inner.state == CircuitState::HalfOpen || inner.failures >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.next_attempt_at = Some(Instant::now() + self.cooldown);
            tracing::warn!(
                target: "imagegen",
                provider = %self.provider,
                failures = inner.failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Circuit opened"
            );
        }
    }
}
