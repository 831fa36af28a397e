use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::interface::{ImageGenError, ProviderId};
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;

/// Races one backend call against a fixed deadline. The losing future is
/// dropped, which abandons the in-flight request.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    deadline: Duration,
}

impl TimeoutGuard {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn run<T, F>(&self, provider: ProviderId, call: F) -> Result<T, ImageGenError>
    where
        F: Future<Output = Result<T, ImageGenError>>,
    {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    target: "imagegen",
                    provider = %provider,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Backend call timed out"
                );
                Err(ImageGenError::timeout(format!(
                    "{} image generation timed out.",
                    provider.label()
                )))
            }
        }
    }
}

impl Default for TimeoutGuard {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))
    }
}

/// Circuit breaker + timeout guard pair injected into each adapter.
pub struct ProviderGuard {
    provider: ProviderId,
    breaker: CircuitBreaker,
    timeout: TimeoutGuard,
}

impl ProviderGuard {
    pub fn new(provider: ProviderId, breaker_config: &CircuitBreakerConfig, timeout: TimeoutGuard) -> Self {
        Self {
            provider,
            breaker: CircuitBreaker::new(provider, breaker_config),
            timeout,
        }
    }

    pub fn with_defaults(provider: ProviderId) -> Self {
        Self::new(provider, &CircuitBreakerConfig::default(), TimeoutGuard::default())
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Breaker check, then the timed call, then the outcome is fed back into
    /// the breaker. A rejected call never reaches `call` and records nothing.
    pub async fn run<T, F>(&self, call: F) -> Result<T, ImageGenError>
    where
        F: Future<Output = Result<T, ImageGenError>>,
    {
        self.breaker.check()?;

        let mut pending = PendingCall {
            breaker: &self.breaker,
            settled: false,
        };
        let outcome = self.timeout.run(self.provider, call).await;
        pending.settled = true;

        match outcome {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }
}

/// Frees the half-open probe slot when a guarded call is dropped mid-flight.
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_probe();
        }
    }
}
