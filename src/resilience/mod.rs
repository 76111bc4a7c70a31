//! The resilience envelope (§4.2): retry with exponential backoff composed
//! with a per-dependency circuit breaker. The breaker wraps the retry loop,
//! so a tripped breaker never consumes a retry attempt.

mod breaker;

use std::{
    future::Future,
    sync::Arc,
    time::Duration,
};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{
    warn,
    Instrument as _,
    Span,
};

pub use breaker::{
    CircuitBreaker,
    CircuitBreakerConfig,
    CircuitState,
    TripStrategy,
};

/// Names of the dependencies the envelope wraps (§4.2).
pub const POSTGRES: &str = "postgres";
pub const KAFKA_PRODUCER: &str = "kafka_producer";

/// Classifies an error as retryable (transient) or not. `NotFound` and
/// `AlreadyExists`-shaped errors must return `false` so they surface to the
/// caller on first occurrence and never count against the breaker.
pub trait Retriable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_wait: Duration,
    pub max_wait: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_wait: Duration::from_millis(50),
            max_wait: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// `min(initial_wait * multiplier^(attempt-1), max_wait)`, per §4.2.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_wait.as_secs_f64() * self.multiplier.powi(exponent) * 1000.0;
        Duration::from_millis(millis.round() as u64).min(self.max_wait)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError<E> {
    #[error("circuit open for dependency {0}")]
    CircuitOpen(&'static str),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Upstream(E),
}

/// Wraps calls to a single named external dependency with retry + circuit
/// breaker. One `Envelope` is constructed per dependency (`postgres`,
/// `kafka_producer`) at service startup.
pub struct Envelope {
    name: &'static str,
    retry: RetryConfig,
    breaker: Arc<Mutex<CircuitBreaker>>,
}

impl Envelope {
    pub fn new(name: &'static str, retry: RetryConfig, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            retry,
            breaker: Arc::new(Mutex::new(CircuitBreaker::new(breaker_config))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` unless the breaker is tripped OPEN for this dependency.
    /// Used by `/ready` (§10.5).
    pub async fn is_available(&self) -> bool {
        !matches!(self.breaker.lock().await.state(), CircuitState::Open)
    }

    pub async fn call<F, Fut, T, E>(&self, cancel: &CancellationToken, op: F) -> Result<T, EnvelopeError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retriable + std::fmt::Display + Clone,
    {
        if cancel.is_cancelled() {
            return Err(EnvelopeError::Cancelled);
        }

        {
            let mut breaker = self.breaker.lock().await;
            if !breaker.allow_request() {
                metrics::counter!(crate::metrics_init::RESILIENCE_CIRCUIT_OPEN_TOTAL, "dependency" => self.name).increment(1);
                return Err(EnvelopeError::CircuitOpen(self.name));
            }
        }

        let name = self.name;
        let retry = self.retry.clone();
        let span = Span::current();

        let retry_config = tryhard::RetryFutureConfig::new(retry.max_attempts).custom_backoff(
            move |attempt: u32, error: &E| {
                if !error.is_retryable() {
                    tryhard::RetryPolicy::Break
                } else {
                    tryhard::RetryPolicy::Delay(retry.delay_for_attempt(attempt))
                }
            },
        ).on_retry(move |attempt: u32, next_delay: Option<Duration>, error: &E| {
            metrics::counter!(crate::metrics_init::RESILIENCE_RETRY_TOTAL, "dependency" => name).increment(1);
            let wait_duration = next_delay.map(humantime::format_duration).map(tracing::field::display);
            warn!(parent: &span, attempt, wait_duration, %error, dependency = name, "retrying after dependency failure");
            futures::future::ready(())
        });

        let attempt = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(EnvelopeError::Cancelled),
            result = tryhard::retry_fn(|| op()).with_config(retry_config).in_current_span() => result,
        };

        let mut breaker = self.breaker.lock().await;
        let result = match attempt {
            Ok(value) => {
                breaker.record_success();
                Ok(value)
            }
            Err(error) => {
                if error.is_retryable() {
                    breaker.record_failure();
                }
                Err(EnvelopeError::Upstream(error))
            }
        };

        let state_value = match breaker.state() {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        };
        metrics::gauge!(crate::metrics_init::CIRCUIT_BREAKER_STATE, "dependency" => self.name).set(state_value);

        result
    }
}
