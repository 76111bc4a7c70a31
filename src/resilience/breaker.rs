//! Three-state circuit breaker (§4.2), with two trip strategies: a sliding
//! request/failure ratio (used for `postgres`) and a consecutive-failure
//! count (used for `kafka_producer`). Adapted from the single-threshold
//! design in `other_examples/9c46f67a_camilohaze-vela__...resilience.rs` to
//! support both.

use std::time::{
    Duration,
    Instant,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub enum TripStrategy {
    /// CLOSED -> OPEN when, over a sliding `interval`, `requests >=
    /// min_requests && failures/requests >= failure_ratio`.
    Ratio {
        interval: Duration,
        min_requests: u32,
        failure_ratio: f64,
    },
    /// CLOSED -> OPEN when `consecutive_failures > threshold`.
    ConsecutiveFailures { threshold: u32 },
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive successes required in HALF_OPEN before returning to
    /// CLOSED.
    pub max_requests: u32,
    pub timeout: Duration,
    pub trip: TripStrategy,
}

impl CircuitBreakerConfig {
    pub fn postgres_default() -> Self {
        Self {
            max_requests: 3,
            timeout: Duration::from_secs(30),
            trip: TripStrategy::Ratio {
                interval: Duration::from_secs(60),
                min_requests: 10,
                failure_ratio: 0.5,
            },
        }
    }

    pub fn kafka_producer_default() -> Self {
        Self {
            max_requests: 3,
            timeout: Duration::from_secs(30),
            trip: TripStrategy::ConsecutiveFailures { threshold: 5 },
        }
    }
}

/// Sliding window of request outcomes, reset whenever it has been open for
/// longer than `interval`. Kept deliberately simple (two counters reset on a
/// timer) rather than a ring buffer of timestamps: this spec only requires
/// "over a sliding interval", not sub-interval precision.
#[derive(Debug)]
struct Window {
    started_at: Instant,
    requests: u32,
    failures: u32,
}

impl Window {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests: 0,
            failures: 0,
        }
    }

    fn roll_if_expired(&mut self, interval: Duration) {
        if self.started_at.elapsed() >= interval {
            *self = Self::new();
        }
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    opened_at: Option<Instant>,
    consecutive_failures: u32,
    half_open_successes: u32,
    window: Window,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            opened_at: None,
            consecutive_failures: 0,
            half_open_successes: 0,
            window: Window::new(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Call before invoking the wrapped dependency. Transitions OPEN ->
    /// HALF_OPEN once `timeout` has elapsed.
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed_since_open = self
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed_since_open >= self.config.timeout {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.config.max_requests {
                    self.close();
                }
            }
            CircuitState::Closed => {
                if let TripStrategy::Ratio { interval, .. } = self.config.trip {
                    self.window.roll_if_expired(interval);
                }
                self.window.requests += 1;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        match self.state {
            CircuitState::HalfOpen => self.open(),
            CircuitState::Closed => {
                match self.config.trip.clone() {
                    TripStrategy::Ratio {
                        interval,
                        min_requests,
                        failure_ratio,
                    } => {
                        self.window.roll_if_expired(interval);
                        self.window.requests += 1;
                        self.window.failures += 1;
                        let ratio = f64::from(self.window.failures) / f64::from(self.window.requests);
                        if self.window.requests >= min_requests && ratio >= failure_ratio {
                            self.open();
                        }
                    }
                    TripStrategy::ConsecutiveFailures { threshold } => {
                        if self.consecutive_failures > threshold {
                            self.open();
                        }
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.consecutive_failures = 0;
        self.window = Window::new();
    }
}
