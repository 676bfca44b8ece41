//! Circuit breaker state machine.
//!
//! Transitions: closed → open (failure threshold), open → half-open
//! (cooldown elapsed), half-open → closed (success threshold) and
//! half-open → open (any trial failure).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// The current state of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitBreakerState {
    /// Calls go through; consecutive failures are counted
    Closed,
    /// Calls are short-circuited until the cooldown elapses
    Open,
    /// A limited number of trial calls go through
    HalfOpen,
}

impl CircuitBreakerState {
    /// Numeric value for the Prometheus state gauge
    pub fn to_metric_value(&self) -> f64 {
        match self {
            CircuitBreakerState::Closed => 0.0,
            CircuitBreakerState::Open => 1.0,
            CircuitBreakerState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerState::Closed => write!(f, "closed"),
            CircuitBreakerState::Open => write!(f, "open"),
            CircuitBreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// A recorded state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: CircuitBreakerState,
    pub to: CircuitBreakerState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Mutable breaker state, guarded by one lock
#[derive(Debug, Clone)]
pub struct StateData {
    pub state: CircuitBreakerState,
    pub consecutive_failures: u32,
    /// Successes since entering half-open
    pub consecutive_successes: u32,
    /// Trial calls currently in flight while half-open
    pub half_open_in_flight: u32,
    pub last_state_change: DateTime<Utc>,
    /// Monotonic instant the circuit last opened
    pub opened_at: Option<Instant>,
    pub transition_count: u64,
}

impl StateData {
    pub fn new() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            half_open_in_flight: 0,
            last_state_change: Utc::now(),
            opened_at: None,
            transition_count: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
    }

    /// Move to `new_state`, resetting the counters that state starts from
    pub fn transition_to(&mut self, new_state: CircuitBreakerState) -> StateTransition {
        let transition = StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
            reason: self.transition_reason(new_state),
        };

        self.state = new_state;
        self.last_state_change = transition.timestamp;
        self.transition_count += 1;
        self.half_open_in_flight = 0;

        match new_state {
            CircuitBreakerState::Open => {
                self.opened_at = Some(Instant::now());
                self.consecutive_successes = 0;
            }
            CircuitBreakerState::HalfOpen => {
                self.consecutive_successes = 0;
            }
            CircuitBreakerState::Closed => {
                self.opened_at = None;
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
            }
        }

        transition
    }

    fn transition_reason(&self, new_state: CircuitBreakerState) -> String {
        match (self.state, new_state) {
            (CircuitBreakerState::Closed, CircuitBreakerState::Open) => {
                format!("{} consecutive search failures", self.consecutive_failures)
            }
            (CircuitBreakerState::Open, CircuitBreakerState::HalfOpen) => {
                "cooldown elapsed, allowing a trial search".to_string()
            }
            (CircuitBreakerState::HalfOpen, CircuitBreakerState::Closed) => {
                "trial search succeeded".to_string()
            }
            (CircuitBreakerState::HalfOpen, CircuitBreakerState::Open) => {
                "trial search failed".to_string()
            }
            (from, to) => format!("forced from {} to {}", from, to),
        }
    }

    /// Time left before an open circuit may go half-open
    pub fn remaining_cooldown(&self, cooldown: Duration) -> Duration {
        match (self.state, self.opened_at) {
            (CircuitBreakerState::Open, Some(opened_at)) => {
                cooldown.saturating_sub(opened_at.elapsed())
            }
            _ => Duration::ZERO,
        }
    }

    /// True when open and the cooldown has elapsed
    pub fn should_attempt_reset(&self, cooldown: Duration) -> bool {
        self.state == CircuitBreakerState::Open
            && self
                .opened_at
                .is_some_and(|opened_at| opened_at.elapsed() >= cooldown)
    }
}

impl Default for StateData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_state_metric_values() {
        assert_eq!(CircuitBreakerState::Closed.to_metric_value(), 0.0);
        assert_eq!(CircuitBreakerState::Open.to_metric_value(), 1.0);
        assert_eq!(CircuitBreakerState::HalfOpen.to_metric_value(), 2.0);
        assert_eq!(CircuitBreakerState::HalfOpen.to_string(), "half-open");
    }

    #[test]
    fn test_counters() {
        let mut data = StateData::new();
        data.record_failure();
        data.record_failure();
        assert_eq!(data.consecutive_failures, 2);

        data.record_success();
        assert_eq!(data.consecutive_failures, 0);
        assert_eq!(data.consecutive_successes, 1);
    }

    #[test]
    fn test_open_transition_records_reason() {
        let mut data = StateData::new();
        for _ in 0..5 {
            data.record_failure();
        }
        let transition = data.transition_to(CircuitBreakerState::Open);
        assert_eq!(transition.from, CircuitBreakerState::Closed);
        assert_eq!(transition.reason, "5 consecutive search failures");
        assert!(data.opened_at.is_some());
        assert_eq!(data.transition_count, 1);
    }

    #[test]
    fn test_cooldown() {
        let mut data = StateData::new();
        data.transition_to(CircuitBreakerState::Open);

        let cooldown = Duration::from_millis(100);
        assert!(!data.should_attempt_reset(cooldown));
        assert!(data.remaining_cooldown(cooldown) > Duration::ZERO);

        sleep(Duration::from_millis(150));
        assert!(data.should_attempt_reset(cooldown));
        assert_eq!(data.remaining_cooldown(cooldown), Duration::ZERO);
    }

    #[test]
    fn test_close_clears_counters() {
        let mut data = StateData::new();
        data.record_failure();
        data.transition_to(CircuitBreakerState::Open);
        data.transition_to(CircuitBreakerState::HalfOpen);
        data.half_open_in_flight = 1;

        data.transition_to(CircuitBreakerState::Closed);
        assert_eq!(data.consecutive_failures, 0);
        assert_eq!(data.half_open_in_flight, 0);
        assert!(data.opened_at.is_none());
    }
}
