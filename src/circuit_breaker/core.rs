//! Core circuit breaker implementation.

use crate::circuit_breaker::metrics::CIRCUIT_BREAKER_METRICS;
use crate::circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerResult, CircuitBreakerState,
    StateData, StateTransition,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A thread-safe circuit breaker.
///
/// Callers either wrap an operation with [`call`](Self::call), or take a
/// [`CallPermit`] with [`permit`](Self::permit) and resolve it once the
/// protected call has an outcome. An unresolved permit is released as a
/// neutral outcome when dropped, so a cancelled caller never keeps a
/// half-open trial slot.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<StateData>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(name = %name, config = ?config, "Creating circuit breaker");
        CIRCUIT_BREAKER_METRICS
            .state
            .with_label_values(&[&name])
            .set(CircuitBreakerState::Closed.to_metric_value());

        Self {
            name,
            config,
            state: Arc::new(Mutex::new(StateData::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, moving open → half-open first if the cooldown elapsed
    pub fn state(&self) -> CircuitBreakerState {
        let mut state = self.state.lock();
        self.maybe_half_open(&mut state);
        state.state
    }

    fn maybe_half_open(&self, state: &mut StateData) {
        if state.should_attempt_reset(self.config.cooldown) {
            let transition = state.transition_to(CircuitBreakerState::HalfOpen);
            self.log_transition(&transition);
        }
    }

    /// Ask permission for one protected call
    pub fn try_acquire(&self) -> CircuitBreakerResult<()> {
        let mut state = self.state.lock();
        self.maybe_half_open(&mut state);

        let allowed = match state.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => false,
            CircuitBreakerState::HalfOpen => {
                if state.half_open_in_flight < self.config.half_open_max_requests {
                    state.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        };

        if allowed {
            CIRCUIT_BREAKER_METRICS
                .calls_total
                .with_label_values(&[&self.name, "allowed"])
                .inc();
            Ok(())
        } else {
            CIRCUIT_BREAKER_METRICS
                .calls_total
                .with_label_values(&[&self.name, "rejected"])
                .inc();
            debug!(name = %self.name, state = %state.state, "Call short-circuited");
            Err(CircuitBreakerError::Open {
                name: self.name.clone(),
                retry_after: state.remaining_cooldown(self.config.cooldown),
            })
        }
    }

    /// Ask permission for one protected call, released on drop
    pub fn permit(&self) -> CircuitBreakerResult<CallPermit<'_>> {
        self.try_acquire()?;
        Ok(CallPermit {
            breaker: self,
            resolved: false,
        })
    }

    /// The protected call succeeded
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.record_success();
        CIRCUIT_BREAKER_METRICS
            .calls_total
            .with_label_values(&[&self.name, "success"])
            .inc();

        if state.state == CircuitBreakerState::HalfOpen {
            state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
            if state.consecutive_successes >= self.config.success_threshold {
                let transition = state.transition_to(CircuitBreakerState::Closed);
                self.log_transition(&transition);
            }
        }
    }

    /// The protected call failed
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.record_failure();
        CIRCUIT_BREAKER_METRICS
            .calls_total
            .with_label_values(&[&self.name, "failure"])
            .inc();

        warn!(
            name = %self.name,
            state = %state.state,
            consecutive_failures = state.consecutive_failures,
            "Protected call failed"
        );

        match state.state {
            CircuitBreakerState::Closed
                if state.consecutive_failures >= self.config.failure_threshold =>
            {
                let transition = state.transition_to(CircuitBreakerState::Open);
                self.log_transition(&transition);
            }
            CircuitBreakerState::HalfOpen => {
                let transition = state.transition_to(CircuitBreakerState::Open);
                self.log_transition(&transition);
            }
            _ => {}
        }
    }

    /// The call ended without saying anything about the protected
    /// dependency (for example rejected input); frees a half-open trial slot
    pub fn record_neutral(&self) {
        let mut state = self.state.lock();
        if state.state == CircuitBreakerState::HalfOpen {
            state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Run `f` under the breaker
    pub async fn call<F, Fut, T, E>(&self, f: F) -> CircuitBreakerResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let permit = self.permit()?;
        match f().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(err) => {
                permit.failure();
                Err(CircuitBreakerError::OperationFailed(err.to_string()))
            }
        }
    }

    fn log_transition(&self, transition: &StateTransition) {
        info!(
            name = %self.name,
            from = %transition.from,
            to = %transition.to,
            reason = %transition.reason,
            "Circuit breaker state transition"
        );

        CIRCUIT_BREAKER_METRICS
            .state
            .with_label_values(&[&self.name])
            .set(transition.to.to_metric_value());
        CIRCUIT_BREAKER_METRICS
            .state_transitions
            .with_label_values(&[
                &self.name,
                &transition.from.to_string(),
                &transition.to.to_string(),
            ])
            .inc();
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let mut state = self.state.lock();
        self.maybe_half_open(&mut state);
        CircuitBreakerStats {
            name: self.name.clone(),
            state: state.state,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            transition_count: state.transition_count,
            last_state_change: state.last_state_change,
            retry_after_ms: state.remaining_cooldown(self.config.cooldown).as_millis() as u64,
        }
    }

    /// Close the circuit and clear counters
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.state != CircuitBreakerState::Closed {
            let transition = state.transition_to(CircuitBreakerState::Closed);
            self.log_transition(&transition);
        }
        state.consecutive_failures = 0;
    }

    pub fn force_open(&self) {
        let mut state = self.state.lock();
        if state.state != CircuitBreakerState::Open {
            let transition = state.transition_to(CircuitBreakerState::Open);
            self.log_transition(&transition);
        }
    }
}

/// One admitted call. Resolve it with [`success`](Self::success),
/// [`failure`](Self::failure) or [`neutral`](Self::neutral); dropping it
/// unresolved counts as neutral.
#[must_use = "an unresolved permit is released as a neutral outcome"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    resolved: bool,
}

impl CallPermit<'_> {
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record_failure();
    }

    pub fn neutral(mut self) {
        self.resolved = true;
        self.breaker.record_neutral();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            debug!(name = %self.breaker.name, "Protected call abandoned");
            self.breaker.record_neutral();
        }
    }
}

/// Point-in-time breaker diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitBreakerState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub transition_count: u64,
    pub last_state_change: chrono::DateTime<chrono::Utc>,
    /// Milliseconds until an open circuit lets a trial through
    pub retry_after_ms: u64,
}
