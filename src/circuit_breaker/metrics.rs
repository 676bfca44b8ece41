//! Prometheus metrics for circuit breakers.

use lazy_static::lazy_static;
use prometheus::{CounterVec, GaugeVec, Opts, Registry};

const NAMESPACE: &str = "kiosk_search";

/// Circuit breaker collectors
pub struct CircuitBreakerMetrics {
    /// Current state (0=closed, 1=open, 2=half-open)
    pub state: GaugeVec,

    /// Calls by outcome: allowed, rejected, success, failure
    pub calls_total: CounterVec,

    /// State transitions
    pub state_transitions: CounterVec,
}

impl CircuitBreakerMetrics {
    fn new() -> Self {
        Self {
            state: GaugeVec::new(
                Opts::new("circuit_breaker_state", "Current state of circuit breakers")
                    .namespace(NAMESPACE),
                &["name"],
            )
            .expect("Failed to create circuit_breaker_state metric"),

            calls_total: CounterVec::new(
                Opts::new(
                    "circuit_breaker_calls_total",
                    "Calls through circuit breakers by outcome",
                )
                .namespace(NAMESPACE),
                &["name", "outcome"],
            )
            .expect("Failed to create circuit_breaker_calls_total metric"),

            state_transitions: CounterVec::new(
                Opts::new(
                    "circuit_breaker_state_transitions_total",
                    "Total number of state transitions",
                )
                .namespace(NAMESPACE),
                &["name", "from_state", "to_state"],
            )
            .expect("Failed to create circuit_breaker_state_transitions_total metric"),
        }
    }
}

lazy_static! {
    pub static ref CIRCUIT_BREAKER_METRICS: CircuitBreakerMetrics = CircuitBreakerMetrics::new();
}

/// Register circuit breaker collectors with `registry`
pub fn init_circuit_breaker_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(CIRCUIT_BREAKER_METRICS.state.clone()))?;
    registry.register(Box::new(CIRCUIT_BREAKER_METRICS.calls_total.clone()))?;
    registry.register(Box::new(CIRCUIT_BREAKER_METRICS.state_transitions.clone()))?;

    tracing::info!("Circuit breaker metrics initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_call() {
        CIRCUIT_BREAKER_METRICS
            .calls_total
            .with_label_values(&["metrics-test", "rejected"])
            .inc();

        let value = CIRCUIT_BREAKER_METRICS
            .calls_total
            .with_label_values(&["metrics-test", "rejected"])
            .get();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_register_into_fresh_registry() {
        let registry = Registry::new();
        assert!(init_circuit_breaker_metrics(&registry).is_ok());
        assert!(init_circuit_breaker_metrics(&registry).is_err());
    }
}
