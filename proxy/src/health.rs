use crate::circuit_breaker::{BreakerState, CircuitBreaker};
use hyper::StatusCode;
use serde_json::json;
use shared::admin_service::{HealthReport, HealthSource};
use std::sync::Arc;

/// Liveness and readiness derived from the upstream circuit breaker.
///
/// Readiness stays 200 while the upstream is failing and only reports the
/// degradation in the body: an upstream outage affects every instance alike,
/// so pulling instances out of rotation would not help.
pub struct HealthReporter {
    breaker: Arc<CircuitBreaker>,
}

impl HealthReporter {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        HealthReporter { breaker }
    }
}

impl HealthSource for HealthReporter {
    fn liveness(&self) -> HealthReport {
        HealthReport {
            status_code: StatusCode::OK,
            body: json!({"status": "alive"}),
        }
    }

    fn readiness(&self) -> HealthReport {
        let snapshot = self.breaker.current_state();
        let status = match snapshot.state {
            BreakerState::Closed => "healthy",
            BreakerState::Open | BreakerState::HalfOpen => "degraded",
        };

        HealthReport {
            status_code: StatusCode::OK,
            body: json!({
                "status": status,
                "circuit_breaker": snapshot,
            }),
        }
    }
}
