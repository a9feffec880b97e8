//! Broker health report, the analogue of a framework health endpoint.

use serde::Serialize;

use super::shutdown::HealthState;

/// Overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Snapshot of the host's broker plumbing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub broker_open: bool,
    pub broker_uri: String,
    pub ready: bool,
    pub state: HealthState,
    pub in_flight: u64,
    /// Queues currently declared on the broker.
    pub queues: Vec<String>,
}

impl HealthReport {
    /// `UP` only while the broker is open, the barrier is open, and the host
    /// is serving.
    #[must_use]
    pub fn status_for(broker_open: bool, ready: bool, state: HealthState) -> HealthStatus {
        if broker_open && ready && state == HealthState::Ready {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        }
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn status_requires_open_ready_and_serving() {
        assert_eq!(
            HealthReport::status_for(true, true, HealthState::Ready),
            HealthStatus::Up
        );
        assert_eq!(
            HealthReport::status_for(false, true, HealthState::Ready),
            HealthStatus::Down
        );
        assert_eq!(
            HealthReport::status_for(true, false, HealthState::Starting),
            HealthStatus::Down
        );
        assert_eq!(
            HealthReport::status_for(true, true, HealthState::Draining),
            HealthStatus::Down
        );
    }

    #[test]
    fn serializes_to_camel_case_json() {
        let report = HealthReport {
            status: HealthStatus::Up,
            broker_open: true,
            broker_uri: "amqp://guest@localhost:5672/%2f".to_string(),
            ready: true,
            state: HealthState::Ready,
            in_flight: 0,
            queues: vec!["get-widget".to_string()],
        };
        assert!(report.is_up());
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "status": "UP",
                "brokerOpen": true,
                "brokerUri": "amqp://guest@localhost:5672/%2f",
                "ready": true,
                "state": "ready",
                "inFlight": 0,
                "queues": ["get-widget"]
            })
        );
    }
}
