//! Broker connection configuration.

/// Connection settings for the message broker.
///
/// The in-memory broker only reads `queue_capacity`; the remaining fields
/// describe the remote broker a deployment points at and are reported by the
/// health check.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker host name.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Virtual host the queues live in.
    pub virtual_host: String,
    /// User the service authenticates as.
    pub username: String,
    /// Bounded channel capacity per queue. A full queue applies backpressure
    /// to senders until a consumer drains it.
    pub queue_capacity: usize,
}

impl BrokerConfig {
    /// Renders the AMQP-style URI (without credentials beyond the user name).
    #[must_use]
    pub fn uri(&self) -> String {
        let vhost = if self.virtual_host == "/" {
            "%2f"
        } else {
            self.virtual_host.trim_start_matches('/')
        };
        format!("amqp://{}@{}:{}/{}", self.username, self.host, self.port, vhost)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            virtual_host: "/".to_string(),
            username: "guest".to_string(),
            queue_capacity: 256,
        }
    }
}
