//! queuecall server: broker plumbing, request client, responders, and the
//! readiness barrier that orders them.

pub mod broker;
pub mod client;
pub mod host;
pub mod readiness;
pub mod responder;
pub mod telemetry;

pub use broker::{Broker, BrokerConfig, BrokerError, InMemoryBroker, QueueOptions, ReplyOutcome};
pub use client::{CallError, ClientConfig, RequestClient};
pub use host::{HealthReport, HostConfig, ManagedService, ServiceHost};
pub use readiness::{ReadinessBarrier, ReadinessPolicy};
pub use responder::{handler_fn, DomainHandler, Responder, ResponderConfig};
