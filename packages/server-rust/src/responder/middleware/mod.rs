//! Tower middleware layers for the responder pipeline.
//!
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`timeout`]: Per-request handler timeout
//! - [`metrics`]: Handler timing and outcome via `tracing` spans
//! - [`pipeline`]: Composes all layers around the router

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_responder_pipeline, ResponderPipeline};
pub use timeout::TimeoutLayer;
