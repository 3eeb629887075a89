//! Tower middleware layers for the store call pipeline.
//!
//! - [`throttle`]: Semaphore-based cap on calls in flight
//! - [`timeout`]: Per-call timeout enforcement
//! - [`metrics`]: Call timing and counting via `tracing` spans and `metrics`
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod metrics;
pub mod pipeline;
pub mod throttle;
pub mod timeout;

pub use metrics::MetricsLayer;
pub use pipeline::{build_call_pipeline, CallPipeline};
pub use throttle::ThrottleLayer;
pub use timeout::TimeoutLayer;
