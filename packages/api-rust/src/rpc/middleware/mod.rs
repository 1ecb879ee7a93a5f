//! Tower middleware layers for the conductor call pipeline.
//!
//! - [`admission`]: Bounded concurrency, shedding calls beyond the limit
//! - [`deadline`]: Caller timeout less a reply margin
//! - [`metrics`]: Call timing and counting via `tracing` spans and `metrics`
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod admission;
pub mod deadline;
pub mod metrics;
pub mod pipeline;

pub use admission::AdmissionLayer;
pub use deadline::DeadlineLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_rpc_pipeline, RpcPipeline};
