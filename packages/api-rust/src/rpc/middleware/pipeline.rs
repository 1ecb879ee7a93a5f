//! Pipeline composition: combines all middleware layers into a single service stack.

use conductor_core::{RpcRejection, RpcReply, RpcRequest};
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder};

use super::admission::AdmissionLayer;
use super::deadline::DeadlineLayer;
use super::metrics::MetricsLayer;
use crate::config::ConductorConfig;

/// Type-erased conductor call pipeline.
pub type RpcPipeline = BoxCloneSyncService<RpcRequest, RpcReply, RpcRejection>;

/// Build the call pipeline by wrapping `handler` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `AdmissionLayer` -- shed calls beyond `max_concurrent_calls` before doing any work
/// 2. `DeadlineLayer` -- give up ahead of the caller's timeout
/// 3. `MetricsLayer` -- record timing and outcome (closest to the actual handler)
pub fn build_rpc_pipeline<S>(handler: S, config: &ConductorConfig) -> RpcPipeline
where
    S: Service<RpcRequest, Response = RpcReply, Error = RpcRejection>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    let stack = ServiceBuilder::new()
        .layer(AdmissionLayer::new(config.max_concurrent_calls))
        .layer(DeadlineLayer::default())
        .layer(MetricsLayer)
        .service(handler);
    BoxCloneSyncService::new(stack)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
