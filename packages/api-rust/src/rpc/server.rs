//! Manager side of the conductor RPC protocol.
//!
//! [`RpcEndpoint`] turns request bytes into reply bytes: it decodes the
//! `RpcRequest`, runs it through the middleware pipeline down to a
//! [`ManagerDispatcher`], and encodes the `RpcReply`. Every request gets a
//! reply; refusals travel as `RpcOutcome::Rejected`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use conductor_core::messages::{decode, encode};
use conductor_core::{
    ConductorError, ConductorManager, RpcRejection, RpcReply, RpcRequest, RpcVersion,
    TransportError, RPC_API_VERSION,
};
use tower::{Service, ServiceExt};
use tracing::warn;

use super::middleware::{build_rpc_pipeline, RpcPipeline};
use crate::config::ConductorConfig;
use crate::transport::InMemoryBus;

// ---------------------------------------------------------------------------
// ManagerDispatcher
// ---------------------------------------------------------------------------

/// Innermost pipeline service: checks the version and invokes the manager.
///
/// Domain errors become `Failure` replies with a `<node_id>:<method>` frame
/// appended to their stack.
pub struct ManagerDispatcher<M: ?Sized> {
    manager: Arc<M>,
    node_id: Arc<str>,
    supported: RpcVersion,
}

impl<M: ?Sized> ManagerDispatcher<M> {
    #[must_use]
    pub fn new(manager: Arc<M>, node_id: &str) -> Self {
        Self {
            manager,
            node_id: Arc::from(node_id),
            supported: RPC_API_VERSION,
        }
    }

    /// Serve only requests this version can handle.
    #[must_use]
    pub fn with_version(mut self, supported: RpcVersion) -> Self {
        self.supported = supported;
        self
    }
}

impl<M: ?Sized> Clone for ManagerDispatcher<M> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            node_id: Arc::clone(&self.node_id),
            supported: self.supported,
        }
    }
}

impl<M> Service<RpcRequest> for ManagerDispatcher<M>
where
    M: ConductorManager + ?Sized + 'static,
{
    type Response = RpcReply;
    type Error = RpcRejection;
    type Future = Pin<Box<dyn Future<Output = Result<RpcReply, RpcRejection>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RpcRequest) -> Self::Future {
        let manager = Arc::clone(&self.manager);
        let node_id = Arc::clone(&self.node_id);
        let supported = self.supported;

        Box::pin(async move {
            if !supported.can_serve(request.version) {
                return Err(RpcRejection::UnsupportedVersion {
                    requested: request.version,
                    supported,
                });
            }

            let RpcRequest {
                msg_id,
                context,
                call,
                ..
            } = request;
            let frame = format!("{node_id}:{}", call.method());

            match call.dispatch(manager.as_ref(), &context).await {
                Ok(bytes) => Ok(RpcReply::success(msg_id, bytes)),
                Err(ConductorError::Domain(err)) => {
                    Ok(RpcReply::failure(msg_id, err.with_frame(frame).into_wrapped()))
                }
                Err(ConductorError::Wrapped(mut wrapped)) => {
                    wrapped.original_stack.push(frame);
                    Ok(RpcReply::failure(msg_id, wrapped))
                }
                Err(ConductorError::Transport(TransportError::Rejected(rejection))) => {
                    Err(rejection)
                }
                Err(ConductorError::Transport(err)) => Err(RpcRejection::Internal {
                    detail: err.to_string(),
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// RpcEndpoint
// ---------------------------------------------------------------------------

/// Byte-level conductor endpoint, registrable on a bus topic.
#[derive(Clone)]
pub struct RpcEndpoint {
    pipeline: RpcPipeline,
}

impl RpcEndpoint {
    /// Serve `manager` behind the standard pipeline.
    #[must_use]
    pub fn new<M>(manager: Arc<M>, config: &ConductorConfig) -> Self
    where
        M: ConductorManager + ?Sized + 'static,
    {
        Self::with_handler(ManagerDispatcher::new(manager, &config.node_id), config)
    }

    /// Serve an arbitrary innermost handler behind the standard pipeline.
    #[must_use]
    pub fn with_handler<S>(handler: S, config: &ConductorConfig) -> Self
    where
        S: Service<RpcRequest, Response = RpcReply, Error = RpcRejection>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            pipeline: build_rpc_pipeline(handler, config),
        }
    }

    /// Decode, run and reply. Never fails at the RPC level.
    async fn handle(pipeline: RpcPipeline, bytes: Vec<u8>) -> RpcReply {
        let request: RpcRequest = match decode(&bytes) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "dropping undecodable conductor request");
                return RpcReply::rejected(
                    String::new(),
                    RpcRejection::Malformed {
                        detail: err.to_string(),
                    },
                );
            }
        };

        let msg_id = request.msg_id.clone();
        let method = request.call.method();
        match pipeline.oneshot(request).await {
            Ok(reply) => reply,
            Err(rejection) => {
                warn!(msg_id = %msg_id, method, reason = %rejection, "rejected conductor call");
                RpcReply::rejected(msg_id, rejection)
            }
        }
    }
}

impl Service<Vec<u8>> for RpcEndpoint {
    type Response = Vec<u8>;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<Vec<u8>, TransportError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, bytes: Vec<u8>) -> Self::Future {
        let pipeline = self.pipeline.clone();
        Box::pin(async move { encode(&Self::handle(pipeline, bytes).await) })
    }
}

/// Serve `manager` on `config.topic` of `bus`.
pub fn serve_on_bus<M>(bus: &InMemoryBus, manager: Arc<M>, config: &ConductorConfig)
where
    M: ConductorManager + ?Sized + 'static,
{
    bus.register(config.topic.clone(), RpcEndpoint::new(manager, config));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
