//! Server-side deadline for conductor calls.
//!
//! A caller stops waiting `timeout_ms` after it sends a request. The endpoint
//! gives up a little earlier, keeping a reply margin, so that its
//! `DeadlineExceeded` rejection is never racing the caller's own timer. Calls
//! that arrive with no budget left are refused without reaching the manager.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use conductor_core::{RpcRejection, RpcReply, RpcRequest};
use tower::{Layer, Service};
use tracing::debug;

/// Largest slice of a call's timeout kept back for the reply.
pub const DEFAULT_REPLY_MARGIN: Duration = Duration::from_millis(5);

/// Time the endpoint may spend on a call the caller waits `timeout_ms` for.
///
/// The margin is capped at a tenth of the timeout, so short timeouts keep
/// most of their budget. `None` when there is nothing left to spend.
#[must_use]
pub fn server_budget(timeout_ms: u64, reply_margin: Duration) -> Option<Duration> {
    let cap = u64::try_from(reply_margin.as_millis()).unwrap_or(u64::MAX);
    let budget_ms = timeout_ms - cap.min(timeout_ms / 10);
    (budget_ms > 0).then_some(Duration::from_millis(budget_ms))
}

/// Tower layer bounding each call by its caller's `timeout_ms`, less a
/// reply margin.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineLayer {
    reply_margin: Duration,
}

impl DeadlineLayer {
    #[must_use]
    pub fn new(reply_margin: Duration) -> Self {
        Self { reply_margin }
    }
}

impl Default for DeadlineLayer {
    fn default() -> Self {
        Self::new(DEFAULT_REPLY_MARGIN)
    }
}

impl<S> Layer<S> for DeadlineLayer {
    type Service = DeadlineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DeadlineService {
            inner,
            reply_margin: self.reply_margin,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadlineService<S> {
    inner: S,
    reply_margin: Duration,
}

impl<S> Service<RpcRequest> for DeadlineService<S>
where
    S: Service<RpcRequest, Response = RpcReply, Error = RpcRejection> + Send,
    S::Future: Send + 'static,
{
    type Response = RpcReply;
    type Error = RpcRejection;
    type Future = Pin<Box<dyn Future<Output = Result<RpcReply, RpcRejection>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: RpcRequest) -> Self::Future {
        let timeout_ms = request.timeout_ms;
        let Some(budget) = server_budget(timeout_ms, self.reply_margin) else {
            debug!(msg_id = %request.msg_id, timeout_ms, "call arrived with no time budget");
            return Box::pin(async move { Err(RpcRejection::DeadlineExceeded { timeout_ms }) });
        };

        let fut = self.inner.call(request);
        Box::pin(async move {
            tokio::time::timeout(budget, fut)
                .await
                .unwrap_or(Err(RpcRejection::DeadlineExceeded { timeout_ms }))
        })
    }
}
