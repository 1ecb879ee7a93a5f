//! Admission control for conductor calls.
//!
//! The endpoint serves at most `max_concurrent_calls` calls at once. A call
//! arriving when every slot is taken is refused with
//! `RpcRejection::Overloaded` instead of being queued, and the refusal is
//! counted per method so that an operator can see which calls are shed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use conductor_core::{RpcRejection, RpcReply, RpcRequest};
use tokio::sync::Semaphore;
use tower::{Layer, Service};
use tracing::warn;

/// Counter of calls refused for lack of capacity, labelled `method`.
pub const SHED_TOTAL: &str = "conductor_rpc_shed_total";

/// Tower layer admitting a bounded number of concurrent calls.
///
/// Every service the layer produces, and every clone of those, draws from
/// the same slots.
#[derive(Debug, Clone)]
pub struct AdmissionLayer {
    limit: usize,
    slots: Arc<Semaphore>,
}

impl AdmissionLayer {
    #[must_use]
    pub fn new(max_concurrent_calls: u32) -> Self {
        let limit = max_concurrent_calls as usize;
        Self {
            limit,
            slots: Arc::new(Semaphore::new(limit)),
        }
    }

    /// Calls currently admitted and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.limit - self.slots.available_permits()
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            limit: self.limit,
            slots: Arc::clone(&self.slots),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionService<S> {
    inner: S,
    limit: usize,
    slots: Arc<Semaphore>,
}

impl<S> Service<RpcRequest> for AdmissionService<S>
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
        let Ok(slot) = Arc::clone(&self.slots).try_acquire_owned() else {
            let method = request.call.method();
            warn!(method, msg_id = %request.msg_id, limit = self.limit, "conductor call shed");
            metrics::counter!(SHED_TOTAL, "method" => method).increment(1);
            return Box::pin(async { Err(RpcRejection::Overloaded) });
        };

        let fut = self.inner.call(request);
        Box::pin(async move {
            let reply = fut.await;
            drop(slot);
            reply
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use conductor_core::{ManagerCall, RequestContext};
    use tower::{service_fn, ServiceExt};

    use super::*;

    fn request() -> RpcRequest {
        RpcRequest::new(RequestContext::admin(), ManagerCall::InstanceGetAll, 5_000)
    }

    fn acknowledge(req: RpcRequest) -> Result<RpcReply, RpcRejection> {
        Ok(RpcReply::success(req.msg_id, Vec::new()))
    }

    #[tokio::test]
    async fn admits_up_to_the_limit_and_sheds_the_rest() {
        let layer = AdmissionLayer::new(2);
        let gate = Arc::new(Semaphore::new(0));
        let held = Arc::clone(&gate);
        let svc = layer.layer(service_fn(move |req: RpcRequest| {
            let held = Arc::clone(&held);
            async move {
                let _pass = held.acquire().await;
                acknowledge(req)
            }
        }));

        let first = tokio::spawn(svc.clone().oneshot(request()));
        let second = tokio::spawn(svc.clone().oneshot(request()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(layer.in_flight(), 2);

        let err = svc.clone().oneshot(request()).await.unwrap_err();
        assert_eq!(err, RpcRejection::Overloaded);

        gate.add_permits(2);
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(layer.in_flight(), 0);
    }

    #[tokio::test]
    async fn slot_is_returned_when_the_call_fails() {
        let layer = AdmissionLayer::new(1);
        let mut svc = layer.layer(service_fn(|_req: RpcRequest| async {
            Err::<RpcReply, _>(RpcRejection::DeadlineExceeded { timeout_ms: 0 })
        }));

        for _ in 0..3 {
            let _ = ServiceExt::ready(&mut svc).await.unwrap().call(request()).await;
            assert_eq!(layer.in_flight(), 0);
        }
    }
}
