//! Metrics middleware for conductor calls.
//!
//! Opens an `rpc_call` tracing span per call and records call counts and
//! durations through the `metrics` facade, labelled by method and outcome.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use conductor_core::{RpcOutcome, RpcRejection, RpcReply, RpcRequest};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

/// Counter of finished calls, labelled `method` and `outcome`.
pub const CALLS_TOTAL: &str = "conductor_rpc_calls_total";
/// Histogram of call durations in seconds, labelled `method`.
pub const CALL_DURATION_SECONDS: &str = "conductor_rpc_call_duration_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments calls with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records call duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

/// Outcome label for a finished call.
fn outcome_label(result: &Result<RpcReply, RpcRejection>) -> &'static str {
    match result {
        Ok(RpcReply {
            outcome: RpcOutcome::Success(_),
            ..
        }) => "ok",
        Ok(RpcReply {
            outcome: RpcOutcome::Failure(_),
            ..
        }) => "failure",
        Ok(RpcReply {
            outcome: RpcOutcome::Rejected(_),
            ..
        })
        | Err(_) => "rejected",
    }
}

impl<S> Service<RpcRequest> for MetricsService<S>
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
        let method = request.call.method();

        let span = info_span!(
            "rpc_call",
            method = method,
            msg_id = %request.msg_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();
                let outcome = outcome_label(&result);

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(CALLS_TOTAL, "method" => method, "outcome" => outcome)
                    .increment(1);
                metrics::histogram!(CALL_DURATION_SECONDS, "method" => method)
                    .record(elapsed.as_secs_f64());

                tracing::debug!(method, duration_ms, outcome, "rpc call complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
