//! Metrics middleware for store calls.
//!
//! Records call duration and outcome in a `tracing` span and through the
//! `metrics` facade. No exporter is installed here; the host picks one.

use std::task::{Context, Poll};
use std::time::Instant;

use batchwise_core::StoreError;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::call::{StoreCall, StoreReply};
use crate::service::router::CallFuture;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments store calls with timing and counting.
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

/// Label for the outcome of a call: call-level error kind, or `ok`.
fn outcome_label(result: &Result<StoreReply, StoreError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(StoreError::Timeout { .. }) => "timeout",
        Err(StoreError::Transport(_)) => "transport",
        Err(StoreError::Unauthorized(_)) => "unauthorized",
        Err(StoreError::Rejected(_)) => "rejected",
        Err(StoreError::UnknownTargetType { .. }) => "unroutable",
    }
}

impl<S> Service<StoreCall> for MetricsService<S>
where
    S: Service<StoreCall, Response = StoreReply, Error = StoreError> + Send,
    S::Future: Send + 'static,
{
    type Response = StoreReply;
    type Error = StoreError;
    type Future = CallFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: StoreCall) -> Self::Future {
        let ctx = call.ctx();
        let call_id = ctx.call_id;
        let action = ctx.action.as_str();
        let target_type = ctx.target_type.clone();
        let kind = call.kind().as_str();
        let items = call.item_count();

        let span = info_span!(
            "store_call",
            call_id = call_id,
            action = action,
            target_type = %target_type,
            kind = kind,
            items = items,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(call);

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

                ::metrics::counter!(
                    "batch_store_calls_total",
                    "action" => action,
                    "kind" => kind,
                    "outcome" => outcome
                )
                .increment(1);
                ::metrics::histogram!(
                    "batch_store_call_duration_seconds",
                    "action" => action,
                    "kind" => kind
                )
                .record(elapsed.as_secs_f64());

                tracing::debug!(
                    call_id = call_id,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    "store call complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
