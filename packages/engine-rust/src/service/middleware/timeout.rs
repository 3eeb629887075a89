//! Per-call deadline for store calls.
//!
//! Each call carries its own `call_timeout_ms`; the clock starts when the
//! call reaches this layer, so time spent waiting on the throttle is free.
//! An expired call resolves to `StoreError::Timeout`, which the executor
//! treats as a transient batch error.

use std::task::{Context, Poll};
use std::time::Duration;

use batchwise_core::StoreError;
use tower::{Layer, Service};
use tracing::warn;

use crate::service::call::{StoreCall, StoreReply};
use crate::service::router::CallFuture;

#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<StoreCall> for TimeoutService<S>
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
        let ctx = call.ctx().clone();
        let items = call.item_count();
        let reply = self.inner.call(call);
        Box::pin(async move {
            let budget = Duration::from_millis(ctx.call_timeout_ms);
            if let Ok(result) = tokio::time::timeout(budget, reply).await {
                return result;
            }
            warn!(
                call_id = ctx.call_id,
                target_type = %ctx.target_type,
                action = ctx.action.as_str(),
                items,
                timeout_ms = ctx.call_timeout_ms,
                "store call timed out"
            );
            Err(StoreError::Timeout {
                timeout_ms: ctx.call_timeout_ms,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use batchwise_core::{Action, Payload};
    use tower::ServiceExt;

    use super::*;
    use crate::adapters::MemoryStore;
    use crate::service::call::CallContext;
    use crate::service::registry::StoreRegistry;
    use crate::service::router::StoreRouter;

    fn routed(latency_ms: u64) -> TimeoutService<StoreRouter> {
        let store = MemoryStore::new().with_latency(Duration::from_millis(latency_ms));
        let registry = Arc::new(StoreRegistry::with_default(Arc::new(store)));
        TimeoutLayer.layer(StoreRouter::new(registry))
    }

    fn bulk_create(call_id: u64, items: usize, timeout_ms: u64) -> StoreCall {
        StoreCall::Bulk {
            ctx: CallContext {
                call_id,
                action: Action::Create,
                target_type: "contacts".to_string(),
                call_timeout_ms: timeout_ms,
            },
            items: vec![Payload::default(); items],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_reply_within_deadline_passes_through() {
        let reply = routed(10).oneshot(bulk_create(1, 3, 1_000)).await.unwrap();
        match reply {
            StoreReply::Bulk(outcomes) => assert_eq!(outcomes.len(), 3),
            StoreReply::Single(_) => panic!("bulk call answered with a single reply"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_call_is_a_transient_store_error() {
        let err = routed(200).oneshot(bulk_create(1, 2, 50)).await.unwrap_err();
        assert_eq!(err, StoreError::Timeout { timeout_ms: 50 });
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_keep_their_own_deadlines() {
        let svc = routed(200);
        let (tight, loose) = tokio::join!(
            svc.clone().oneshot(bulk_create(1, 1, 100)),
            svc.clone().oneshot(bulk_create(2, 1, 500)),
        );
        assert_eq!(tight.unwrap_err(), StoreError::Timeout { timeout_ms: 100 });
        assert!(loose.is_ok());
    }
}
