//! Pipeline composition: combines all middleware layers into a single service stack.

use batchwise_core::StoreError;
use tower::util::BoxCloneService;
use tower::ServiceBuilder;

use super::metrics::MetricsLayer;
use super::throttle::ThrottleLayer;
use super::timeout::TimeoutLayer;
use crate::config::EngineConfig;
use crate::service::call::{StoreCall, StoreReply};
use crate::service::router::StoreRouter;

/// Type-erased, cloneable call pipeline.
pub type CallPipeline = BoxCloneService<StoreCall, StoreReply, StoreError>;

/// Build the call pipeline by wrapping the `StoreRouter` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `ThrottleLayer` -- wait for an in-flight permit (queueing does not
///    count against the call's timeout)
/// 2. `TimeoutLayer` -- enforce the per-call timeout
/// 3. `MetricsLayer` -- record timing and outcome (closest to the adapter)
#[must_use]
pub fn build_call_pipeline(router: StoreRouter, config: &EngineConfig) -> CallPipeline {
    let svc = ServiceBuilder::new()
        .layer(ThrottleLayer::new(config.max_in_flight_calls))
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(router);
    BoxCloneService::new(svc)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use batchwise_core::{Action, Payload};
    use tower::ServiceExt;

    use super::*;
    use crate::adapters::MemoryStore;
    use crate::service::call::CallContext;
    use crate::service::registry::StoreRegistry;

    fn make_call(timeout_ms: u64) -> StoreCall {
        StoreCall::Single {
            ctx: CallContext {
                call_id: 42,
                action: Action::Create,
                target_type: "contacts".to_string(),
                call_timeout_ms: timeout_ms,
            },
            item: Payload::default(),
        }
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let registry = Arc::new(StoreRegistry::with_default(Arc::new(MemoryStore::new())));
        let pipeline = build_call_pipeline(StoreRouter::new(registry), &EngineConfig::default());

        let reply = pipeline.oneshot(make_call(5000)).await.unwrap();
        assert!(matches!(reply, StoreReply::Single(Ok(record)) if record.id == "1"));
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_times_out_slow_store() {
        let store = MemoryStore::new().with_latency(Duration::from_millis(500));
        let registry = Arc::new(StoreRegistry::with_default(Arc::new(store)));
        let pipeline = build_call_pipeline(StoreRouter::new(registry), &EngineConfig::default());

        let err = pipeline.oneshot(make_call(100)).await.unwrap_err();
        assert_eq!(err, StoreError::Timeout { timeout_ms: 100 });
    }
}
