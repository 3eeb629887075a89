use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use batchwise_core::{Action, ItemOutcome, Payload, StoreError};
use tower::ServiceExt;

use super::call::{CallContext, StoreCall, StoreReply};
use super::middleware::{build_call_pipeline, CallPipeline};
use super::registry::StoreRegistry;
use super::router::StoreRouter;
use crate::config::EngineConfig;

/// Typed front door to the call pipeline.
///
/// Cheap to clone; clones share the pipeline (and its in-flight throttle),
/// the registry, and the call id counter.
#[derive(Clone)]
pub struct StoreClient {
    pipeline: CallPipeline,
    registry: Arc<StoreRegistry>,
    call_ids: Arc<AtomicU64>,
    call_timeout_ms: u64,
}

impl StoreClient {
    #[must_use]
    pub fn new(registry: Arc<StoreRegistry>, config: &EngineConfig) -> Self {
        let pipeline = build_call_pipeline(StoreRouter::new(registry.clone()), config);
        Self {
            pipeline,
            registry,
            call_ids: Arc::new(AtomicU64::new(1)),
            call_timeout_ms: config.call_timeout_ms,
        }
    }

    fn context(&self, action: Action, target_type: &str) -> CallContext {
        CallContext {
            call_id: self.call_ids.fetch_add(1, Ordering::Relaxed),
            action,
            target_type: target_type.to_string(),
            call_timeout_ms: self.call_timeout_ms,
        }
    }

    /// Submit one bulk call. Outcomes are index-aligned with `items`.
    ///
    /// # Errors
    ///
    /// Returns the call-level `StoreError` when the whole call fails.
    pub async fn submit_bulk(
        &self,
        action: Action,
        target_type: &str,
        items: Vec<Payload>,
    ) -> Result<Vec<ItemOutcome>, StoreError> {
        let call = StoreCall::Bulk {
            ctx: self.context(action, target_type),
            items,
        };
        match self.pipeline.clone().oneshot(call).await? {
            StoreReply::Bulk(outcomes) => Ok(outcomes),
            StoreReply::Single(_) => Err(StoreError::Rejected(
                "store answered a bulk call with a single-item reply".to_string(),
            )),
        }
    }

    /// Submit one single-item call.
    ///
    /// # Errors
    ///
    /// Returns the call-level `StoreError` when the call fails.
    pub async fn submit_single(
        &self,
        action: Action,
        target_type: &str,
        item: Payload,
    ) -> Result<ItemOutcome, StoreError> {
        let call = StoreCall::Single {
            ctx: self.context(action, target_type),
            item,
        };
        match self.pipeline.clone().oneshot(call).await? {
            StoreReply::Single(outcome) => Ok(outcome),
            StoreReply::Bulk(mut outcomes) if outcomes.len() == 1 => outcomes
                .pop()
                .ok_or_else(|| StoreError::Rejected("empty reply".to_string())),
            StoreReply::Bulk(_) => Err(StoreError::Rejected(
                "store answered a single-item call with a bulk reply".to_string(),
            )),
        }
    }

    /// Concurrent request budget of the adapter serving `target_type`.
    #[must_use]
    pub fn concurrency_budget(&self, target_type: &str) -> usize {
        self.registry.concurrency_budget(target_type)
    }
}
