//! Store routing: dispatches a `StoreCall` to the adapter registered for its
//! target type.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use batchwise_core::{Action, StoreError};
use tower::Service;

use super::call::{StoreCall, StoreReply};
use super::registry::StoreRegistry;

pub(crate) type CallFuture = Pin<Box<dyn Future<Output = Result<StoreReply, StoreError>> + Send>>;

// ---------------------------------------------------------------------------
// StoreRouter
// ---------------------------------------------------------------------------

/// Innermost service of the call pipeline.
///
/// Resolves the adapter through the [`StoreRegistry`] and invokes the
/// capability method matching the call's action and shape. Calls for a
/// target type with no adapter fail with `StoreError::UnknownTargetType`.
#[derive(Clone)]
pub struct StoreRouter {
    registry: Arc<StoreRegistry>,
}

impl StoreRouter {
    #[must_use]
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }
}

impl Service<StoreCall> for StoreRouter {
    type Response = StoreReply;
    type Error = StoreError;
    type Future = CallFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: StoreCall) -> Self::Future {
        let target_type = call.ctx().target_type.clone();
        let Some(store) = self.registry.resolve(&target_type) else {
            return Box::pin(async move { Err(StoreError::UnknownTargetType { target_type }) });
        };

        Box::pin(async move {
            match call {
                StoreCall::Bulk { ctx, items } => {
                    let outcomes = match ctx.action {
                        Action::Create => store.create_many(&target_type, &items).await?,
                        Action::Update => store.update_many(&target_type, &items).await?,
                        Action::Delete => store.delete_many(&target_type, &items).await?,
                    };
                    Ok(StoreReply::Bulk(outcomes))
                }
                StoreCall::Single { ctx, item } => {
                    let outcome = match ctx.action {
                        Action::Create => store.create_one(&target_type, &item).await?,
                        Action::Update => store.update_one(&target_type, &item).await?,
                        Action::Delete => store.delete_one(&target_type, &item).await?,
                    };
                    Ok(StoreReply::Single(outcome))
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
