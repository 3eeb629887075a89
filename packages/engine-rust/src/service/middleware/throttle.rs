//! Throttling middleware for store calls.
//!
//! Caps the number of remote calls in flight across every group. Calls
//! beyond the cap wait for a permit instead of being rejected, so bursts from
//! parallel groups queue up rather than hammering the remote API.

use std::sync::Arc;
use std::task::{Context, Poll};

use batchwise_core::StoreError;
use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::service::call::{StoreCall, StoreReply};
use crate::service::router::CallFuture;

// ---------------------------------------------------------------------------
// ThrottleLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent store calls via a shared semaphore.
#[derive(Debug, Clone)]
pub struct ThrottleLayer {
    semaphore: Arc<Semaphore>,
}

impl ThrottleLayer {
    /// Create a new `ThrottleLayer` with the given in-flight limit (minimum 1).
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = ThrottleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ThrottleService {
            inner,
            semaphore: self.semaphore.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ThrottleService
// ---------------------------------------------------------------------------

/// Service wrapper that holds a semaphore permit for the duration of a call.
#[derive(Debug, Clone)]
pub struct ThrottleService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<StoreCall> for ThrottleService<S>
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
        let semaphore = self.semaphore.clone();
        // Inner futures are lazy: no remote work starts until the permit is held.
        let fut = self.inner.call(call);
        Box::pin(async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| StoreError::Transport("call throttle closed".to_string()))?;
            let result = fut.await;
            drop(permit);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
