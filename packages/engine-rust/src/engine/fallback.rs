//! Recovery of failed chunks.
//!
//! The controller receives the still-failing entries of one chunk and drives
//! every one of them to a terminal outcome according to the strategy chosen
//! for the request.

use std::time::Duration;

use batchwise_core::FallbackStrategy;
use futures_util::future::join_all;
use tracing::debug;

use super::executor::{Attempt, ChunkSubmitter, Pending};
use super::grouper::{chunk_entries, Entry};

pub struct FallbackController {
    strategy: FallbackStrategy,
    submitter: ChunkSubmitter,
    workers: usize,
    retry_backoff: Duration,
}

impl FallbackController {
    #[must_use]
    pub fn new(
        strategy: FallbackStrategy,
        submitter: ChunkSubmitter,
        workers: usize,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            strategy,
            submitter,
            workers: workers.max(1),
            retry_backoff,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> FallbackStrategy {
        self.strategy
    }

    /// Settle every pending entry.
    pub async fn recover(&self, pending: Vec<Pending>) -> Vec<Entry> {
        if pending.is_empty() {
            return Vec::new();
        }
        debug!(
            strategy = self.strategy.as_str(),
            target_type = %self.submitter.key().target_type,
            failed = pending.len(),
            "fallback engaged"
        );

        match self.strategy {
            FallbackStrategy::Individual => self.individual(pending).await,
            FallbackStrategy::RetryBatch => self.retry_batch(pending).await,
            FallbackStrategy::SkipFailed => pending.into_iter().map(Pending::fail).collect(),
            FallbackStrategy::PartialBatch => self.partial_batch(pending).await,
        }
    }

    async fn individual(&self, pending: Vec<Pending>) -> Vec<Entry> {
        let entries = pending.into_iter().map(|p| p.entry).collect();
        self.submitter.submit_each(entries, self.workers).await
    }

    /// One more bulk attempt with the identical subset; no recursion.
    async fn retry_batch(&self, pending: Vec<Pending>) -> Vec<Entry> {
        let all_transient = pending.iter().all(|p| p.failure.transient);
        if all_transient && !self.retry_backoff.is_zero() {
            debug!(backoff_ms = self.retry_backoff.as_millis(), "backing off before retry");
            tokio::time::sleep(self.retry_backoff).await;
        }

        let entries = pending.into_iter().map(|p| p.entry).collect();
        let Attempt {
            mut settled,
            pending,
        } = self.submitter.submit_chunk(entries).await;
        settled.extend(pending.into_iter().map(Pending::fail));
        settled
    }

    /// Halve and resubmit until everything settles. Pieces of one entry go
    /// through the single-item call and are final.
    async fn partial_batch(&self, pending: Vec<Pending>) -> Vec<Entry> {
        let mut settled = Vec::with_capacity(pending.len());
        let mut failing = pending;
        let mut size = (failing.len() / 2).max(1);
        let mut round = 0usize;

        while !failing.is_empty() {
            round += 1;
            failing.sort_by_key(|p| p.entry.position);
            let entries: Vec<Entry> = failing.into_iter().map(|p| p.entry).collect();
            let pieces = chunk_entries(entries, size);
            debug!(round, size, pieces = pieces.len(), "partial batch round");

            let attempts = join_all(pieces.into_iter().map(|piece| self.submit_piece(piece))).await;

            failing = Vec::new();
            for attempt in attempts {
                settled.extend(attempt.settled);
                failing.extend(attempt.pending);
            }

            if size == 1 {
                settled.extend(failing.drain(..).map(Pending::fail));
            }
            size = (size / 2).max(1);
        }
        settled
    }

    async fn submit_piece(&self, mut piece: Vec<Entry>) -> Attempt {
        if piece.len() == 1 {
            if let Some(entry) = piece.pop() {
                return Attempt {
                    settled: vec![self.submitter.submit_single(entry).await],
                    pending: Vec::new(),
                };
            }
        }
        self.submitter.submit_chunk(piece).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use batchwise_core::{Action, Operation, Payload, StoreError};
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::adapters::{MemoryStore, RuleScope};
    use crate::config::EngineConfig;
    use crate::engine::executor::Failure;
    use crate::engine::grouper::GroupKey;
    use crate::service::{CallKind, StoreClient, StoreRegistry};

    fn controller(store: Arc<MemoryStore>, strategy: FallbackStrategy) -> FallbackController {
        let registry = Arc::new(StoreRegistry::with_default(store));
        let client = StoreClient::new(registry, &EngineConfig::default());
        let submitter = ChunkSubmitter::new(
            client,
            GroupKey {
                action: Action::Create,
                target_type: "X".to_string(),
            },
        );
        FallbackController::new(strategy, submitter, 4, Duration::from_millis(250))
    }

    fn pending(count: usize, transient: bool) -> Vec<Pending> {
        (0..count)
            .map(|i| Pending {
                entry: Entry::new(
                    i,
                    Operation::new(
                        format!("op_{i}"),
                        Action::Create,
                        "X",
                        Payload::from_data(json!({ "name": format!("n{i}") })),
                    ),
                ),
                failure: Failure {
                    reason: "first attempt failed".to_string(),
                    transient,
                },
            })
            .collect()
    }

    #[tokio::test]
    async fn individual_isolates_the_bad_item() {
        let store = Arc::new(MemoryStore::new());
        store.reject_where("name", json!("n3"), "duplicate", RuleScope::Always);

        let settled = controller(store.clone(), FallbackStrategy::Individual)
            .recover(pending(5, false))
            .await;

        assert_eq!(settled.len(), 5);
        assert_eq!(settled.iter().filter(|e| e.op.result().is_some()).count(), 4);
        let failed: Vec<_> = settled.iter().filter(|e| e.op.error().is_some()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].op.id(), "op_3");
        assert_eq!(failed[0].op.error(), Some("duplicate"));
        assert_eq!(store.calls_of(CallKind::Single).len(), 5);
    }

    #[tokio::test]
    async fn skip_failed_makes_no_calls() {
        let store = Arc::new(MemoryStore::new());
        let settled = controller(store.clone(), FallbackStrategy::SkipFailed)
            .recover(pending(3, false))
            .await;

        assert!(settled.iter().all(|e| e.op.error() == Some("first attempt failed")));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn retry_batch_makes_exactly_one_more_attempt() {
        let store = Arc::new(MemoryStore::new());
        store.set_bulk_outage(Some(StoreError::Rejected("batch refused".into())));

        let settled = controller(store.clone(), FallbackStrategy::RetryBatch)
            .recover(pending(4, false))
            .await;

        assert_eq!(settled.len(), 4);
        assert!(settled.iter().all(|e| e.op.error().is_some()));
        assert_eq!(store.calls_of(CallKind::Bulk).len(), 1);
        assert!(store.calls_of(CallKind::Single).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_batch_backs_off_after_transient_failure() {
        let store = Arc::new(MemoryStore::new());
        let start = tokio::time::Instant::now();

        let settled = controller(store, FallbackStrategy::RetryBatch)
            .recover(pending(2, true))
            .await;

        assert!(settled.iter().all(|e| e.op.result().is_some()));
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn partial_batch_halves_down_to_single_calls() {
        let store = Arc::new(MemoryStore::new());
        store.set_bulk_outage(Some(StoreError::Rejected("batch refused".into())));
        store.reject_where("name", json!("n5"), "duplicate", RuleScope::Always);

        let settled = controller(store.clone(), FallbackStrategy::PartialBatch)
            .recover(pending(16, false))
            .await;

        assert_eq!(settled.len(), 16);
        assert!(settled.iter().all(|e| e.op.is_terminal()));
        let bulk_sizes: Vec<_> = store
            .calls_of(CallKind::Bulk)
            .iter()
            .map(|c| c.items.len())
            .collect();
        // Rounds of 8, 4, 2, then single-item calls.
        assert_eq!(bulk_sizes.len(), 2 + 4 + 8);
        assert!(bulk_sizes.iter().all(|&n| n == 8 || n == 4 || n == 2));
        assert_eq!(store.calls_of(CallKind::Single).len(), 16);
        assert_eq!(settled.iter().filter(|e| e.op.error().is_some()).count(), 1);
    }

    #[tokio::test]
    async fn partial_batch_stops_once_pieces_succeed() {
        let store = Arc::new(MemoryStore::new());
        store.reject_where("name", json!("n0"), "conflict", RuleScope::BulkOnly);

        let settled = controller(store.clone(), FallbackStrategy::PartialBatch)
            .recover(pending(4, false))
            .await;

        assert!(settled.iter().all(|e| e.op.result().is_some()));
        // Round 1: two pieces of 2; the piece holding n0 splits into singles.
        assert_eq!(store.calls_of(CallKind::Bulk).len(), 2);
        assert_eq!(store.calls_of(CallKind::Single).len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn partial_batch_settles_everything(count in 1usize..40, bad in proptest::collection::vec(0usize..40, 0..6)) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let store = Arc::new(MemoryStore::new());
            for b in &bad {
                store.reject_where("name", json!(format!("n{b}")), "duplicate", RuleScope::Always);
            }
            store.set_bulk_outage(Some(StoreError::Transport("down".into())));

            let settled = runtime.block_on(
                controller(store.clone(), FallbackStrategy::PartialBatch).recover(pending(count, false)),
            );

            prop_assert_eq!(settled.len(), count);
            prop_assert!(settled.iter().all(|e| e.op.is_terminal()));
            prop_assert!(settled.iter().all(|e| e.op.result().is_some() != e.op.error().is_some()));

            // Every round halves the piece size, so at most ceil(log2(n)) bulk rounds run.
            let max_rounds = usize::BITS - (count.max(1) - 1).leading_zeros();
            let bulk_calls = store.calls_of(CallKind::Bulk).len();
            prop_assert!(bulk_calls < (1usize << max_rounds).max(1));
        }
    }
}
