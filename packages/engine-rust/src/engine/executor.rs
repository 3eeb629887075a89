//! Chunked submission of a group to the remote store.

use batchwise_core::{Outcome, StoreError};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::fallback::FallbackController;
use super::grouper::{Entry, Group, GroupKey};
use crate::service::StoreClient;

const MISSING_RESULT: &str = "missing result for item";

/// Why an entry is still unresolved after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: String,
    /// The failure was a transient call-level error (timeout or transport).
    pub transient: bool,
}

impl Failure {
    fn item(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            transient: false,
        }
    }

    fn call(err: &StoreError) -> Self {
        Self {
            reason: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

/// An entry that failed an attempt and has not been settled.
#[derive(Debug)]
pub struct Pending {
    pub entry: Entry,
    pub failure: Failure,
}

impl Pending {
    /// Record the last failure as final.
    #[must_use]
    pub fn fail(mut self) -> Entry {
        self.entry.op.settle(Outcome::Failed(self.failure.reason));
        self.entry
    }
}

/// Result of one bulk attempt: settled successes and still-failing entries.
#[derive(Debug, Default)]
pub struct Attempt {
    pub settled: Vec<Entry>,
    pub pending: Vec<Pending>,
}

/// Submits entries of one group through the call pipeline.
#[derive(Clone)]
pub struct ChunkSubmitter {
    client: StoreClient,
    key: GroupKey,
}

impl ChunkSubmitter {
    #[must_use]
    pub fn new(client: StoreClient, key: GroupKey) -> Self {
        Self { client, key }
    }

    #[must_use]
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Submit `entries` as one bulk call.
    ///
    /// Entries that already carry an outcome are passed through untouched.
    pub async fn submit_chunk(&self, entries: Vec<Entry>) -> Attempt {
        let mut attempt = Attempt::default();
        let (done, open): (Vec<Entry>, Vec<Entry>) = entries
            .into_iter()
            .partition(|entry| entry.op.outcome().is_some());
        attempt.settled.extend(done);
        if open.is_empty() {
            return attempt;
        }

        let items = open.iter().map(|entry| entry.op.payload().clone()).collect();
        match self
            .client
            .submit_bulk(self.key.action, &self.key.target_type, items)
            .await
        {
            Ok(outcomes) => {
                if outcomes.len() != open.len() {
                    warn!(
                        target_type = %self.key.target_type,
                        expected = open.len(),
                        received = outcomes.len(),
                        "bulk response length mismatch"
                    );
                }
                let mut outcomes = outcomes.into_iter();
                for mut entry in open {
                    match outcomes.next() {
                        Some(Ok(record)) => {
                            entry.op.settle(Outcome::Succeeded(record));
                            attempt.settled.push(entry);
                        }
                        Some(Err(err)) => attempt.pending.push(Pending {
                            entry,
                            failure: Failure::item(err.message),
                        }),
                        None => attempt.pending.push(Pending {
                            entry,
                            failure: Failure::item(MISSING_RESULT),
                        }),
                    }
                }
            }
            Err(err) => {
                warn!(
                    target_type = %self.key.target_type,
                    action = self.key.action.as_str(),
                    items = open.len(),
                    error = %err,
                    "bulk call failed"
                );
                let failure = Failure::call(&err);
                attempt.pending.extend(open.into_iter().map(|entry| Pending {
                    entry,
                    failure: failure.clone(),
                }));
            }
        }

        debug!(
            target_type = %self.key.target_type,
            settled = attempt.settled.len(),
            pending = attempt.pending.len(),
            "chunk attempt complete"
        );
        attempt
    }

    /// Submit one entry through the single-item call. The outcome is final.
    pub async fn submit_single(&self, mut entry: Entry) -> Entry {
        if entry.op.outcome().is_some() {
            return entry;
        }
        let outcome = match self
            .client
            .submit_single(
                self.key.action,
                &self.key.target_type,
                entry.op.payload().clone(),
            )
            .await
        {
            Ok(Ok(record)) => Outcome::Succeeded(record),
            Ok(Err(err)) => Outcome::Failed(err.message),
            Err(err) => Outcome::Failed(err.to_string()),
        };
        entry.op.settle(outcome);
        entry
    }

    /// Submit each entry on its own through a bounded, order-preserving pool.
    pub async fn submit_each(&self, entries: Vec<Entry>, workers: usize) -> Vec<Entry> {
        stream::iter(entries)
            .map(|entry| self.submit_single(entry))
            .buffered(workers.max(1))
            .collect()
            .await
    }
}

/// Runs one group: chunking, first attempts, and fallback hand-off.
pub struct BatchExecutor {
    submitter: ChunkSubmitter,
    batch_size: usize,
    workers: usize,
    /// `None` when failed attempts are final.
    fallback: Option<FallbackController>,
}

/// Entries of a finished group, all settled.
#[derive(Debug, Default)]
pub struct GroupRun {
    pub entries: Vec<Entry>,
    pub fallback_fired: bool,
}

impl BatchExecutor {
    #[must_use]
    pub fn new(
        submitter: ChunkSubmitter,
        batch_size: usize,
        workers: usize,
        fallback: Option<FallbackController>,
    ) -> Self {
        Self {
            submitter,
            batch_size: batch_size.max(1),
            workers: workers.max(1),
            fallback,
        }
    }

    /// Run a group to completion. Chunks are dispatched through a pool of
    /// `workers`; with a pool of one they run strictly in order.
    pub async fn run(&self, group: Group) -> GroupRun {
        let chunks = group.chunked(self.batch_size);
        debug!(
            target_type = %self.submitter.key().target_type,
            action = self.submitter.key().action.as_str(),
            chunks = chunks.len(),
            workers = self.workers,
            "running group"
        );

        let runs: Vec<GroupRun> = stream::iter(chunks)
            .map(|chunk| self.run_chunk(chunk))
            .buffered(self.workers)
            .collect()
            .await;

        runs.into_iter().fold(GroupRun::default(), |mut acc, run| {
            acc.entries.extend(run.entries);
            acc.fallback_fired |= run.fallback_fired;
            acc
        })
    }

    async fn run_chunk(&self, chunk: Vec<Entry>) -> GroupRun {
        let Attempt {
            mut settled,
            pending,
        } = self.submitter.submit_chunk(chunk).await;

        if pending.is_empty() {
            return GroupRun {
                entries: settled,
                fallback_fired: false,
            };
        }

        match &self.fallback {
            Some(fallback) => {
                settled.extend(fallback.recover(pending).await);
                GroupRun {
                    entries: settled,
                    fallback_fired: true,
                }
            }
            None => {
                settled.extend(pending.into_iter().map(Pending::fail));
                GroupRun {
                    entries: settled,
                    fallback_fired: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use batchwise_core::{Action, Operation, Payload};
    use serde_json::json;

    use super::*;
    use crate::adapters::{MemoryStore, RuleScope};
    use crate::config::EngineConfig;
    use crate::service::{CallKind, StoreRegistry};

    fn submitter(store: Arc<MemoryStore>, action: Action) -> ChunkSubmitter {
        let registry = Arc::new(StoreRegistry::with_default(store));
        let client = StoreClient::new(registry, &EngineConfig::default());
        ChunkSubmitter::new(
            client,
            GroupKey {
                action,
                target_type: "X".to_string(),
            },
        )
    }

    fn entries(names: &[&str]) -> Vec<Entry> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let payload = Payload::from_data(json!({ "name": name }));
                Entry::new(i, Operation::new(format!("op_{i}"), Action::Create, "X", payload))
            })
            .collect()
    }

    #[tokio::test]
    async fn partial_chunk_splits_settled_and_pending() {
        let store = Arc::new(MemoryStore::new());
        store.reject_where("name", json!("bar"), "duplicate", RuleScope::Always);
        let attempt = submitter(store, Action::Create)
            .submit_chunk(entries(&["foo", "bar", "baz"]))
            .await;

        assert_eq!(attempt.settled.len(), 2);
        assert_eq!(attempt.pending.len(), 1);
        assert_eq!(attempt.pending[0].entry.position, 1);
        assert_eq!(attempt.pending[0].failure, Failure::item("duplicate"));
    }

    #[tokio::test]
    async fn call_failure_marks_whole_chunk_pending() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_bulk(1, &StoreError::Transport("connection reset".into()));
        let attempt = submitter(store, Action::Create)
            .submit_chunk(entries(&["a", "b"]))
            .await;

        assert!(attempt.settled.is_empty());
        assert!(attempt.pending.iter().all(|p| p.failure.transient));
        assert_eq!(
            attempt.pending[0].failure.reason,
            StoreError::Transport("connection reset".into()).to_string()
        );
    }

    #[tokio::test]
    async fn settled_entries_are_not_resubmitted() {
        let store = Arc::new(MemoryStore::new());
        let mut input = entries(&["a", "b"]);
        input[0].op.settle(Outcome::Failed("earlier".to_string()));

        let attempt = submitter(store.clone(), Action::Create)
            .submit_chunk(input)
            .await;

        assert_eq!(attempt.settled.len(), 2);
        let calls = store.calls_of(CallKind::Bulk);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].items.len(), 1);
    }

    #[tokio::test]
    async fn without_fallback_failures_are_final() {
        let store = Arc::new(MemoryStore::new());
        store.reject_where("name", json!("b"), "duplicate", RuleScope::Always);
        let executor = BatchExecutor::new(submitter(store.clone(), Action::Create), 2, 1, None);
        let group = Group {
            key: GroupKey {
                action: Action::Create,
                target_type: "X".to_string(),
            },
            entries: entries(&["a", "b", "c"]),
        };

        let run = executor.run(group).await;
        assert!(!run.fallback_fired);
        assert_eq!(run.entries.len(), 3);
        let failed: Vec<_> = run.entries.iter().filter_map(|e| e.op.error()).collect();
        assert_eq!(failed, vec!["duplicate"]);
        assert!(store.calls_of(CallKind::Single).is_empty());
        let sizes: Vec<_> = store.calls_of(CallKind::Bulk).iter().map(|c| c.items.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
    }
}
