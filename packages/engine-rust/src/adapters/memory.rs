//! In-process [`RemoteStore`] implementation.
//!
//! [`MemoryStore`] keeps objects in memory, logs every call it receives, and
//! can be scripted to reject items or fail whole bulk calls. Used by tests
//! and by the CLI's dry-run mode.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use batchwise_core::{
    Action, ItemError, ItemOutcome, Payload, RemoteRecord, RemoteStore, StoreError,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::service::CallKind;

/// Which calls a rejection rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    /// Bulk and single-item calls.
    Always,
    /// Bulk calls only; the same item succeeds when submitted alone.
    BulkOnly,
}

#[derive(Debug, Clone)]
enum Matcher {
    Property { name: String, value: Value },
    RemoteId(String),
}

impl Matcher {
    fn matches(&self, item: &Payload) -> bool {
        match self {
            Self::Property { name, value } => item.properties.get(name) == Some(value),
            Self::RemoteId(id) => item.remote_id.as_deref() == Some(id.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct RejectRule {
    matcher: Matcher,
    message: String,
    scope: RuleScope,
}

/// One call received by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub action: Action,
    pub target_type: String,
    pub kind: CallKind,
    pub items: Vec<Payload>,
}

#[derive(Default)]
struct MemoryState {
    /// target type -> remote id -> properties
    objects: HashMap<String, BTreeMap<String, Map<String, Value>>>,
    next_id: u64,
    calls: Vec<CallRecord>,
    rules: Vec<RejectRule>,
    /// Failures consumed one per bulk call, front first.
    bulk_failures: VecDeque<StoreError>,
    /// Failure returned by every bulk call while set.
    bulk_outage: Option<StoreError>,
    max_bulk_items: Option<usize>,
}

impl MemoryState {
    fn rejection(&self, item: &Payload, kind: CallKind) -> Option<ItemError> {
        self.rules
            .iter()
            .find(|rule| {
                (rule.scope == RuleScope::Always || kind == CallKind::Bulk)
                    && rule.matcher.matches(item)
            })
            .map(|rule| ItemError::new(rule.message.clone()))
    }

    fn bulk_failure(&mut self, len: usize) -> Option<StoreError> {
        if let Some(err) = &self.bulk_outage {
            return Some(err.clone());
        }
        if let Some(err) = self.bulk_failures.pop_front() {
            return Some(err);
        }
        match self.max_bulk_items {
            Some(max) if len > max => Some(StoreError::Rejected(format!(
                "batch of {len} items exceeds limit of {max}"
            ))),
            _ => None,
        }
    }

    fn apply(&mut self, action: Action, target_type: &str, item: &Payload, kind: CallKind) -> ItemOutcome {
        if let Some(err) = self.rejection(item, kind) {
            return Err(err);
        }

        match action {
            Action::Create => {
                self.next_id += 1;
                let id = self.next_id.to_string();
                self.objects
                    .entry(target_type.to_string())
                    .or_default()
                    .insert(id.clone(), item.properties.clone());
                Ok(RemoteRecord {
                    properties: item.properties.clone(),
                    ..RemoteRecord::new(id)
                })
            }
            Action::Update => {
                let id = item
                    .remote_id
                    .as_deref()
                    .ok_or_else(|| ItemError::new("missing object id"))?;
                let stored = self
                    .objects
                    .get_mut(target_type)
                    .and_then(|objects| objects.get_mut(id))
                    .ok_or_else(|| ItemError::new(format!("object {id} not found")))?;
                for (key, value) in &item.properties {
                    stored.insert(key.clone(), value.clone());
                }
                Ok(RemoteRecord {
                    properties: stored.clone(),
                    ..RemoteRecord::new(id)
                })
            }
            Action::Delete => {
                let id = item
                    .remote_id
                    .as_deref()
                    .ok_or_else(|| ItemError::new("missing object id"))?;
                self.objects
                    .get_mut(target_type)
                    .and_then(|objects| objects.remove(id))
                    .ok_or_else(|| ItemError::new(format!("object {id} not found")))?;
                Ok(RemoteRecord::new(id))
            }
        }
    }
}

/// Scriptable in-memory remote store.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    concurrency: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            latency: None,
            concurrency: 1,
        }
    }

    /// Delay every call by `latency` before it is applied.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Advertise a concurrent request budget.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Insert an object directly, bypassing the call log. Returns its id.
    pub fn seed(&self, target_type: &str, properties: Map<String, Value>) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id.to_string();
        state
            .objects
            .entry(target_type.to_string())
            .or_default()
            .insert(id.clone(), properties);
        id
    }

    /// Reject items whose property `name` equals `value`.
    pub fn reject_where(
        &self,
        name: &str,
        value: Value,
        message: &str,
        scope: RuleScope,
    ) {
        self.state.lock().rules.push(RejectRule {
            matcher: Matcher::Property {
                name: name.to_string(),
                value,
            },
            message: message.to_string(),
            scope,
        });
    }

    /// Reject items addressing remote object `id`.
    pub fn reject_id(&self, id: &str, message: &str, scope: RuleScope) {
        self.state.lock().rules.push(RejectRule {
            matcher: Matcher::RemoteId(id.to_string()),
            message: message.to_string(),
            scope,
        });
    }

    /// Fail the next `count` bulk calls with `err`.
    pub fn fail_next_bulk(&self, count: usize, err: &StoreError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.bulk_failures.push_back(err.clone());
        }
    }

    /// Fail every bulk call with `err` until cleared with `None`.
    pub fn set_bulk_outage(&self, err: Option<StoreError>) {
        self.state.lock().bulk_outage = err;
    }

    /// Reject whole bulk calls carrying more than `max` items.
    pub fn limit_bulk_size(&self, max: usize) {
        self.state.lock().max_bulk_items = Some(max);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().calls.clone()
    }

    #[must_use]
    pub fn calls_of(&self, kind: CallKind) -> Vec<CallRecord> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn object_count(&self, target_type: &str) -> usize {
        self.state
            .lock()
            .objects
            .get(target_type)
            .map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn get(&self, target_type: &str, id: &str) -> Option<Map<String, Value>> {
        self.state
            .lock()
            .objects
            .get(target_type)
            .and_then(|objects| objects.get(id).cloned())
    }

    fn record(&self, action: Action, target_type: &str, kind: CallKind, items: &[Payload]) {
        self.state.lock().calls.push(CallRecord {
            action,
            target_type: target_type.to_string(),
            kind,
            items: items.to_vec(),
        });
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn bulk(
        &self,
        action: Action,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError> {
        self.record(action, target_type, CallKind::Bulk, items);
        self.delay().await;

        let mut state = self.state.lock();
        if let Some(err) = state.bulk_failure(items.len()) {
            return Err(err);
        }
        Ok(items
            .iter()
            .map(|item| state.apply(action, target_type, item, CallKind::Bulk))
            .collect())
    }

    async fn single(
        &self,
        action: Action,
        target_type: &str,
        item: &Payload,
    ) -> Result<ItemOutcome, StoreError> {
        self.record(action, target_type, CallKind::Single, std::slice::from_ref(item));
        self.delay().await;
        Ok(self
            .state
            .lock()
            .apply(action, target_type, item, CallKind::Single))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn create_many(
        &self,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError> {
        self.bulk(Action::Create, target_type, items).await
    }

    async fn update_many(
        &self,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError> {
        self.bulk(Action::Update, target_type, items).await
    }

    async fn delete_many(
        &self,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError> {
        self.bulk(Action::Delete, target_type, items).await
    }

    async fn create_one(
        &self,
        target_type: &str,
        item: &Payload,
    ) -> Result<ItemOutcome, StoreError> {
        self.single(Action::Create, target_type, item).await
    }

    async fn update_one(
        &self,
        target_type: &str,
        item: &Payload,
    ) -> Result<ItemOutcome, StoreError> {
        self.single(Action::Update, target_type, item).await
    }

    async fn delete_one(
        &self,
        target_type: &str,
        item: &Payload,
    ) -> Result<ItemOutcome, StoreError> {
        self.single(Action::Delete, target_type, item).await
    }

    fn max_concurrent_requests(&self) -> usize {
        self.concurrency
    }
}
