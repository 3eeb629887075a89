use std::sync::Arc;

use batchwise_core::RemoteStore;
use dashmap::DashMap;
use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// StoreRegistry
// ---------------------------------------------------------------------------

/// Maps target types to the remote store adapter that serves them.
///
/// Lookups check the per-type entries first and fall back to the default
/// adapter, so the engine itself stays type-agnostic.
pub struct StoreRegistry {
    by_type: DashMap<String, Arc<dyn RemoteStore>>,
    default: RwLock<Option<Arc<dyn RemoteStore>>>,
}

impl StoreRegistry {
    /// Creates an empty registry with no default adapter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_type: DashMap::new(),
            default: RwLock::new(None),
        }
    }

    /// Creates a registry that routes every target type to `store`.
    #[must_use]
    pub fn with_default(store: Arc<dyn RemoteStore>) -> Self {
        let registry = Self::new();
        registry.set_default(store);
        registry
    }

    /// Register an adapter for one target type, replacing any previous one.
    pub fn register(&self, target_type: impl Into<String>, store: Arc<dyn RemoteStore>) {
        self.by_type.insert(target_type.into(), store);
    }

    pub fn set_default(&self, store: Arc<dyn RemoteStore>) {
        *self.default.write() = Some(store);
    }

    /// Resolve the adapter for a target type.
    pub fn resolve(&self, target_type: &str) -> Option<Arc<dyn RemoteStore>> {
        self.by_type
            .get(target_type)
            .map(|entry| entry.value().clone())
            .or_else(|| self.default.read().clone())
    }

    /// Concurrent request budget of the adapter serving `target_type`.
    /// Unroutable types report 1.
    pub fn concurrency_budget(&self, target_type: &str) -> usize {
        self.resolve(target_type)
            .map_or(1, |store| store.max_concurrent_requests().max(1))
    }

    /// Target types with an explicit registration, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.by_type.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
