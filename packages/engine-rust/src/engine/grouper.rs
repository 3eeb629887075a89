//! Partitioning of validated operations by `(action, target_type)`.

use std::collections::HashMap;

use batchwise_core::{Action, Operation};

/// An operation tagged with its position in the caller's input.
#[derive(Debug)]
pub struct Entry {
    pub position: usize,
    pub op: Operation,
}

impl Entry {
    #[must_use]
    pub fn new(position: usize, op: Operation) -> Self {
        Self { position, op }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub action: Action,
    pub target_type: String,
}

impl GroupKey {
    #[must_use]
    pub fn of(op: &Operation) -> Self {
        Self {
            action: op.action(),
            target_type: op.target_type().to_string(),
        }
    }
}

/// Operations sharing action and target type, in input order.
#[derive(Debug)]
pub struct Group {
    pub key: GroupKey,
    pub entries: Vec<Entry>,
}

impl Group {
    /// Split into chunks of at most `size` entries (`size` is clamped to 1).
    #[must_use]
    pub fn chunked(self, size: usize) -> Vec<Vec<Entry>> {
        chunk_entries(self.entries, size)
    }
}

/// Split `entries` into consecutive pieces of at most `size`.
#[must_use]
pub fn chunk_entries(entries: Vec<Entry>, size: usize) -> Vec<Vec<Entry>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(entries.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(entries.len()));
    for entry in entries {
        current.push(entry);
        if current.len() == size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Group entries by `(action, target_type)`. Groups appear in order of first
/// appearance and keep input order within each group.
#[must_use]
pub fn group(entries: Vec<Entry>) -> Vec<Group> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for entry in entries {
        let key = GroupKey::of(&entry.op);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(Group {
                key,
                entries: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].entries.push(entry);
    }
    groups
}
