//! [`RemoteStore`](batchwise_core::RemoteStore) implementations.

pub mod http;
pub mod memory;

pub use http::{HttpStore, HttpStoreConfig};
pub use memory::{CallRecord, MemoryStore, RuleScope};
