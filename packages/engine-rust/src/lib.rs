//! Batchwise engine: grouping, chunked execution, fallback recovery, and
//! remote store adapters.

pub mod adapters;
pub mod config;
pub mod engine;
pub mod service;
pub mod validation;

pub use adapters::{HttpStore, HttpStoreConfig, MemoryStore};
pub use config::EngineConfig;
pub use engine::{aggregate, BatchEngine, EngineRun};
pub use service::{StoreClient, StoreRegistry};
pub use validation::{SchemaError, SchemaValidator};
