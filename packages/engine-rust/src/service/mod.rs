//! Remote call pipeline.
//!
//! Every remote store call passes through this stack:
//!
//! 1. **Client** (`client`): typed `submit_bulk` / `submit_single` entry points
//! 2. **Middleware** (`middleware`): Tower layers (throttle, timeout, metrics)
//! 3. **Routing** (`router`): dispatch to the adapter for the call's target type
//! 4. **Registry** (`registry`): target type -> `RemoteStore` adapter

pub mod call;
pub mod client;
pub mod middleware;
pub mod registry;
pub mod router;

pub use call::{CallContext, CallKind, StoreCall, StoreReply};
pub use client::StoreClient;
pub use registry::StoreRegistry;
pub use router::StoreRouter;
