//! `Batchwise` Core: operation model, remote store and validator capabilities,
//! request and report schemas.

pub mod report;
pub mod request;
pub mod traits;
pub mod types;
pub mod validation;

pub use report::{BatchReport, EntryStatus, OperationReport, RunStatus, Summary};
pub use request::{BatchRequest, IntakeError, OperationRecord, RequestOptions};
pub use traits::{ItemError, ItemOutcome, RemoteStore, StoreError, Validator};
pub use types::{Action, FallbackStrategy, Operation, Outcome, Payload, RemoteRecord};
pub use validation::{IssueKind, ValidationIssue, ValidationResult};
