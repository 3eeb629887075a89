use async_trait::async_trait;

use crate::types::{Action, Payload, RemoteRecord};
use crate::validation::ValidationResult;

/// Rejection of a single item by the remote store.
///
/// The message is surfaced verbatim as the operation's failure reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ItemError {
    pub message: String,
}

impl ItemError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Per-item result of a store call: the stored record or the item's rejection.
pub type ItemOutcome = Result<RemoteRecord, ItemError>;

/// Failure of a whole store call. Every item in the call is affected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("batch rejected: {0}")]
    Rejected(String),
    #[error("no remote store registered for object type '{target_type}'")]
    UnknownTargetType { target_type: String },
    #[error("store call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl StoreError {
    /// Whether a retry of the same call could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

/// Capability-shaped client for a remote object store.
///
/// Bulk calls return one outcome per submitted item, index-aligned with the
/// input. Single-item calls return the item's outcome; the outer `Result`
/// carries call-level failures only.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn create_many(
        &self,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError>;

    async fn update_many(
        &self,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError>;

    async fn delete_many(
        &self,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError>;

    async fn create_one(&self, target_type: &str, item: &Payload)
        -> Result<ItemOutcome, StoreError>;

    async fn update_one(&self, target_type: &str, item: &Payload)
        -> Result<ItemOutcome, StoreError>;

    async fn delete_one(&self, target_type: &str, item: &Payload)
        -> Result<ItemOutcome, StoreError>;

    /// Number of calls the store accepts concurrently per endpoint.
    /// Defaults to 1 (strictly serialized).
    fn max_concurrent_requests(&self) -> usize {
        1
    }
}

/// Synchronous, side-effect-free payload check run before submission.
pub trait Validator: Send + Sync {
    fn validate(&self, target_type: &str, action: Action, payload: &Payload) -> ValidationResult;
}

impl<F> Validator for F
where
    F: Fn(&str, Action, &Payload) -> ValidationResult + Send + Sync,
{
    fn validate(&self, target_type: &str, action: Action, payload: &Payload) -> ValidationResult {
        self(target_type, action, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationIssue;

    #[test]
    fn transient_errors() {
        assert!(StoreError::Transport("reset".into()).is_transient());
        assert!(StoreError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(!StoreError::Unauthorized("bad token".into()).is_transient());
        assert!(!StoreError::Rejected("malformed".into()).is_transient());
        assert!(!StoreError::UnknownTargetType {
            target_type: "x".into()
        }
        .is_transient());
    }

    #[test]
    fn item_error_displays_message_verbatim() {
        assert_eq!(ItemError::new("duplicate").to_string(), "duplicate");
    }

    #[test]
    fn closures_are_validators() {
        let validator = |target: &str, _action: Action, _payload: &Payload| {
            if target == "contacts" {
                ValidationResult::Valid
            } else {
                ValidationResult::from_issues(vec![ValidationIssue::schema_unavailable(target)])
            }
        };
        assert!(validator
            .validate("contacts", Action::Create, &Payload::default())
            .is_valid());
        assert!(!validator
            .validate("deals", Action::Create, &Payload::default())
            .is_valid());
    }
}
