use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validation::ValidationIssue;

/// Kind of change an operation requests against the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    /// Wire name of the action (`"create"`, `"update"`, `"delete"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether the action addresses an existing remote object and therefore
    /// needs a remote id.
    #[must_use]
    pub fn requires_remote_id(self) -> bool {
        !matches!(self, Self::Create)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recovery policy applied to chunks that fail wholly or partly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Resubmit every failed operation as its own single-item call.
    #[default]
    Individual,
    /// Resubmit the failed subset as one batch exactly once more.
    RetryBatch,
    /// Record the failed subset as failed without resubmitting.
    SkipFailed,
    /// Repeatedly halve the failed subset and resubmit the halves.
    PartialBatch,
}

impl FallbackStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::RetryBatch => "retry_batch",
            Self::SkipFailed => "skip_failed",
            Self::PartialBatch => "partial_batch",
        }
    }
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields to write plus, for updates and deletes, the id of the remote object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Payload {
    /// Property values to create or update. Ignored by deletes.
    pub properties: Map<String, Value>,
    /// Identifier of the existing remote object.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub remote_id: Option<String>,
}

impl Payload {
    #[must_use]
    pub fn new(properties: Map<String, Value>) -> Self {
        Self {
            properties,
            remote_id: None,
        }
    }

    #[must_use]
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Builds a payload from a request's free-form `data` object.
    ///
    /// `data.properties` supplies the properties when it is an object;
    /// otherwise every field except `id` is taken as a property. `data.id`
    /// (string or number) becomes the remote id. Non-object data yields an
    /// empty payload.
    #[must_use]
    pub fn from_data(data: Value) -> Self {
        let Value::Object(mut map) = data else {
            return Self::default();
        };

        let remote_id = match map.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        let properties = match map.remove("properties") {
            Some(Value::Object(properties)) => properties,
            Some(other) => {
                map.insert("properties".to_string(), other);
                map
            }
            None => map,
        };

        Self {
            properties,
            remote_id,
        }
    }
}

/// Object returned by the remote store for a successful write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Identifier assigned (create) or confirmed (update/delete) by the store.
    pub id: String,
    /// Property values as stored remotely.
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        alias = "createdAt"
    )]
    pub created_at: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        alias = "updatedAt"
    )]
    pub updated_at: Option<String>,
}

impl RemoteRecord {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Terminal state of an operation that reached the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded(RemoteRecord),
    Failed(String),
}

/// One caller-requested create, update, or delete.
///
/// The success result and failure reason share a single write-once slot, so
/// an operation can never carry both. Validation state is only changed via
/// [`Operation::mark_validated`] and [`Operation::reject`].
#[derive(Debug, Clone)]
pub struct Operation {
    id: String,
    action: Action,
    target_type: String,
    payload: Payload,
    validated: bool,
    validation_errors: Vec<ValidationIssue>,
    outcome: Option<Outcome>,
}

impl Operation {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        action: Action,
        target_type: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id: id.into(),
            action,
            target_type: target_type.into(),
            payload,
            validated: false,
            validation_errors: Vec::new(),
            outcome: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    #[must_use]
    pub fn validation_errors(&self) -> &[ValidationIssue] {
        &self.validation_errors
    }

    /// Whether validation excluded this operation from submission.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        !self.validation_errors.is_empty()
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    #[must_use]
    pub fn result(&self) -> Option<&RemoteRecord> {
        match &self.outcome {
            Some(Outcome::Succeeded(record)) => Some(record),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Some(Outcome::Failed(reason)) => Some(reason),
            _ => None,
        }
    }

    /// Whether the operation has settled: either an outcome was recorded or
    /// validation rejected it.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some() || self.is_rejected()
    }

    pub fn mark_validated(&mut self) {
        self.validated = true;
        self.validation_errors.clear();
    }

    /// Excludes the operation from submission. An empty issue list is ignored.
    pub fn reject(&mut self, issues: Vec<ValidationIssue>) {
        if issues.is_empty() {
            return;
        }
        self.validated = false;
        self.validation_errors = issues;
    }

    /// Records the terminal outcome. The first write wins; later writes are
    /// dropped and logged.
    pub fn settle(&mut self, outcome: Outcome) {
        debug_assert!(
            self.outcome.is_none(),
            "operation {} settled twice",
            self.id
        );
        if self.outcome.is_some() {
            tracing::warn!(operation_id = %self.id, "ignoring second outcome for settled operation");
            return;
        }
        self.outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::validation::ValidationIssue;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn payload_from_data_prefers_properties_object() {
        let payload = Payload::from_data(json!({
            "id": "123",
            "properties": {"email": "a@example.com"},
            "ignored": true
        }));
        assert_eq!(payload.remote_id.as_deref(), Some("123"));
        assert_eq!(payload.properties, props(json!({"email": "a@example.com"})));
    }

    #[test]
    fn payload_from_flat_data_uses_remaining_fields() {
        let payload = Payload::from_data(json!({"name": "foo", "id": 42}));
        assert_eq!(payload.remote_id.as_deref(), Some("42"));
        assert_eq!(payload.properties, props(json!({"name": "foo"})));
    }

    #[test]
    fn payload_from_non_object_is_empty() {
        assert_eq!(Payload::from_data(json!("nope")), Payload::default());
        assert_eq!(Payload::from_data(Value::Null), Payload::default());
    }

    #[test]
    fn empty_string_id_is_not_a_remote_id() {
        let payload = Payload::from_data(json!({"id": ""}));
        assert!(payload.remote_id.is_none());
    }

    #[test]
    fn settle_sets_result_or_error_exclusively() {
        let mut ok = Operation::new("a", Action::Create, "X", Payload::default());
        ok.settle(Outcome::Succeeded(RemoteRecord::new("1")));
        assert_eq!(ok.result().map(|r| r.id.as_str()), Some("1"));
        assert!(ok.error().is_none());

        let mut failed = Operation::new("b", Action::Create, "X", Payload::default());
        failed.settle(Outcome::Failed("duplicate".to_string()));
        assert_eq!(failed.error(), Some("duplicate"));
        assert!(failed.result().is_none());
        assert!(failed.is_terminal());
    }

    #[test]
    fn reject_clears_validated_flag() {
        let mut op = Operation::new("a", Action::Update, "X", Payload::default());
        op.mark_validated();
        assert!(op.is_validated());

        op.reject(vec![ValidationIssue::missing_required("id")]);
        assert!(!op.is_validated());
        assert!(op.is_rejected());
        assert!(op.is_terminal());
        assert!(op.outcome().is_none());
    }

    #[test]
    fn reject_with_no_issues_is_ignored() {
        let mut op = Operation::new("a", Action::Create, "X", Payload::default());
        op.reject(Vec::new());
        assert!(!op.is_rejected());
    }

    #[test]
    fn action_wire_names() {
        assert_eq!(serde_json::to_value(Action::Delete).unwrap(), json!("delete"));
        assert!(Action::Update.requires_remote_id());
        assert!(!Action::Create.requires_remote_id());
    }

    #[test]
    fn fallback_strategy_wire_names() {
        let parsed: FallbackStrategy = serde_json::from_value(json!("partial_batch")).unwrap();
        assert_eq!(parsed, FallbackStrategy::PartialBatch);
        assert_eq!(FallbackStrategy::default(), FallbackStrategy::Individual);
        assert_eq!(FallbackStrategy::RetryBatch.to_string(), "retry_batch");
    }

    #[test]
    fn remote_record_accepts_camel_case_timestamps() {
        let record: RemoteRecord = serde_json::from_value(json!({
            "id": "9",
            "properties": {},
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.created_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert!(record.updated_at.is_none());
    }
}
