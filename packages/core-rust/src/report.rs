//! Report returned to callers after a batch run.

use serde::{Deserialize, Serialize};

use crate::types::{Action, FallbackStrategy, RemoteRecord};
use crate::validation::ValidationIssue;

/// Overall request status. A batch with failed operations is still a
/// successful run; per-operation status carries the details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Success,
}

/// Per-operation status in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Success,
    Failed,
}

/// Counts across every operation in the request.
///
/// `successful_operations + failed_operations + validation_failed ==
/// total_operations` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_operations: usize,
    pub successful_operations: usize,
    /// Operations that reached the store and did not succeed.
    pub failed_operations: usize,
    /// Operations excluded by pre-flight validation.
    pub validation_failed: usize,
    /// Strategy applied, present only when a fallback actually fired.
    pub fallback_strategy_used: Option<FallbackStrategy>,
}

/// Final state of one operation, correlated to the request by `operation_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    pub operation_id: String,
    pub operation_type: Action,
    pub object_type: String,
    pub status: EntryStatus,
    pub result: Option<RemoteRecord>,
    pub error: Option<String>,
    pub validation_errors: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub status: RunStatus,
    pub summary: Summary,
    /// One entry per requested operation, in request order.
    pub results: Vec<OperationReport>,
}

impl BatchReport {
    /// Pretty-printed JSON rendering.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization failures.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Looks up the entry for an operation id.
    #[must_use]
    pub fn entry(&self, operation_id: &str) -> Option<&OperationReport> {
        self.results
            .iter()
            .find(|entry| entry.operation_id == operation_id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn summary_serializes_null_strategy() {
        let value = serde_json::to_value(Summary::default()).unwrap();
        assert_eq!(value["fallback_strategy_used"], json!(null));
        assert_eq!(value["total_operations"], json!(0));
    }

    #[test]
    fn report_entry_shape() {
        let report = BatchReport {
            status: RunStatus::Success,
            summary: Summary::default(),
            results: vec![OperationReport {
                operation_id: "b".to_string(),
                operation_type: Action::Create,
                object_type: "X".to_string(),
                status: EntryStatus::Failed,
                result: None,
                error: Some("duplicate".to_string()),
                validation_errors: Vec::new(),
            }],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], json!("success"));
        assert_eq!(value["results"][0]["status"], json!("failed"));
        assert_eq!(value["results"][0]["operation_type"], json!("create"));
        assert_eq!(value["results"][0]["result"], json!(null));
        assert_eq!(report.entry("b").and_then(|e| e.error.as_deref()), Some("duplicate"));
    }
}
