//! Caller-facing request format.
//!
//! Requests arrive as camelCase JSON:
//! `{"operations": [{"operationType", "objectType", "data", "operationId"}], ...options}`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Action, FallbackStrategy, Operation, Payload};

/// Errors from decoding a batch request.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("invalid request JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("operations parameter is required")]
    NoOperations,
    #[error("duplicate operationId {0:?}")]
    DuplicateOperationId(String),
}

/// One requested operation as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub operation_type: Action,
    pub object_type: String,
    /// Properties (flat or under `properties`) plus `id` for update/delete.
    #[serde(default)]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_id: Option<String>,
}

/// Per-request overrides of the engine configuration. `None` keeps the
/// engine default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auto_validate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fallback_strategy: Option<FallbackStrategy>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_failed: Option<bool>,
}

/// A complete batch request: the operations plus execution options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub operations: Vec<OperationRecord>,
    #[serde(flatten)]
    pub options: RequestOptions,
}

impl BatchRequest {
    /// Decode a request from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `IntakeError::Malformed` for JSON that does not match the
    /// request shape, `IntakeError::NoOperations` for an empty list and
    /// `IntakeError::DuplicateOperationId` when two operations share an id.
    pub fn from_json(text: &str) -> Result<Self, IntakeError> {
        let request: Self = serde_json::from_str(text)?;
        request.caller_ids()?;
        Ok(request)
    }

    /// Caller-supplied operation ids, checked for emptiness and uniqueness.
    fn caller_ids(&self) -> Result<HashSet<String>, IntakeError> {
        if self.operations.is_empty() {
            return Err(IntakeError::NoOperations);
        }
        let mut ids = HashSet::new();
        for id in self.operations.iter().filter_map(|r| r.operation_id.as_ref()) {
            if !ids.insert(id.clone()) {
                return Err(IntakeError::DuplicateOperationId(id.clone()));
            }
        }
        Ok(ids)
    }

    /// Split the request into operations (in request order) and options.
    ///
    /// Operations without an `operationId` get `op_{index}`, or
    /// `op_{index}_{n}` when the caller already took that id.
    ///
    /// # Errors
    ///
    /// Same request-level checks as [`BatchRequest::from_json`].
    pub fn into_parts(self) -> Result<(Vec<Operation>, RequestOptions), IntakeError> {
        let mut taken = self.caller_ids()?;
        let operations = self
            .operations
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let id = record
                    .operation_id
                    .unwrap_or_else(|| generated_id(index, &mut taken));
                Operation::new(
                    id,
                    record.operation_type,
                    record.object_type,
                    Payload::from_data(record.data),
                )
            })
            .collect();
        Ok((operations, self.options))
    }
}

fn generated_id(index: usize, taken: &mut HashSet<String>) -> String {
    let mut id = format!("op_{index}");
    let mut n = 1;
    while taken.contains(&id) {
        id = format!("op_{index}_{n}");
        n += 1;
    }
    taken.insert(id.clone());
    id
}
