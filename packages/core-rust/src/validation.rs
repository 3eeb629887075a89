use serde::{Deserialize, Serialize};

/// Category of a pre-flight validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Property name is not part of the target type's schema.
    UnknownField,
    /// Required property is absent, null, or empty.
    MissingRequired,
    /// Property value has the wrong JSON type.
    TypeMismatch,
    /// Property value is not one of the enumerated options.
    InvalidOption,
    /// Property value has the right type but a malformed shape (email, datetime).
    InvalidFormat,
    /// No schema is known for the target type.
    SchemaUnavailable,
}

/// One structured validation failure, reported per field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Offending property name, or `"*"` for issues not tied to one field.
    pub field: String,
    pub reason: IssueKind,
    /// Human-readable description of the failure.
    pub message: String,
    /// Candidate corrections, best first.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
}

impl ValidationIssue {
    #[must_use]
    pub fn unknown_field(field: impl Into<String>, suggestions: Vec<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("property '{field}' does not exist on this object type"),
            field,
            reason: IssueKind::UnknownField,
            suggestions,
        }
    }

    #[must_use]
    pub fn missing_required(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("property '{field}' is required and cannot be empty"),
            field,
            reason: IssueKind::MissingRequired,
            suggestions: Vec::new(),
        }
    }

    #[must_use]
    pub fn type_mismatch(field: impl Into<String>, expected: &str, actual: &str) -> Self {
        let field = field.into();
        Self {
            message: format!("expected {expected}, got {actual}"),
            field,
            reason: IssueKind::TypeMismatch,
            suggestions: Vec::new(),
        }
    }

    #[must_use]
    pub fn invalid_option(
        field: impl Into<String>,
        value: &str,
        allowed: &[String],
        suggestions: Vec<String>,
    ) -> Self {
        let field = field.into();
        Self {
            message: format!(
                "'{value}' is not a valid option (allowed: {})",
                allowed.join(", ")
            ),
            field,
            reason: IssueKind::InvalidOption,
            suggestions,
        }
    }

    #[must_use]
    pub fn invalid_format(field: impl Into<String>, value: &str, expected: &str) -> Self {
        let field = field.into();
        Self {
            message: format!("'{value}' is not a valid {expected}"),
            field,
            reason: IssueKind::InvalidFormat,
            suggestions: Vec::new(),
        }
    }

    #[must_use]
    pub fn schema_unavailable(target_type: &str) -> Self {
        Self {
            field: "*".to_string(),
            reason: IssueKind::SchemaUnavailable,
            message: format!("no property schema available for '{target_type}'"),
            suggestions: Vec::new(),
        }
    }
}

/// Result of validating an operation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The payload conforms to the schema.
    Valid,
    /// The payload violates one or more schema constraints.
    Invalid {
        /// Field-level descriptions of each failure, in discovery order.
        errors: Vec<ValidationIssue>,
    },
}

impl ValidationResult {
    /// Builds a result from collected issues: `Valid` when there are none.
    #[must_use]
    pub fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        if errors.is_empty() {
            Self::Valid
        } else {
            Self::Invalid { errors }
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}
