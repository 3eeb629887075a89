//! Pre-flight checks run before any operation is submitted.

pub mod schema;
pub mod suggest;

use batchwise_core::{Operation, ValidationIssue, ValidationResult, Validator};

pub use schema::{ObjectSchema, PropertySchema, PropertyType, SchemaError, SchemaValidator};

/// Checks every operation needs regardless of schema: update and delete must
/// address a remote object.
#[must_use]
pub fn structural_issues(op: &Operation) -> Vec<ValidationIssue> {
    if op.action().requires_remote_id() && op.payload().remote_id.is_none() {
        vec![ValidationIssue::missing_required("id")]
    } else {
        Vec::new()
    }
}

/// Validate `op` in place. Returns whether it may be submitted.
///
/// Structural issues short-circuit the schema validator.
pub fn preflight(op: &mut Operation, validator: Option<&dyn Validator>) -> bool {
    let mut issues = structural_issues(op);
    if issues.is_empty() {
        if let Some(validator) = validator {
            if let ValidationResult::Invalid { errors } =
                validator.validate(op.target_type(), op.action(), op.payload())
            {
                issues = errors;
            }
        }
    }

    if issues.is_empty() {
        op.mark_validated();
        true
    } else {
        tracing::debug!(
            operation_id = op.id(),
            issues = issues.len(),
            "operation failed validation"
        );
        op.reject(issues);
        false
    }
}

#[cfg(test)]
mod tests {
    use batchwise_core::{Action, IssueKind, Payload};

    use super::*;

    #[test]
    fn update_without_remote_id_is_rejected() {
        let mut op = Operation::new("a", Action::Update, "deals", Payload::default());
        assert!(!preflight(&mut op, None));
        assert_eq!(op.validation_errors()[0].reason, IssueKind::MissingRequired);
        assert_eq!(op.validation_errors()[0].field, "id");
    }

    #[test]
    fn create_without_validator_is_valid() {
        let mut op = Operation::new("a", Action::Create, "deals", Payload::default());
        assert!(preflight(&mut op, None));
        assert!(op.is_validated());
    }

    #[test]
    fn validator_issues_reject_operation() {
        let deny = |_: &str, _: Action, _: &Payload| {
            ValidationResult::from_issues(vec![ValidationIssue::schema_unavailable("deals")])
        };
        let mut op = Operation::new("a", Action::Create, "deals", Payload::default());
        assert!(!preflight(&mut op, Some(&deny)));
        assert!(op.is_rejected());
        assert!(!op.is_validated());
    }

    #[test]
    fn structural_issue_skips_validator() {
        let panic_if_called = |_: &str, _: Action, _: &Payload| -> ValidationResult {
            panic!("validator should not run")
        };
        let mut op = Operation::new("a", Action::Delete, "deals", Payload::default());
        assert!(!preflight(&mut op, Some(&panic_if_called)));
    }
}
