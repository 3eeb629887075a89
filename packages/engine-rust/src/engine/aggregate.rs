//! Folding final operations into the caller's report.

use batchwise_core::{
    BatchReport, EntryStatus, FallbackStrategy, Operation, OperationReport, Outcome, RunStatus,
    Summary,
};

const NOT_EXECUTED: &str = "operation was not executed";

fn entry(op: &Operation) -> OperationReport {
    let (status, result, error) = match op.outcome() {
        Some(Outcome::Succeeded(record)) => (EntryStatus::Success, Some(record.clone()), None),
        Some(Outcome::Failed(reason)) => (EntryStatus::Failed, None, Some(reason.clone())),
        None if op.is_rejected() => (EntryStatus::Failed, None, None),
        None => (EntryStatus::Failed, None, Some(NOT_EXECUTED.to_string())),
    };
    OperationReport {
        operation_id: op.id().to_string(),
        operation_type: op.action(),
        object_type: op.target_type().to_string(),
        status,
        result,
        error,
        validation_errors: op.validation_errors().to_vec(),
    }
}

/// Build the report for `operations`, which must be in input order.
///
/// Pure: the same operations always produce the same report.
#[must_use]
pub fn aggregate(operations: &[Operation], fallback_used: Option<FallbackStrategy>) -> BatchReport {
    let results: Vec<OperationReport> = operations.iter().map(entry).collect();

    let successful = results
        .iter()
        .filter(|r| r.status == EntryStatus::Success)
        .count();
    let validation_failed = operations.iter().filter(|op| op.is_rejected()).count();

    BatchReport {
        status: RunStatus::Success,
        summary: Summary {
            total_operations: operations.len(),
            successful_operations: successful,
            failed_operations: operations.len() - successful - validation_failed,
            validation_failed,
            fallback_strategy_used: fallback_used,
        },
        results,
    }
}
