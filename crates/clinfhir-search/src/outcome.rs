//! OperationOutcome rendering for rejected searches.

use crate::validation::{IssueCode, SearchIssue};
use serde_json::{Value, json};

/// HTTP status when every issue is an unsupported parameter.
pub const STATUS_NOT_IMPLEMENTED: u16 = 501;
/// HTTP status for any other rejected request.
pub const STATUS_UNPROCESSABLE: u16 = 422;

/// Render issues as a FHIR `OperationOutcome` resource.
pub fn operation_outcome(issues: &[SearchIssue]) -> Value {
    let issues: Vec<Value> = issues
        .iter()
        .map(|issue| {
            json!({
                "severity": "error",
                "code": issue.code.as_str(),
                "expression": [issue.parameter],
                "details": { "text": issue.message },
            })
        })
        .collect();
    json!({
        "resourceType": "OperationOutcome",
        "issue": issues,
    })
}

pub fn suggested_status(issues: &[SearchIssue]) -> u16 {
    if !issues.is_empty() && issues.iter().all(|i| i.code == IssueCode::NotSupported) {
        STATUS_NOT_IMPLEMENTED
    } else {
        STATUS_UNPROCESSABLE
    }
}
