//! # Test evaluation
//!
//! A test case declares whether its call should succeed (2xx) or not. After a
//! dispatch the observed outcome is compared to that expectation and the
//! `result_*` fields are written back onto the case.

pub mod runner;

use serde::Serialize;

use crate::collections::{CaseResult, ResultHeader, TestCase};
use crate::http::response::ResponseRecord;

/// `true` when the observed success/failure matches the declared expectation.
///
/// Status `0` (no response) is never a success.
pub fn evaluate(expected: bool, actual_status: u16) -> bool {
    expected == is_success_status(actual_status)
}

pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// The persisted result shape for a normalized response.
pub fn case_result(record: &ResponseRecord) -> CaseResult {
    CaseResult {
        result_status: !record.is_transport_failure() && is_success_status(record.status),
        result_headers: record
            .headers
            .iter()
            .map(|(key, value)| ResultHeader {
                key: key.clone(),
                value: value.clone(),
            })
            .collect(),
        result_body: record.data.to_value(),
        time_taken: format!("{:.2}", record.time),
    }
}

/// One executed test case: the updated case, the response and the verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseRun {
    pub case: TestCase,
    pub record: ResponseRecord,
    pub passed: bool,
}

/// Write the outcome of `record` onto `case` and judge it.
pub fn record_outcome(case: &TestCase, record: ResponseRecord) -> CaseRun {
    let result = case_result(&record);
    let passed = case.expected_status == result.result_status;
    CaseRun {
        case: case.with_result(&result),
        record,
        passed,
    }
}
