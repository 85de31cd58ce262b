//! Collections of test cases and the in-memory workspace that holds them.
//!
//! Every update produces a new value; callers hand full replacements to the
//! store, never deltas.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::http::method::HttpMethod;
use crate::http::request::{RequestSpec, null_as_default};

pub type CollectionId = String;
pub type CaseId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultHeader {
    pub key: String,
    pub value: String,
}

/// The result fields written back onto a test case after each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub result_status: bool,
    pub result_headers: Vec<ResultHeader>,
    pub result_body: Value,
    /// Elapsed milliseconds, kept as text so it survives save/load verbatim.
    pub time_taken: String,
}

/// A request with a declared expectation and its last recorded outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: CaseId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub test_case_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_id: Option<CollectionId>,
    #[serde(flatten)]
    pub request: RequestSpec,
    /// `true` means the call should come back 2xx.
    #[serde(default, deserialize_with = "null_as_default")]
    pub expected_status: bool,
    #[serde(default)]
    pub result_status: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result_headers: Vec<ResultHeader>,
    #[serde(default)]
    pub result_body: Value,
    #[serde(default, deserialize_with = "string_or_number")]
    pub time_taken: Option<String>,
    /// Display ordering only. Unreadable timestamps load as `None`.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl TestCase {
    /// A blank GET case belonging to `collection_id`.
    pub fn new(id: impl Into<CaseId>, collection_id: impl Into<CollectionId>) -> Self {
        Self {
            id: id.into(),
            test_case_name: "New Request".to_string(),
            description: None,
            publish_id: Some(collection_id.into()),
            request: RequestSpec::new(HttpMethod::Get, ""),
            expected_status: false,
            result_status: None,
            result_headers: Vec::new(),
            result_body: Value::Null,
            time_taken: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            test_case_name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_request(&self, request: RequestSpec) -> Self {
        Self {
            request,
            ..self.clone()
        }
    }

    pub fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self.clone()
        }
    }

    pub fn with_expected_status(&self, expected_status: bool) -> Self {
        Self {
            expected_status,
            ..self.clone()
        }
    }

    pub fn with_created_at(&self, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(created_at),
            ..self.clone()
        }
    }

    /// Overwrite every `result_*` field.
    pub fn with_result(&self, result: &CaseResult) -> Self {
        Self {
            result_status: Some(result.result_status),
            result_headers: result.result_headers.clone(),
            result_body: result.result_body.clone(),
            time_taken: Some(result.time_taken.clone()),
            ..self.clone()
        }
    }

    pub fn result(&self) -> Option<CaseResult> {
        Some(CaseResult {
            result_status: self.result_status?,
            result_headers: self.result_headers.clone(),
            result_body: self.result_body.clone(),
            time_taken: self.time_taken.clone().unwrap_or_default(),
        })
    }

    /// Whether the last run matched the expectation; `None` if never run.
    pub fn passed(&self) -> Option<bool> {
        self.result_status.map(|actual| actual == self.expected_status)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "time_taken must be a string or number, got {other}"
        ))),
    }
}

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::String(text)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    Ok(NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&text, format).ok())
        .map(|naive| naive.and_utc()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub test_cases: Vec<TestCase>,
}

impl Collection {
    pub fn new(id: impl Into<CollectionId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            test_cases: Vec::new(),
        }
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_case(&self, case: TestCase) -> Self {
        let mut test_cases = self.test_cases.clone();
        test_cases.push(case);
        Self {
            test_cases,
            ..self.clone()
        }
    }

    /// A copy with the case of the same id swapped for `case`.
    pub fn replacing_case(&self, case: &TestCase) -> Self {
        Self {
            test_cases: self
                .test_cases
                .iter()
                .map(|existing| {
                    if existing.id == case.id {
                        case.clone()
                    } else {
                        existing.clone()
                    }
                })
                .collect(),
            ..self.clone()
        }
    }

    pub fn without_case(&self, case_id: &str) -> Self {
        Self {
            test_cases: self
                .test_cases
                .iter()
                .filter(|case| case.id != case_id)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    pub fn case(&self, case_id: &str) -> Option<&TestCase> {
        self.test_cases.iter().find(|case| case.id == case_id)
    }

    /// Display order: oldest first, undated cases last.
    pub fn ordered_cases(&self) -> Vec<&TestCase> {
        let mut cases: Vec<&TestCase> = self.test_cases.iter().collect();
        cases.sort_by_key(|case| (case.created_at.is_none(), case.created_at));
        cases
    }
}

/// A plain saved request (no expectation) inside a request group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRequest {
    pub id: CaseId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(flatten)]
    pub request: RequestSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestGroup {
    pub id: CollectionId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub api_requests: Vec<SavedRequest>,
}

/// The collection list shared by the UI and the runners.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workspace {
    collections: Vec<Collection>,
}

impl Workspace {
    pub fn new(collections: Vec<Collection>) -> Self {
        Self { collections }
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.iter().find(|collection| collection.id == id)
    }

    pub fn find_case(&self, case_id: &str) -> Option<(&Collection, &TestCase)> {
        self.collections
            .iter()
            .find_map(|collection| collection.case(case_id).map(|case| (collection, case)))
    }

    /// Insert or replace a collection by id.
    pub fn upsert_collection(&mut self, collection: Collection) {
        match self.collections.iter_mut().find(|existing| existing.id == collection.id) {
            Some(slot) => *slot = collection,
            None => self.collections.push(collection),
        }
    }

    pub fn remove_collection(&mut self, id: &str) -> Option<Collection> {
        let index = self.collections.iter().position(|collection| collection.id == id)?;
        Some(self.collections.remove(index))
    }

    pub fn add_case(&mut self, collection_id: &str, case: TestCase) -> bool {
        let Some(collection) = self.collection(collection_id) else {
            return false;
        };
        let updated = collection.with_case(case);
        self.upsert_collection(updated);
        true
    }

    /// Swap in `case` wherever its id lives. Returns `false` if no collection
    /// holds it.
    pub fn replace_case(&mut self, case: &TestCase) -> bool {
        let Some((collection, _)) = self.find_case(&case.id) else {
            return false;
        };
        let updated = collection.replacing_case(case);
        self.upsert_collection(updated);
        true
    }

    pub fn remove_case(&mut self, case_id: &str) -> Option<TestCase> {
        let (collection, case) = self.find_case(case_id)?;
        let removed = case.clone();
        let updated = collection.without_case(case_id);
        self.upsert_collection(updated);
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn new_case_is_blank_get() {
        let case = TestCase::new("t1", "c1");
        assert_eq!(case.request.method, HttpMethod::Get);
        assert_eq!(case.request.url, "");
        assert_eq!(case.publish_id.as_deref(), Some("c1"));
        assert_eq!(case.passed(), None);
        assert_eq!(case.result(), None);
    }

    #[test]
    fn with_result_overwrites_fields_and_leaves_original() {
        let case = TestCase::new("t1", "c1").with_expected_status(true);
        let result = CaseResult {
            result_status: true,
            result_headers: vec![ResultHeader {
                key: "content-type".into(),
                value: "text/plain".into(),
            }],
            result_body: json!("ok"),
            time_taken: "12.00".into(),
        };

        let updated = case.with_result(&result);
        assert_eq!(updated.result(), Some(result));
        assert_eq!(updated.passed(), Some(true));
        assert_eq!(case.result_status, None);
    }

    #[test]
    fn ordered_cases_oldest_first() {
        let collection = Collection::new("c", "C")
            .with_case(TestCase::new("late", "c").with_created_at(at(300)))
            .with_case(TestCase {
                created_at: None,
                ..TestCase::new("undated", "c")
            })
            .with_case(TestCase::new("early", "c").with_created_at(at(100)));

        let ids: Vec<&str> = collection.ordered_cases().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "undated"]);
        assert_eq!(collection.test_cases[0].id, "late");
    }

    #[test]
    fn workspace_replace_case_swaps_by_id() {
        let mut workspace = Workspace::new(vec![
            Collection::new("a", "A").with_case(TestCase::new("t1", "a")),
            Collection::new("b", "B").with_case(TestCase::new("t2", "b")),
        ]);

        let renamed = workspace.find_case("t2").unwrap().1.renamed("Renamed");
        assert!(workspace.replace_case(&renamed));
        assert_eq!(workspace.collection("b").unwrap().test_cases[0].test_case_name, "Renamed");
        assert!(!workspace.replace_case(&TestCase::new("ghost", "a")));
    }

    #[test]
    fn workspace_add_and_remove() {
        let mut workspace = Workspace::new(vec![Collection::new("a", "A")]);
        assert!(workspace.add_case("a", TestCase::new("t1", "a")));
        assert!(!workspace.add_case("missing", TestCase::new("t2", "missing")));

        assert_eq!(workspace.remove_case("t1").map(|c| c.id), Some("t1".to_string()));
        assert!(workspace.collection("a").unwrap().test_cases.is_empty());
        assert!(workspace.remove_collection("a").is_some());
        assert!(workspace.collections().is_empty());
    }

    #[test]
    fn deserializes_backend_record() {
        let case: TestCase = serde_json::from_value(json!({
            "id": "t1",
            "test_case_name": "List items",
            "method": "GET",
            "url": "https://api.example.com/items",
            "headers": [],
            "params": null,
            "body": null,
            "expected_status": true,
            "result_status": false,
            "result_headers": [{ "key": "server", "value": "nginx" }],
            "result_body": { "error": "Failed to send request" },
            "time_taken": 42.5,
            "created_at": "2024-03-01T10:00:00Z",
        }))
        .unwrap();

        assert_eq!(case.request.url, "https://api.example.com/items");
        assert_eq!(case.time_taken.as_deref(), Some("42.5"));
        assert_eq!(case.passed(), Some(false));
        assert_eq!(case.created_at, Some(at(1_709_287_200)));
    }

    #[test]
    fn odd_timestamps_do_not_break_loading() {
        let parse = |created_at: Value| {
            let case: TestCase = serde_json::from_value(json!({
                "id": "t1",
                "method": "GET",
                "url": "http://x",
                "created_at": created_at,
            }))
            .unwrap();
            case.created_at
        };

        assert_eq!(parse(json!("2024-03-01 10:00:00")), Some(at(1_709_287_200)));
        assert_eq!(parse(json!("2024-03-01T10:00:00.000")), Some(at(1_709_287_200)));
        assert_eq!(parse(json!("2024-03-01T12:00:00+02:00")), Some(at(1_709_287_200)));
        assert_eq!(parse(json!("yesterday")), None);
        assert_eq!(parse(json!(1_709_287_200)), None);
        assert_eq!(parse(Value::Null), None);
    }

    #[test]
    fn time_taken_survives_round_trip_verbatim() {
        let case = TestCase {
            time_taken: Some("0.10".into()),
            ..TestCase::new("t1", "c1")
        };
        let json = serde_json::to_value(&case).unwrap();
        assert_eq!(json["time_taken"], json!("0.10"));
        assert_eq!(json["method"], json!("GET"));

        let back: TestCase = serde_json::from_value(json).unwrap();
        assert_eq!(back, case);
    }
}
