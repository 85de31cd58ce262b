use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Value, json};

pub const REQUEST_FAILED_STATUS_TEXT: &str = "Request Failed";
pub const REQUEST_FAILED_MESSAGE: &str = "Failed to send request";

/// Response payload, resolved once at normalization time.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Text(String),
    Json(Value),
    Empty,
}

impl ResponseData {
    /// Byte length of the serialized body: JSON text for structured data,
    /// raw length for text.
    pub fn serialized_len(&self) -> usize {
        match self {
            ResponseData::Text(text) => text.len(),
            ResponseData::Json(value) => value.to_string().len(),
            ResponseData::Empty => 0,
        }
    }

    /// Value form used when the body is stored on a test case.
    pub fn to_value(&self) -> Value {
        match self {
            ResponseData::Text(text) => Value::String(text.clone()),
            ResponseData::Json(value) => value.clone(),
            ResponseData::Empty => Value::Null,
        }
    }

    /// Indented JSON for structured data, raw text otherwise.
    pub fn pretty(&self) -> String {
        match self {
            ResponseData::Text(text) => text.clone(),
            ResponseData::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            ResponseData::Empty => String::new(),
        }
    }
}

impl Serialize for ResponseData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponseData::Text(text) => serializer.serialize_str(text),
            ResponseData::Json(value) => value.serialize(serializer),
            ResponseData::Empty => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResponseSize {
    pub headers: usize,
    pub body: usize,
}

/// Uniform view of a response, whichever way the dispatch ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub data: ResponseData,
    pub content_type: String,
    pub size: ResponseSize,
    /// Elapsed milliseconds.
    pub time: f64,
}

impl ResponseRecord {
    /// The record for a request that never got a response.
    pub fn failed() -> Self {
        Self {
            status: 0,
            status_text: REQUEST_FAILED_STATUS_TEXT.to_string(),
            headers: BTreeMap::new(),
            data: ResponseData::Json(json!({ "error": REQUEST_FAILED_MESSAGE })),
            content_type: "application/json".to_string(),
            size: ResponseSize::default(),
            time: 0.0,
        }
    }

    /// No response reached the client.
    pub fn is_transport_failure(&self) -> bool {
        self.status == 0
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
