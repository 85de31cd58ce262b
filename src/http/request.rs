use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

use super::method::HttpMethod;

pub const DEFAULT_CONTENT_TYPE: (&str, &str) = ("Content-Type", "application/json");

/// One row of the headers or params table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn active_key(&self) -> Option<&str> {
        let key = self.key.trim();
        (self.enabled && !key.is_empty()).then_some(key)
    }
}

/// Declarative description of one HTTP call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Vec<KeyValue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Vec<KeyValue>,
    /// Raw text, structured JSON, or `null`.
    #[serde(default)]
    pub body: Value,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_method(&self, method: HttpMethod) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }

    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    pub fn with_header(&self, header: KeyValue) -> Self {
        let mut headers = self.headers.clone();
        headers.push(header);
        Self {
            headers,
            ..self.clone()
        }
    }

    pub fn with_param(&self, param: KeyValue) -> Self {
        let mut params = self.params.clone();
        params.push(param);
        Self {
            params,
            ..self.clone()
        }
    }

    pub fn with_body(&self, body: Value) -> Self {
        Self {
            body,
            ..self.clone()
        }
    }

    /// Headers that will go on the wire, in order.
    ///
    /// Starts from `Content-Type: application/json`; an enabled header with the
    /// exact same (trimmed) key replaces the earlier value in place.
    pub fn outgoing_headers(&self) -> Vec<(String, String)> {
        let defaults = [(DEFAULT_CONTENT_TYPE.0.to_string(), DEFAULT_CONTENT_TYPE.1.to_string())];
        merge_active(defaults.into(), &self.headers)
    }

    /// Query parameters appended to the URL, in order. Later duplicates win.
    pub fn outgoing_params(&self) -> Vec<(String, String)> {
        merge_active(Vec::new(), &self.params)
    }

    /// The body to attach, if any.
    pub fn outgoing_body(&self) -> Option<String> {
        if !self.method.allows_body() {
            return None;
        }
        match &self.body {
            Value::Null => None,
            Value::String(text) if text.is_empty() => None,
            Value::String(text) => Some(text.clone()),
            structured => Some(structured.to_string()),
        }
    }

    /// Check a string body for JSON syntax before it is persisted and store it
    /// as structured data.
    pub fn prepare_for_save(&self) -> Result<Self> {
        let body = match &self.body {
            Value::String(text) if !text.is_empty() => {
                serde_json::from_str(text).map_err(|e| EngineError::InvalidBody {
                    message: e.to_string(),
                })?
            }
            other => other.clone(),
        };
        Ok(self.with_body(body))
    }
}

fn merge_active(mut merged: Vec<(String, String)>, entries: &[KeyValue]) -> Vec<(String, String)> {
    for entry in entries {
        let Some(key) = entry.active_key() else {
            continue;
        };
        match merged.iter_mut().find(|(existing, _)| existing == key) {
            Some(slot) => slot.1 = entry.value.clone(),
            None => merged.push((key.to_string(), entry.value.clone())),
        }
    }
    merged
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
