use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::client::{Dispatch, RawResponse, TransportError};
use super::response::{ResponseData, ResponseRecord, ResponseSize};

/// Turn a dispatch outcome into a [`ResponseRecord`].
///
/// Responses that arrived through the transport's failure path (non-2xx) are
/// filled in from the nested response with `time` forced to zero. A failure
/// with no response at all becomes [`ResponseRecord::failed`].
pub fn normalize(
    outcome: &Result<RawResponse, TransportError>,
    elapsed_ms: f64,
) -> ResponseRecord {
    match outcome {
        Ok(raw) => from_raw(raw, elapsed_ms),
        Err(TransportError {
            response: Some(raw),
            ..
        }) => from_raw(raw, 0.0),
        Err(_) => ResponseRecord::failed(),
    }
}

pub fn normalize_dispatch(dispatch: &Dispatch) -> ResponseRecord {
    normalize(&dispatch.outcome, dispatch.elapsed_ms())
}

fn from_raw(raw: &RawResponse, time: f64) -> ResponseRecord {
    let headers = flatten_headers(&raw.headers);
    let content_type = headers.get("content-type").cloned().unwrap_or_default();
    let data = parse_body(&raw.body, &content_type);

    let size = ResponseSize {
        headers: serde_json::to_string(&headers).map(|s| s.len()).unwrap_or(0),
        body: data.serialized_len(),
    };

    ResponseRecord {
        status: raw.status,
        status_text: raw.status_text.clone(),
        headers,
        data,
        content_type,
        size,
        time,
    }
}

/// Lowercase names; repeated headers are joined with ", ".
fn flatten_headers(headers: &[(String, String)]) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        flat.entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    flat
}

fn parse_body(body: &[u8], content_type: &str) -> ResponseData {
    if body.is_empty() {
        return ResponseData::Empty;
    }

    let text = String::from_utf8_lossy(body).into_owned();
    if !is_json_content_type(content_type) {
        return ResponseData::Text(text);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => ResponseData::Json(value),
        Err(err) => {
            debug!(content_type, error = %err, "Body is not valid JSON, keeping raw text");
            ResponseData::Text(text)
        }
    }
}

pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.ends_with("/json") || essence.ends_with("+json")
}
