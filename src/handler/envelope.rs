//! Invocation and response envelope types exchanged with the request layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An inbound invocation. The counter needs no input, so the payload is
/// carried only for logging and ignored otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    #[serde(default)]
    pub payload: Value,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: Value) -> Self {
        Self { payload }
    }
}

/// Gateway-style response: status, headers, and a JSON-encoded string body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub is_base64_encoded: bool,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

impl ResponseEnvelope {
    pub const CONTENT_TYPE: &'static str = "application/json";

    fn json(status_code: u16, body: &Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), Self::CONTENT_TYPE.to_string());
        Self {
            is_base64_encoded: false,
            status_code,
            headers,
            multi_value_headers: BTreeMap::new(),
            body: body.to_string(),
        }
    }

    /// `200 {"count": n}`.
    pub fn count(count: u64) -> Self {
        Self::json(200, &json!({ "count": count }))
    }

    /// `status {"error": message}`.
    pub fn error(status_code: u16, message: &str) -> Self {
        Self::json(status_code, &json!({ "error": message }))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Parse the body back into JSON.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
