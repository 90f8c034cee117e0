//! Request and response envelopes
//!
//! One JSON object per line. A request names its operation in `type`, may
//! carry a client `id` echoed back in the response, and puts its inputs
//! alongside:
//!
//! ```json
//! {"type":"accept_invitation","id":"7","account":"+12024561414","group_id":"8c6b..."}
//! ```

use super::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(rename = "type")]
    pub operation: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Request {
    /// Parse one line; on failure the error is ready to send back.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| ProtocolError::validation("request", format!("invalid JSON: {}", e)))?;
        if !value.is_object() {
            return Err(ProtocolError::validation(
                "request",
                "request must be a JSON object",
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| ProtocolError::validation("type", format!("invalid request: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

impl Response {
    pub fn success(id: Option<Value>, operation: String, data: Value) -> Self {
        Self {
            id,
            operation: Some(operation),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, operation: Option<String>, error: ProtocolError) -> Self {
        Self {
            id,
            operation,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_collects_fields() {
        let request =
            Request::parse(r#"{"type":"list_groups","id":1,"account":"+1555"}"#).unwrap();
        assert_eq!(request.operation, "list_groups");
        assert_eq!(request.id, Some(json!(1)));
        assert_eq!(request.fields.get("account"), Some(&json!("+1555")));
        assert!(!request.fields.contains_key("type"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let e = Request::parse("not json").unwrap_err();
        assert_eq!(e.kind, ErrorKind::ValidationError);

        let e = Request::parse(r#"{"account":"+1555"}"#).unwrap_err();
        assert_eq!(e.kind, ErrorKind::ValidationError);

        let e = Request::parse("[1,2]").unwrap_err();
        assert_eq!(e.kind, ErrorKind::ValidationError);
    }

    #[test]
    fn test_response_omits_empty_parts() {
        let ok = Response::success(Some(json!("a")), "trust".into(), json!({}));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"id": "a", "type": "trust", "data": {}})
        );
        assert!(!ok.is_error());
    }
}
