//! Request and response envelopes as they appear on the wire.
//!
//! Both envelopes are JSON objects:
//!
//! ```text
//! request:  {"id": "...", "uri": "...", "method": [...], "session_id": "..."}
//! response: {"id": "...", "uri": "...", "result": ..., "errors": {"type", "message", "tb", "stack"}}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::path::InvocationPath;

/// A request to evaluate an invocation path against a remote root object.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Request {
    /// Correlation id. Empty when no response is expected.
    pub id: String,

    /// Root object the path is applied to.
    pub uri: String,

    /// The invocation path.
    pub method: InvocationPath,

    /// Session id, stamped by the transport on send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Request {
    /// Whether the sender waits for a response to this request.
    #[must_use]
    pub fn expects_response(&self) -> bool {
        !self.id.is_empty()
    }
}

/// A response to a [`Request`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Response {
    /// Id of the request this answers.
    #[serde(default)]
    pub id: String,

    /// Set when the result is itself a remote object reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// The result. `Some(Value::Null)` for an explicit `null`, `None` when absent.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,

    /// Set when the remote side failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<RemoteErrors>,

    /// Session id echoed by the remote side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Response {
    /// A successful response carrying a concrete value.
    #[must_use]
    pub fn value(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            ..Self::default()
        }
    }

    /// A successful response referencing another remote object.
    #[must_use]
    pub fn reference(id: impl Into<String>, uri: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            uri: Some(uri.into()),
            result: Some(result),
            ..Self::default()
        }
    }

    /// A failed response.
    #[must_use]
    pub fn failure(id: impl Into<String>, errors: RemoteErrors) -> Self {
        Self {
            id: id.into(),
            errors: Some(errors),
            ..Self::default()
        }
    }

    /// True when the response carries neither errors, a uri nor a result.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_none() && self.uri.is_none() && self.result.is_none()
    }

    /// The intermediate object uri, ignoring empty strings.
    #[must_use]
    pub fn intermediate_uri(&self) -> Option<&str> {
        self.uri.as_deref().filter(|uri| !uri.is_empty())
    }
}

/// Error payload reported by the remote side.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RemoteErrors {
    /// Remote exception type name.
    #[serde(rename = "type")]
    pub error_type: String,

    /// Remote exception message.
    #[serde(default)]
    pub message: String,

    /// Formatted remote traceback.
    #[serde(default)]
    pub tb: String,

    /// Structured remote stack.
    #[serde(default)]
    pub stack: Value,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::path::Invocation;

    #[test]
    fn test_request_wire_shape() {
        let request = Request {
            id: "abc".to_string(),
            uri: "obj://42".to_string(),
            method: InvocationPath::default()
                .with(Invocation::attr("add"))
                .with(Invocation::Call(vec![json!(1), json!(2)])),
            session_id: Some("session".to_string()),
        };

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({
                "id": "abc",
                "uri": "obj://42",
                "method": [["getattr", "add"], ["call", [1, 2]]],
                "session_id": "session",
            })
        );
    }

    #[test]
    fn test_request_without_session_omits_field() {
        let request = Request {
            id: String::new(),
            uri: "obj://1".to_string(),
            method: InvocationPath::default(),
            session_id: None,
        };

        let encoded = serde_json::to_value(&request).unwrap();
        assert!(encoded.get("session_id").is_none());
        assert!(!request.expects_response());
    }

    #[test]
    fn test_explicit_null_result_is_present() {
        let response: Response = serde_json::from_value(json!({"id": "x", "result": null})).unwrap();
        assert_eq!(response.result, Some(Value::Null));
        assert!(!response.is_empty());

        let response: Response = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert_eq!(response.result, None);
        assert!(response.is_empty());
    }

    #[test]
    fn test_remote_errors_shape() {
        let response: Response = serde_json::from_value(json!({
            "id": "x",
            "session_id": "s",
            "errors": {"type": "ValueError", "message": "bad", "tb": "Traceback...", "stack": ["frame"]},
        }))
        .unwrap();

        let errors = response.errors.unwrap();
        assert_eq!(errors.error_type, "ValueError");
        assert_eq!(errors.message, "bad");
        assert_eq!(errors.tb, "Traceback...");
        assert_eq!(errors.stack, json!(["frame"]));
    }

    #[test]
    fn test_empty_intermediate_uri_is_ignored() {
        let response: Response =
            serde_json::from_value(json!({"id": "x", "uri": "", "result": 1})).unwrap();
        assert_eq!(response.intermediate_uri(), None);

        let response = Response::reference("x", "obj://99", json!("ref"));
        assert_eq!(response.intermediate_uri(), Some("obj://99"));
    }
}
