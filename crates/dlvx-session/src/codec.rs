//! JSON-RPC 1.0 codec for the debugger backend.
//!
//! Every message is a single JSON object terminated by a newline.
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::DlvError;

/// Global request ID counter.
static NEXT_REQUEST_ID: AtomicI64 = AtomicI64::new(1);

/// Generate the next unique request ID.
pub fn next_request_id() -> i64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// A message received from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// Reply to one of our requests.
    Response {
        /// ID of the request this answers.
        id: i64,
        /// The result value (`null` is a valid result).
        result: serde_json::Value,
        /// Error text, when the backend refused the request.
        error: Option<String>,
    },
    /// Server-pushed message that answers no request.
    Notification {
        /// The method name.
        method: String,
        /// First element of the params array, or `null`.
        params: serde_json::Value,
    },
}

/// Encode a request as one newline-terminated line.
pub fn encode_request(id: i64, method: &str, params: serde_json::Value) -> Vec<u8> {
    let mut bytes = serde_json::json!({
        "method": method,
        "params": params,
        "id": id
    })
    .to_string()
    .into_bytes();
    bytes.push(b'\n');
    bytes
}

/// Encode a response line. The backend side of the protocol; used by
/// in-process fakes.
pub fn encode_response(id: i64, result: Result<serde_json::Value, String>) -> Vec<u8> {
    let value = match result {
        Ok(result) => serde_json::json!({"id": id, "result": result, "error": null}),
        Err(error) => serde_json::json!({"id": id, "result": null, "error": error}),
    };
    let mut bytes = value.to_string().into_bytes();
    bytes.push(b'\n');
    bytes
}

/// Encode a server-pushed notification line.
pub fn encode_notification(method: &str, params: serde_json::Value) -> Vec<u8> {
    let mut bytes = serde_json::json!({
        "method": method,
        "params": [params],
        "id": null
    })
    .to_string()
    .into_bytes();
    bytes.push(b'\n');
    bytes
}

/// Parse one line received from the backend.
pub fn parse_message(line: &str) -> Result<RpcMessage, DlvError> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| DlvError::Serialization(format!("invalid JSON: {}", e)))?;

    let id = value.get("id").filter(|id| !id.is_null());
    let method = value.get("method").and_then(|m| m.as_str());

    match (id, method) {
        (Some(id), None) => {
            let id = id
                .as_i64()
                .ok_or_else(|| DlvError::InvalidResponse("id must be integer".into()))?;
            let result = value
                .get("result")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let error = match value.get("error") {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            };
            Ok(RpcMessage::Response { id, result, error })
        }
        (None, Some(method)) => {
            let params = match value.get("params") {
                Some(serde_json::Value::Array(items)) => {
                    items.first().cloned().unwrap_or(serde_json::Value::Null)
                }
                Some(other) => other.clone(),
                None => serde_json::Value::Null,
            };
            Ok(RpcMessage::Notification {
                method: method.to_string(),
                params,
            })
        }
        (Some(_), Some(method)) => Err(DlvError::InvalidResponse(format!(
            "unexpected request from backend: {}",
            method
        ))),
        (None, None) => Err(DlvError::InvalidResponse(
            "message has neither id nor method".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_increase() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(b > a);
    }

    #[test]
    fn encode_request_is_single_line() {
        let bytes = encode_request(5, "RPCServer.Command", serde_json::json!([{"name": "next"}]));
        assert_eq!(bytes.last(), Some(&b'\n'));
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text.matches('\n').count(), 1);

        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["id"], 5);
        assert_eq!(value["method"], "RPCServer.Command");
        assert_eq!(value["params"][0]["name"], "next");
    }

    #[test]
    fn parse_success_response() {
        let msg = parse_message(r#"{"id":3,"result":{"id":7},"error":null}"#).unwrap();
        assert_eq!(
            msg,
            RpcMessage::Response {
                id: 3,
                result: serde_json::json!({"id": 7}),
                error: None,
            }
        );
    }

    #[test]
    fn parse_error_response() {
        let msg = parse_message(r#"{"id":4,"result":null,"error":"invalid location"}"#).unwrap();
        match msg {
            RpcMessage::Response { id, error, .. } => {
                assert_eq!(id, 4);
                assert_eq!(error.as_deref(), Some("invalid location"));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn parse_response_with_missing_result() {
        let msg = parse_message(r#"{"id":9}"#).unwrap();
        match msg {
            RpcMessage::Response { result, error, .. } => {
                assert!(result.is_null());
                assert!(error.is_none());
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn parse_notification_unwraps_params() {
        let line = encode_notification("State", serde_json::json!({"exited": true}));
        let text = std::str::from_utf8(&line).unwrap().trim_end();
        let msg = parse_message(text).unwrap();
        assert_eq!(
            msg,
            RpcMessage::Notification {
                method: "State".into(),
                params: serde_json::json!({"exited": true}),
            }
        );
    }

    #[test]
    fn encode_response_roundtrips_through_parser() {
        let line = encode_response(11, Err("boom".into()));
        let text = std::str::from_utf8(&line).unwrap().trim_end();
        match parse_message(text).unwrap() {
            RpcMessage::Response { id, error, .. } => {
                assert_eq!(id, 11);
                assert_eq!(error.as_deref(), Some("boom"));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn parse_invalid_json() {
        let err = parse_message("{not json").unwrap_err();
        assert!(matches!(err, DlvError::Serialization(_)));
    }

    #[test]
    fn parse_message_without_id_or_method() {
        let err = parse_message(r#"{"result": 1}"#).unwrap_err();
        assert!(err.to_string().contains("neither id nor method"), "got: {err}");
    }

    #[test]
    fn parse_rejects_server_request() {
        let err = parse_message(r#"{"id":1,"method":"Foo","params":[]}"#).unwrap_err();
        assert!(matches!(err, DlvError::InvalidResponse(_)));
    }
}
