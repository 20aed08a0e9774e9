//! Wire types for the hub owner/client protocol (`spec.md` §4.H, §6).
//!
//! Requests and responses are newline-delimited JSON over a workspace-local
//! Unix socket. `op`/`args` mirror the hub surface of §4.F and the query
//! engine surface of §4.G verbatim — this crate doesn't interpret them, it
//! just carries them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;

/// A request frame. `id` is chosen by the caller and echoed back verbatim
/// so a single connection can have several requests in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcRequest {
    pub op: String,
    #[serde(default)]
    pub args: Value,
    pub id: String,
}

impl IpcRequest {
    pub fn new(op: impl Into<String>, args: Value, id: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            args,
            id: id.into(),
        }
    }
}

/// A response frame. Exactly one of `result`/`error` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IpcError>,
}

impl IpcResponse {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            result: None,
            error: Some(IpcError {
                kind,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcError {
    pub kind: ErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let req = IpcRequest::new("list_repos", serde_json::json!({}), "req-1");
        let line = serde_json::to_string(&req).unwrap();
        let back: IpcRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(back.op, "list_repos");
        assert_eq!(back.id, "req-1");
    }

    #[test]
    fn error_response_carries_kind() {
        let resp = IpcResponse::err("req-1", ErrorKind::ConnectionLost, "owner unreachable");
        let line = serde_json::to_string(&resp).unwrap();
        assert!(line.contains("connection_lost"));
        let back: IpcResponse = serde_json::from_str(&line).unwrap();
        assert!(!back.ok);
        assert_eq!(back.error.unwrap().kind, ErrorKind::ConnectionLost);
    }

    #[test]
    fn ok_response_omits_error_field() {
        let resp = IpcResponse::ok("req-2", serde_json::json!({"repos": []}));
        let line = serde_json::to_string(&resp).unwrap();
        assert!(!line.contains("\"error\""));
    }
}
