//! The Gateway's four-frame wire model (spec §4.T): `hello`, `hello_ok`,
//! `request`, `response`, `event`. JSON over one `WebSocket` text frame per
//! message, tagged by `kind`.

use meridian_core::WireErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame sent by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Opens the session: negotiates protocol version and authenticates.
    Hello {
        /// Lowest protocol version the client supports.
        min_protocol: u32,
        /// Highest protocol version the client supports.
        max_protocol: u32,
        /// Free-form client identification (name, version, platform).
        client_info: Value,
        /// Opaque auth token or credential, if the server requires one.
        #[serde(default)]
        auth: Option<String>,
    },
    /// A one-shot RPC call, completed by exactly one matching `response`.
    Request {
        /// Client-chosen id, echoed on the matching response.
        id: String,
        /// Method name (e.g. `"sessions.post_message"`).
        method: String,
        /// Method-specific parameters.
        #[serde(default)]
        params: Value,
        /// Session key scoping this request, if applicable.
        #[serde(default)]
        session_key: Option<String>,
    },
}

/// A frame sent by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake acknowledgement: the negotiated version and server state.
    HelloOk {
        /// The negotiated protocol version.
        protocol: u32,
        /// Free-form server identification.
        server_info: Value,
        /// Advertised capability surface.
        features: Features,
        /// Initial state snapshot visible to this principal.
        snapshot: Value,
    },
    /// The terminal reply to one `request`, by `id`.
    Response {
        /// The request id this replies to.
        id: String,
        /// The successful result, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// The error, if the request failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },
    /// An unsolicited, unidirectional notification matching a subscription.
    Event {
        /// The event's stable name (e.g. `"session.message"`).
        name: String,
        /// The event payload.
        data: Value,
    },
}

/// Advertised server capabilities, returned in `hello_ok`.
#[derive(Debug, Clone, Serialize)]
pub struct Features {
    /// Method names the server will dispatch `request` frames to.
    pub methods: Vec<String>,
    /// Event-name glob patterns the server may emit.
    pub events: Vec<String>,
}

/// A coded error attached to a `response` frame.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    /// One of the fixed wire error codes (spec §6).
    pub code: WireErrorCode,
    /// Human-readable detail, safe to show to the connecting client.
    pub message: String,
}

impl ServerFrame {
    /// Build a successful response frame.
    #[must_use]
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        ServerFrame::Response {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response frame from a wire code and message.
    #[must_use]
    pub fn err(id: impl Into<String>, code: WireErrorCode, message: impl Into<String>) -> Self {
        ServerFrame::Response {
            id: id.into(),
            result: None,
            error: Some(WireError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_frame_parses_from_json() {
        let json = r#"{"kind":"hello","min_protocol":1,"max_protocol":2,"client_info":{"name":"cli"}}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Hello { min_protocol, max_protocol, auth, .. } => {
                assert_eq!(min_protocol, 1);
                assert_eq!(max_protocol, 2);
                assert!(auth.is_none());
            }
            ClientFrame::Request { .. } => panic!("expected hello"),
        }
    }

    #[test]
    fn request_frame_parses_with_default_params() {
        let json = r#"{"kind":"request","id":"r1","method":"tools.list"}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Request { id, method, params, session_key } => {
                assert_eq!(id, "r1");
                assert_eq!(method, "tools.list");
                assert_eq!(params, Value::Null);
                assert!(session_key.is_none());
            }
            ClientFrame::Hello { .. } => panic!("expected request"),
        }
    }

    #[test]
    fn error_response_serializes_the_wire_code() {
        let frame = ServerFrame::err("r1", WireErrorCode::MethodNotFound, "no such method");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"kind\":\"response\""));
        assert!(json.contains("\"METHOD_NOT_FOUND\""));
    }

    #[test]
    fn ok_response_omits_the_error_field() {
        let frame = ServerFrame::ok("r1", serde_json::json!({"a": 1}));
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("\"error\""));
    }
}
