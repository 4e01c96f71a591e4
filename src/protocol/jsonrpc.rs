//! JSON-RPC 2.0 message envelope

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    core::error::ServerError,
    protocol::{notification::Notification, request::Request, response::Response},
};

/// Protocol version carried by every message
const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request wrapper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(flatten)]
    pub request: Request,
    pub id: RequestId,
}

/// JSON-RPC 2.0 response wrapper; exactly one of `result` and `error` is set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: RequestId,
}

/// Server-initiated message without an id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    #[serde(flatten)]
    pub notification: Notification,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// JSON-RPC 2.0 error object
///
/// Server failures carry their boundary status in `data.status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const INVALID_PARAMS: i32 = -32602;

    // -32000 minus the boundary status
    pub const ADAPTER_UNAVAILABLE: i32 = -32001;
    pub const REGISTRATION_ERROR: i32 = -32002;
    pub const ADVERTISING_FAILURE: i32 = -32003;
    pub const ALREADY_RUNNING: i32 = -32004;
    pub const NOT_CONNECTED: i32 = -32005;
    pub const PAYLOAD_TOO_LARGE: i32 = -32006;
    pub const STACK_ERROR: i32 = -32007;

    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_REQUEST, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }

    pub fn status(&self) -> Option<i64> {
        self.data.as_ref()?.get("status")?.as_i64()
    }
}

impl From<&ServerError> for JsonRpcError {
    fn from(error: &ServerError) -> Self {
        let code = match error {
            ServerError::AdapterUnavailable(_) => Self::ADAPTER_UNAVAILABLE,
            ServerError::Registration(_) => Self::REGISTRATION_ERROR,
            ServerError::Advertising(_) => Self::ADVERTISING_FAILURE,
            ServerError::AlreadyRunning => Self::ALREADY_RUNNING,
            ServerError::NotConnected => Self::NOT_CONNECTED,
            ServerError::PayloadTooLarge { .. } => Self::PAYLOAD_TOO_LARGE,
            ServerError::Stack(_) => Self::STACK_ERROR,
        };

        Self {
            data: Some(json!({ "status": error.status_code() })),
            ..Self::new(code, error.to_string())
        }
    }
}

impl JsonRpcRequest {
    pub fn new(request: Request, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            request,
            id,
        }
    }
}

impl JsonRpcResponse {
    pub fn success(result: Response, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: JsonRpcError, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

impl JsonRpcNotification {
    pub fn new(notification: Notification) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            notification,
        }
    }
}
