//! Error types for the BLE notification server

use thiserror::Error;

/// Result type for Bluetooth stack operations
pub type StackResult<T> = Result<T, StackError>;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Opaque failure reported by the platform Bluetooth stack
///
/// `code` preserves the originating stack error kind (e.g. the BlueZ
/// D-Bus error name) for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct StackError {
    pub code: String,
    pub message: String,
}

impl StackError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<bluer::Error> for StackError {
    fn from(err: bluer::Error) -> Self {
        Self {
            code: format!("{:?}", err.kind),
            message: err.message,
        }
    }
}

/// Errors surfaced by the server to its callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("GATT registration rejected: {0}")]
    Registration(String),

    #[error("Advertising failure: {0}")]
    Advertising(String),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("No central connected")]
    NotConnected,

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Bluetooth stack error: {0}")]
    Stack(#[from] StackError),
}

impl ServerError {
    pub const ADAPTER_UNAVAILABLE: i32 = -1;
    pub const REGISTRATION_ERROR: i32 = -2;
    pub const ADVERTISING_FAILURE: i32 = -3;
    pub const ALREADY_RUNNING: i32 = -4;
    pub const NOT_CONNECTED: i32 = -5;
    pub const PAYLOAD_TOO_LARGE: i32 = -6;
    pub const STACK_ERROR: i32 = -7;

    /// Negative status code reported across the caller boundary
    pub fn status_code(&self) -> i32 {
        match self {
            ServerError::AdapterUnavailable(_) => Self::ADAPTER_UNAVAILABLE,
            ServerError::Registration(_) => Self::REGISTRATION_ERROR,
            ServerError::Advertising(_) => Self::ADVERTISING_FAILURE,
            ServerError::AlreadyRunning => Self::ALREADY_RUNNING,
            ServerError::NotConnected => Self::NOT_CONNECTED,
            ServerError::PayloadTooLarge { .. } => Self::PAYLOAD_TOO_LARGE,
            ServerError::Stack(_) => Self::STACK_ERROR,
        }
    }
}
