//! Protocol message definitions

pub mod jsonrpc;
pub mod notification;
pub mod request;
pub mod response;

pub use {
    jsonrpc::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId},
    notification::{ConnectionStateChangedParams, Notification},
    request::{DataParams, Request, StartServerParams},
    response::{OkResponse, Response, SentResponse, StatusResponse},
};
