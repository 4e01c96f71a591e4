//! BLE Notify Server
//!
//! A BLE GATT peripheral that publishes one service with a single
//! read/notify characteristic, advertises it, accepts one central and
//! delivers notifications to it. Driven through:
//! - the async [`PeripheralServer`] facade
//! - a blocking boundary returning integer status codes
//! - Unix Domain Sockets (JSON-RPC 2.0)

pub mod backend;
pub mod config;
pub mod core;
pub mod protocol;
pub mod transport;

pub use core::{
    error::{ServerError, StackError},
    server::PeripheralServer,
    types::{ConnectionState, ServerStatus},
};
