//! Transport layers

pub mod ble;
pub mod bridge;
pub mod unix_socket;
