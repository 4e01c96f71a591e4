//! Bluetooth Low Energy transport layer

pub mod adapter;
pub mod gatt;
pub mod session;
pub mod uuids;

pub use {adapter::BleAdapter, gatt::build_application, session::CentralSession, uuids::*};
