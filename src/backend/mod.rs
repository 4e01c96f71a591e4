//! Bluetooth stack abstraction layer

pub mod bluez_backend;
pub mod mock_backend;
pub mod stack;

pub use bluez_backend::BluezStack;
pub use mock_backend::{MockStack, StackCall};
pub use stack::BluetoothStack;
