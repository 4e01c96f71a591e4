//! Blocking boundary for callers outside the async runtime

pub mod context;

pub use context::{BridgeContext, STATUS_OK};
