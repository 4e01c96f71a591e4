//! Core peripheral server logic

pub mod adapter;
pub mod advertising;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod server;
pub mod types;
