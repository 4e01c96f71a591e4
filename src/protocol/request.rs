//! Request message types

use serde::{Deserialize, Serialize};

use crate::transport::ble::uuids::{DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID};

/// Request messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "params")]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// Acquire the adapter, publish the service and advertise
    StartServer(StartServerParams),

    /// Tear the server down
    StopServer,

    /// Send one notification
    Notify(DataParams),

    /// Send data split into notifications of the current payload limit
    SendData(DataParams),

    /// Advertise again after a central disconnected
    RestartAdvertising,

    /// Get configuration and connection state
    GetStatus,
}

/// Parameters for start_server request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartServerParams {
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,

    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: String,
}

fn default_service_uuid() -> String {
    DEFAULT_SERVICE_UUID.to_string()
}

fn default_characteristic_uuid() -> String {
    DEFAULT_CHARACTERISTIC_UUID.to_string()
}

impl Default for StartServerParams {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            characteristic_uuid: default_characteristic_uuid(),
        }
    }
}

/// Parameters for notify and send_data requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataParams {
    /// Payload, hex-encoded
    pub data: String,
}

impl DataParams {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: hex::encode(data),
        }
    }

    /// Decode the hex payload
    pub fn decode(&self) -> Result<Vec<u8>, String> {
        hex::decode(self.data.trim()).map_err(|e| format!("Invalid hex payload: {}", e))
    }
}
