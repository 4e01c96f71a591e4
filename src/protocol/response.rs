//! Response message types

use serde::{Deserialize, Serialize};

use crate::core::types::ServerStatus;

/// Response messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Response {
    /// Status response
    Status(StatusResponse),

    /// Bytes delivered by notify or send_data
    Sent(SentResponse),

    /// Plain acknowledgement
    Ok(OkResponse),
}

/// Acknowledgement for start_server, stop_server and restart_advertising
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OkResponse {
    pub status: String,
}

/// Response for notify and send_data requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentResponse {
    pub status: String,
    pub bytes: usize,
}

/// Response for get_status request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
    #[serde(flatten)]
    pub server: ServerStatus,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

impl SentResponse {
    pub fn ok(bytes: usize) -> Self {
        Self {
            status: "ok".to_string(),
            bytes,
        }
    }
}

impl StatusResponse {
    pub fn ok(server: ServerStatus) -> Self {
        Self {
            status: "ok".to_string(),
            server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        CentralRef, ConnectionId, ConnectionSnapshot, ConnectionState, DeviceAddress,
    };
    use uuid::Uuid;

    #[test]
    fn test_ok_response() {
        let response = OkResponse::ok();
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);
    }

    #[test]
    fn test_sent_response() {
        let response = Response::Sent(SentResponse::ok(20));
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"status":"ok","bytes":20}"#);

        let deserialized: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, response);
    }

    #[test]
    fn test_status_response() {
        let server = ServerStatus {
            running: true,
            service_uuid: Some(Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb)),
            characteristic_uuid: Some(Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb)),
            connection: ConnectionSnapshot {
                state: ConnectionState::Connected,
                central: Some(CentralRef {
                    id: ConnectionId(1),
                    address: DeviceAddress([0x5c, 0xf3, 0x70, 0x8a, 0x12, 0x01]),
                }),
                mtu: 185,
                max_payload: 182,
            },
        };

        let response = Response::Status(StatusResponse::ok(server));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""status":"ok""#));
        assert!(json.contains(r#""running":true"#));
        assert!(json.contains(r#""state":"connected""#));
        assert!(json.contains(r#""address":"5C:F3:70:8A:12:01""#));
        assert!(json.contains(r#""mtu":185"#));

        let deserialized: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, response);
    }

    #[test]
    fn test_untagged_falls_back_to_ok() {
        let deserialized: Response = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert_eq!(deserialized, Response::Ok(OkResponse::ok()));
    }
}
