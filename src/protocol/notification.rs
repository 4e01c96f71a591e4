//! Notification message types (server-to-client events)

use serde::{Deserialize, Serialize};

use crate::core::types::{CentralRef, ConnectionSnapshot, ConnectionState};

/// Server-to-client notifications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "params")]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    /// Connection state changed
    ConnectionStateChanged(ConnectionStateChangedParams),
}

/// Connection state change notification parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionStateChangedParams {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub central: Option<CentralRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
}

impl ConnectionStateChangedParams {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            central: None,
            mtu: None,
        }
    }
}

impl From<ConnectionSnapshot> for ConnectionStateChangedParams {
    fn from(snapshot: ConnectionSnapshot) -> Self {
        Self {
            state: snapshot.state,
            mtu: snapshot.central.map(|_| snapshot.mtu),
            central: snapshot.central,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ConnectionId, DeviceAddress};

    #[test]
    fn test_connection_state_changed_advertising() {
        let notif = Notification::ConnectionStateChanged(ConnectionStateChangedParams::new(
            ConnectionState::Advertising,
        ));
        let json = serde_json::to_string(&notif).unwrap();
        assert_eq!(
            json,
            r#"{"method":"connection_state_changed","params":{"state":"advertising"}}"#
        );

        let deserialized: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, notif);
    }

    #[test]
    fn test_connection_state_changed_from_snapshot() {
        let central = CentralRef {
            id: ConnectionId(3),
            address: DeviceAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
        };
        let params = ConnectionStateChangedParams::from(ConnectionSnapshot {
            state: ConnectionState::Connected,
            central: Some(central),
            mtu: 247,
            max_payload: 244,
        });
        assert_eq!(params.central, Some(central));
        assert_eq!(params.mtu, Some(247));

        let json = serde_json::to_string(&Notification::ConnectionStateChanged(params)).unwrap();
        assert!(json.contains(r#""state":"connected""#));
        assert!(json.contains(r#""address":"AA:BB:CC:DD:EE:FF""#));
        assert!(json.contains(r#""mtu":247"#));
    }

    #[test]
    fn test_idle_snapshot_omits_central() {
        let params = ConnectionStateChangedParams::from(ConnectionSnapshot {
            state: ConnectionState::Idle,
            central: None,
            mtu: 23,
            max_payload: 20,
        });
        assert_eq!(params, ConnectionStateChangedParams::new(ConnectionState::Idle));
    }
}
