//! Domain types for the BLE notification server

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::{RwLock, RwLockWriteGuard};
use uuid::Uuid;

use crate::core::error::{ServerError, ServerResult};

/// Default ATT MTU before any exchange
pub const DEFAULT_ATT_MTU: u16 = 23;

/// Largest ATT MTU allowed by Bluetooth Core
pub const MAX_ATT_MTU: u16 = 517;

/// ATT opcode plus attribute handle carried by every notification
pub const NOTIFICATION_OVERHEAD: usize = 3;

/// Connection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Advertising = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl TryFrom<u8> for ConnectionState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0 => Ok(ConnectionState::Idle),
            1 => Ok(ConnectionState::Advertising),
            2 => Ok(ConnectionState::Connected),
            3 => Ok(ConnectionState::Disconnecting),
            _ => Err(()),
        }
    }
}

impl From<ConnectionState> for u8 {
    fn from(state: ConnectionState) -> Self {
        state as u8
    }
}

/// Identifier the stack assigns to one central connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceAddress(pub [u8; 6]);

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for DeviceAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(format!("Invalid device address: {}", s));
        }

        let mut bytes = [0u8; 6];
        for (byte, part) in bytes.iter_mut().zip(parts) {
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| format!("Invalid device address {}: {}", s, e))?;
        }

        Ok(Self(bytes))
    }
}

impl From<bluer::Address> for DeviceAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Weak reference to the connected central
///
/// Only ever handed out while the connection state is `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralRef {
    pub id: ConnectionId,
    pub address: DeviceAddress,
}

/// Owner token for the local controller, created by the stack on acquisition
#[derive(Debug, PartialEq, Eq)]
pub struct AdapterHandle {
    name: String,
    address: DeviceAddress,
}

impl AdapterHandle {
    pub fn new(name: impl Into<String>, address: DeviceAddress) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }
}

/// Supported characteristic properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub notify: bool,
}

impl CharacteristicProperties {
    pub const READ_NOTIFY: Self = Self {
        read: true,
        notify: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.read && !self.notify
    }
}

impl Default for CharacteristicProperties {
    fn default() -> Self {
        Self::READ_NOTIFY
    }
}

/// Shared characteristic value, read by the stack on GATT read requests
#[derive(Debug, Clone, Default)]
pub struct ValueBuffer(Arc<RwLock<Vec<u8>>>);

impl ValueBuffer {
    pub fn new(initial: Vec<u8>) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    /// Copy of the current value
    pub async fn snapshot(&self) -> Vec<u8> {
        self.0.read().await.clone()
    }

    /// Replace the current value
    pub async fn replace(&self, value: &[u8]) {
        let mut buffer = self.0.write().await;
        buffer.clear();
        buffer.extend_from_slice(value);
    }

    /// Exclusive access; readers block until the guard is dropped
    pub async fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.0.write().await
    }
}

/// Definition of the single advertised service and its characteristic
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub value: ValueBuffer,
}

impl ServiceDescriptor {
    pub fn new(service_uuid: Uuid, characteristic_uuid: Uuid) -> Self {
        Self {
            service_uuid,
            characteristic_uuid,
            properties: CharacteristicProperties::default(),
            value: ValueBuffer::default(),
        }
    }
}

/// A single payload to deliver; borrowed for the duration of the call only
#[derive(Debug, Clone, Copy)]
pub struct NotificationRequest<'a> {
    pub payload: &'a [u8],
}

impl<'a> NotificationRequest<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { payload }
    }
}

/// Asynchronous events delivered by the stack binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    /// A central connected and subscribed
    Connected { central: CentralRef, mtu: u16 },
    /// The central went away
    Disconnected { id: ConnectionId },
    /// The ATT MTU was renegotiated
    MtuChanged { id: ConnectionId, mtu: u16 },
    /// The controller disappeared or was powered off underneath us
    AdapterLost { reason: String },
}

/// Consistent view of the connection state and its central
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub central: Option<CentralRef>,
    pub mtu: u16,
    /// Largest payload one notification may carry at `mtu`
    pub max_payload: usize,
}

impl ConnectionSnapshot {
    pub fn payload_limit(&self) -> usize {
        self.max_payload
    }
}

/// Server configuration and state as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub running: bool,
    pub service_uuid: Option<Uuid>,
    pub characteristic_uuid: Option<Uuid>,
    #[serde(flatten)]
    pub connection: ConnectionSnapshot,
}

/// Largest notification payload for a given ATT MTU
///
/// `overhead` is what the stack spends per notification, at least
/// [`NOTIFICATION_OVERHEAD`].
pub fn payload_limit(mtu: u16, overhead: usize) -> usize {
    (mtu as usize).saturating_sub(overhead)
}

/// Clamp a reported MTU into the range the ATT protocol allows
pub fn clamp_mtu(mtu: u16) -> u16 {
    mtu.clamp(DEFAULT_ATT_MTU, MAX_ATT_MTU)
}

/// Parse a 128-bit UUID in its hyphenated text form
///
/// Only the canonical 8-4-4-4-12 layout is accepted (either case); the
/// simple, braced and URN forms are rejected, as is the nil UUID.
pub fn parse_uuid(text: &str) -> ServerResult<Uuid> {
    let text = text.trim();
    let well_formed = text.len() == 36
        && text.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        });

    if !well_formed {
        return Err(ServerError::Registration(format!(
            "Malformed UUID: {:?}",
            text
        )));
    }

    let uuid = Uuid::try_parse(text)
        .map_err(|e| ServerError::Registration(format!("Malformed UUID {:?}: {}", text, e)))?;

    if uuid.is_nil() {
        return Err(ServerError::Registration("Nil UUID is not allowed".into()));
    }

    Ok(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid_valid() {
        let uuid = parse_uuid("0000180d-0000-1000-8000-00805f9b34fb").unwrap();
        assert_eq!(uuid.to_string(), "0000180d-0000-1000-8000-00805f9b34fb");

        let upper = parse_uuid("0000180D-0000-1000-8000-00805F9B34FB").unwrap();
        assert_eq!(upper, uuid);

        let padded = parse_uuid("  0000180d-0000-1000-8000-00805f9b34fb\n").unwrap();
        assert_eq!(padded, uuid);
    }

    #[test]
    fn test_parse_uuid_rejects_malformed() {
        let inputs = [
            "",
            "INVALID-UUID",
            "180d",
            "0000180d00001000800000805f9b34fb",
            "{0000180d-0000-1000-8000-00805f9b34fb}",
            "urn:uuid:0000180d-0000-1000-8000-00805f9b34fb",
            "0000180d-0000-1000-8000-00805f9b34f",
            "0000180d-0000-1000-8000-00805f9b34fbb",
            "0000180g-0000-1000-8000-00805f9b34fb",
            "0000180d_0000-1000-8000-00805f9b34fb",
            "00000000-0000-0000-0000-000000000000",
            "0000180d-0000-1000-8000-00805f9b34€",
        ];

        for input in inputs {
            let result = parse_uuid(input);
            assert!(
                matches!(result, Err(ServerError::Registration(_))),
                "expected rejection for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_connection_state_u8_conversion() {
        for state in [
            ConnectionState::Idle,
            ConnectionState::Advertising,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
        ] {
            assert_eq!(ConnectionState::try_from(u8::from(state)), Ok(state));
        }
        assert!(ConnectionState::try_from(4).is_err());
    }

    #[test]
    fn test_connection_state_serialization() {
        let json = serde_json::to_string(&ConnectionState::Advertising).unwrap();
        assert_eq!(json, r#""advertising""#);
    }

    #[test]
    fn test_device_address_display_and_parse() {
        let addr = DeviceAddress([0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03]);
        assert_eq!(addr.to_string(), "AA:BB:CC:01:02:03");
        assert_eq!("aa:bb:cc:01:02:03".parse::<DeviceAddress>(), Ok(addr));
        assert!("aa:bb:cc".parse::<DeviceAddress>().is_err());
        assert!("zz:bb:cc:01:02:03".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_central_ref_serialization() {
        let central = CentralRef {
            id: ConnectionId(7),
            address: DeviceAddress([1, 2, 3, 4, 5, 6]),
        };
        let json = serde_json::to_string(&central).unwrap();
        assert_eq!(json, r#"{"id":7,"address":"01:02:03:04:05:06"}"#);

        let back: CentralRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, central);
    }

    #[test]
    fn test_payload_limit() {
        assert_eq!(payload_limit(DEFAULT_ATT_MTU, NOTIFICATION_OVERHEAD), 20);
        assert_eq!(payload_limit(MAX_ATT_MTU, NOTIFICATION_OVERHEAD), 514);
        assert_eq!(payload_limit(DEFAULT_ATT_MTU, 5), 18);
        assert_eq!(payload_limit(0, NOTIFICATION_OVERHEAD), 0);
    }

    #[test]
    fn test_clamp_mtu() {
        assert_eq!(clamp_mtu(0), DEFAULT_ATT_MTU);
        assert_eq!(clamp_mtu(185), 185);
        assert_eq!(clamp_mtu(u16::MAX), MAX_ATT_MTU);
    }

    #[tokio::test]
    async fn test_value_buffer_replace() {
        let buffer = ValueBuffer::new(vec![1, 2, 3]);
        let shared = buffer.clone();

        buffer.replace(&[9]).await;
        assert_eq!(shared.snapshot().await, vec![9]);
    }
}
