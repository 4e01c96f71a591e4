//! Well-known BLE GATT UUIDs

use uuid::Uuid;

/// Bluetooth SIG base UUID, `0000xxxx-0000-1000-8000-00805f9b34fb`
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit SIG assigned number into its 128-bit UUID
pub const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Heart Rate service, served when nothing else is configured
pub const DEFAULT_SERVICE_UUID: Uuid = sig_uuid(0x180d);

/// Heart Rate Measurement characteristic
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid = sig_uuid(0x2a37);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            DEFAULT_SERVICE_UUID.to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            DEFAULT_CHARACTERISTIC_UUID.to_string(),
            "00002a37-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_sig_uuid_expansion() {
        assert_eq!(
            sig_uuid(0x180f).to_string(),
            "0000180f-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(sig_uuid(0), Uuid::from_u128(BLUETOOTH_BASE_UUID));
        assert_ne!(DEFAULT_SERVICE_UUID, DEFAULT_CHARACTERISTIC_UUID);
    }
}
