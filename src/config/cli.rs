//! Command-line argument parsing

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "ble-notify-server", version)]
#[clap(about = "BLE GATT peripheral that advertises one service and notifies a single central")]
pub struct CliArgs {
    /// Bluetooth adapter name, e.g. hci0 (default adapter if omitted)
    #[clap(short, long)]
    pub adapter: Option<String>,

    /// Name the adapter advertises
    #[clap(short = 'n', long, default_value = "ble-notify-server")]
    pub device_name: String,

    /// Service UUID to start with; requires --characteristic-uuid
    #[clap(long, requires = "characteristic_uuid")]
    pub service_uuid: Option<String>,

    /// Characteristic UUID to start with; requires --service-uuid
    #[clap(long, requires = "service_uuid")]
    pub characteristic_uuid: Option<String>,

    /// Enable the JSON-RPC control socket
    #[clap(long)]
    pub enable_unix_socket: bool,

    /// Path for Unix socket
    #[clap(long, default_value = "/run/ble-notify-server.sock")]
    pub socket_path: String,

    /// Socket file permissions (octal, e.g., 660)
    #[clap(long, default_value = "660")]
    pub socket_mode: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["ble-notify-server"]).unwrap();
        assert_eq!(args.adapter, None);
        assert_eq!(args.device_name, "ble-notify-server");
        assert!(args.service_uuid.is_none());
        assert!(!args.enable_unix_socket);
        assert_eq!(args.socket_mode, "660");
    }

    #[test]
    fn test_uuids_must_come_in_pairs() {
        let result = CliArgs::try_parse_from([
            "ble-notify-server",
            "--service-uuid",
            "0000180d-0000-1000-8000-00805f9b34fb",
        ]);
        assert!(result.is_err());

        let args = CliArgs::try_parse_from([
            "ble-notify-server",
            "--adapter",
            "hci1",
            "--service-uuid",
            "0000180d-0000-1000-8000-00805f9b34fb",
            "--characteristic-uuid",
            "00002a37-0000-1000-8000-00805f9b34fb",
        ])
        .unwrap();
        assert_eq!(args.adapter.as_deref(), Some("hci1"));
        assert!(args.characteristic_uuid.is_some());
    }
}
