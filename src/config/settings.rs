//! Runtime settings

use crate::config::CliArgs;

/// Service and characteristic the daemon starts with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoStart {
    pub service_uuid: String,
    pub characteristic_uuid: String,
}

/// Runtime configuration settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub adapter: Option<String>,
    pub device_name: String,
    pub autostart: Option<AutoStart>,
    pub enable_unix_socket: bool,
    pub socket_path: String,
    pub socket_mode: u32,
}

impl From<CliArgs> for Settings {
    fn from(args: CliArgs) -> Self {
        // Parse octal socket mode
        let socket_mode = u32::from_str_radix(&args.socket_mode, 8).unwrap_or(0o660);

        let autostart = match (args.service_uuid, args.characteristic_uuid) {
            (Some(service_uuid), Some(characteristic_uuid)) => Some(AutoStart {
                service_uuid,
                characteristic_uuid,
            }),
            _ => None,
        };

        Settings {
            adapter: args.adapter,
            device_name: args.device_name,
            autostart,
            enable_unix_socket: args.enable_unix_socket,
            socket_path: args.socket_path,
            socket_mode,
        }
    }
}
