//! Blocking server context for embedding callers

use std::sync::{Arc, Mutex};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::{
    backend::{BluetoothStack, BluezStack},
    core::{
        error::{ServerError, ServerResult},
        server::PeripheralServer,
        types::{ConnectionState, ServerStatus},
    },
    transport::ble::uuids::{DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID},
};

/// Status returned by every boundary call on success
pub const STATUS_OK: i32 = 0;

fn status<T>(result: ServerResult<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => {
            debug!("Boundary call failed: {}", e);
            e.status_code()
        }
    }
}

/// UUIDs used by [`BridgeContext::send_text`] when it starts the server
#[derive(Debug, Clone, PartialEq, Eq)]
struct UuidConfig {
    service_uuid: String,
    characteristic_uuid: String,
}

impl Default for UuidConfig {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID.to_string(),
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID.to_string(),
        }
    }
}

/// Owned server context behind the blocking boundary
///
/// Every call blocks the calling thread until the server has answered and
/// reports the outcome as an integer status: `0` on success, the negative
/// [`ServerError::status_code`] otherwise. Payload slices are only borrowed
/// for the duration of a call. Dropping the context stops the server.
///
/// Must not be used from inside an async runtime.
pub struct BridgeContext<S: BluetoothStack> {
    runtime: Runtime,
    server: Arc<PeripheralServer<S>>,
    config: Mutex<UuidConfig>,
}

impl BridgeContext<BluezStack> {
    /// Context on top of BlueZ, using adapter `adapter_name` or the default one
    pub fn bluez(adapter_name: Option<String>, device_name: String) -> std::io::Result<Self> {
        Self::new(BluezStack::new(adapter_name, device_name))
    }
}

impl<S: BluetoothStack> BridgeContext<S> {
    /// Create a context with its own runtime on top of `stack`
    pub fn new(stack: S) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("ble-notify-server")
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            server: Arc::new(PeripheralServer::new(Arc::new(stack))),
            config: Mutex::new(UuidConfig::default()),
        })
    }

    /// The server driven by this context
    pub fn server(&self) -> &Arc<PeripheralServer<S>> {
        &self.server
    }

    pub fn start_server(&self, service_uuid: &str, characteristic_uuid: &str) -> i32 {
        status(
            self.runtime
                .block_on(self.server.start(service_uuid, characteristic_uuid)),
        )
    }

    pub fn stop_server(&self) {
        self.runtime.block_on(self.server.stop());
    }

    /// Send `payload` as exactly one notification
    pub fn notify(&self, payload: &[u8]) -> i32 {
        status(self.runtime.block_on(self.server.notify(payload)))
    }

    /// Send `data` in notifications of at most the current payload limit
    pub fn send_data(&self, data: &[u8]) -> i32 {
        status(self.runtime.block_on(self.server.send_data(data)))
    }

    /// Set the UUIDs [`send_text`](Self::send_text) starts the server with
    ///
    /// Blank values keep the current setting. Fails with `AlreadyRunning`
    /// once the server is started.
    pub fn configure(&self, service_uuid: &str, characteristic_uuid: &str) -> i32 {
        if self.runtime.block_on(self.server.is_running()) {
            return ServerError::AlreadyRunning.status_code();
        }

        let mut config = self.config.lock().unwrap_or_else(|e| e.into_inner());
        if !service_uuid.trim().is_empty() {
            config.service_uuid = service_uuid.trim().to_string();
        }
        if !characteristic_uuid.trim().is_empty() {
            config.characteristic_uuid = characteristic_uuid.trim().to_string();
        }

        info!(
            "Configured service {} with characteristic {}",
            config.service_uuid, config.characteristic_uuid
        );
        STATUS_OK
    }

    /// Send `text` as UTF-8, starting the server with the configured UUIDs first
    pub fn send_text(&self, text: &str) -> i32 {
        if !self.runtime.block_on(self.server.is_running()) {
            let config = self
                .config
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();

            let code = self.start_server(&config.service_uuid, &config.characteristic_uuid);
            if code != STATUS_OK {
                warn!("Server start on send failed with status {}", code);
                return code;
            }
        }

        self.send_data(text.as_bytes())
    }

    pub fn status(&self) -> ServerStatus {
        self.runtime.block_on(self.server.status())
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.server.subscribe().borrow()
    }
}

impl<S: BluetoothStack> Drop for BridgeContext<S> {
    fn drop(&mut self) {
        self.runtime.block_on(self.server.stop());
    }
}
