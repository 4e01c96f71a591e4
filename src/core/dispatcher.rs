//! Notification delivery to the connected central

use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    backend::BluetoothStack,
    core::{
        connection::ConnectionManager,
        error::{ServerError, ServerResult},
        registry::GattServiceRegistry,
        types::NotificationRequest,
    },
};

/// Number of payload bytes included in debug logs
const LOG_PREVIEW_LEN: usize = 10;

/// Delivers application payloads as GATT notifications
pub struct NotificationDispatcher<S: BluetoothStack> {
    stack: Arc<S>,
    connection: Arc<ConnectionManager>,
    registry: Arc<GattServiceRegistry<S>>,
}

impl<S: BluetoothStack> NotificationDispatcher<S> {
    pub fn new(
        stack: Arc<S>,
        connection: Arc<ConnectionManager>,
        registry: Arc<GattServiceRegistry<S>>,
    ) -> Self {
        Self {
            stack,
            connection,
            registry,
        }
    }

    /// Send `request` as exactly one notification
    ///
    /// The connection lock is held until the stack has queued the payload, so
    /// a concurrent disconnect or stop waits for this call to finish. The
    /// characteristic value is replaced under its write lock only once the
    /// stack accepted the payload; readers see either the old or the new
    /// value, never a partial one.
    pub async fn dispatch(&self, request: NotificationRequest<'_>) -> ServerResult<usize> {
        let payload = request.payload;
        let connection = self.connection.lock().await;

        let Some(central) = connection.central() else {
            debug!("Dropping notification: no central connected");
            return Err(ServerError::NotConnected);
        };

        let limit = connection.payload_limit();
        if payload.len() > limit {
            warn!(
                "Rejecting {}-byte notification, limit is {} bytes",
                payload.len(),
                limit
            );
            return Err(ServerError::PayloadTooLarge {
                size: payload.len(),
                limit,
            });
        }

        let mut value = self.registry.value_buffer().write().await;
        self.stack.notify(central, payload).await.map_err(|e| {
            warn!("Notification to {} failed: {}", central.address, e);
            ServerError::Stack(e)
        })?;

        value.clear();
        value.extend_from_slice(payload);

        debug!(
            "Notified {} with {} bytes: {}",
            central.address,
            payload.len(),
            hex::encode(&payload[..payload.len().min(LOG_PREVIEW_LEN)])
        );
        Ok(payload.len())
    }

    /// Send `payload` as exactly one notification
    pub async fn notify(&self, payload: &[u8]) -> ServerResult<usize> {
        self.dispatch(NotificationRequest::new(payload)).await
    }
}
