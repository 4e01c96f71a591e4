//! Ownership of the local Bluetooth controller

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc::UnboundedSender};
use tracing::{info, warn};

use crate::{
    backend::BluetoothStack,
    core::{
        error::{ServerError, ServerResult},
        types::{AdapterHandle, StackEvent},
    },
};

/// Holds the single adapter handle for the lifetime of a server run
pub struct AdapterBinding<S: BluetoothStack> {
    stack: Arc<S>,
    handle: Mutex<Option<AdapterHandle>>,
}

impl<S: BluetoothStack> AdapterBinding<S> {
    pub fn new(stack: Arc<S>) -> Self {
        Self {
            stack,
            handle: Mutex::new(None),
        }
    }

    /// Acquire the controller; stack events are forwarded to `events`
    pub async fn acquire(&self, events: UnboundedSender<StackEvent>) -> ServerResult<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Err(ServerError::AdapterUnavailable(
                "Adapter already owned by this server".into(),
            ));
        }

        let acquired = self
            .stack
            .acquire_adapter(events)
            .await
            .map_err(|e| ServerError::AdapterUnavailable(e.to_string()))?;

        info!(
            "Acquired Bluetooth adapter {} ({})",
            acquired.name(),
            acquired.address()
        );
        *handle = Some(acquired);
        Ok(())
    }

    /// Release the controller; a no-op when nothing is held
    pub async fn release(&self) {
        let Some(handle) = self.handle.lock().await.take() else {
            return;
        };

        let name = handle.name().to_string();
        match self.stack.release_adapter(handle).await {
            Ok(()) => info!("Released Bluetooth adapter {}", name),
            Err(e) => warn!("Releasing adapter {} failed: {}", name, e),
        }
    }

    pub async fn is_acquired(&self) -> bool {
        self.handle.lock().await.is_some()
    }
}
