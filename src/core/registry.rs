//! GATT service registry

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    backend::BluetoothStack,
    core::{
        error::{ServerError, ServerResult},
        types::{ServiceDescriptor, ValueBuffer},
    },
};

/// Holds the published service definition and its characteristic value
///
/// UUIDs and properties are fixed once published; only the value changes.
pub struct GattServiceRegistry<S: BluetoothStack> {
    stack: Arc<S>,
    published: RwLock<Option<ServiceDescriptor>>,
    value: ValueBuffer,
}

impl<S: BluetoothStack> GattServiceRegistry<S> {
    pub fn new(stack: Arc<S>) -> Self {
        Self {
            stack,
            published: RwLock::new(None),
            value: ValueBuffer::default(),
        }
    }

    /// Validate `descriptor` and publish it to the stack
    pub async fn publish(&self, descriptor: ServiceDescriptor) -> ServerResult<()> {
        let mut published = self.published.write().await;
        if published.is_some() {
            return Err(ServerError::Registration(
                "A service is already published".into(),
            ));
        }

        Self::validate(&descriptor)?;

        // The registry's buffer is the single source for reads and notifications
        let initial = descriptor.value.snapshot().await;
        self.value.replace(&initial).await;
        let descriptor = ServiceDescriptor {
            value: self.value.clone(),
            ..descriptor
        };

        self.stack
            .register_application(&descriptor)
            .await
            .map_err(|e| ServerError::Registration(e.to_string()))?;

        info!(
            "Published service {} with characteristic {}",
            descriptor.service_uuid, descriptor.characteristic_uuid
        );
        *published = Some(descriptor);
        Ok(())
    }

    fn validate(descriptor: &ServiceDescriptor) -> ServerResult<()> {
        if descriptor.service_uuid.is_nil() || descriptor.characteristic_uuid.is_nil() {
            return Err(ServerError::Registration("Nil UUID is not allowed".into()));
        }
        if descriptor.properties.is_empty() {
            return Err(ServerError::Registration(
                "Characteristic must support read or notify".into(),
            ));
        }
        Ok(())
    }

    /// Remove the service from the stack; a no-op when nothing is published
    pub async fn unpublish(&self) {
        let Some(descriptor) = self.published.write().await.take() else {
            return;
        };

        match self.stack.unregister_application().await {
            Ok(()) => info!("Unpublished service {}", descriptor.service_uuid),
            Err(e) => warn!(
                "Unpublishing service {} failed: {}",
                descriptor.service_uuid, e
            ),
        }
    }

    /// Store the latest value; does not notify the central
    pub async fn update_value(&self, value: &[u8]) {
        debug!("Characteristic value updated ({} bytes)", value.len());
        self.value.replace(value).await;
    }

    /// Current characteristic value
    pub async fn value(&self) -> Vec<u8> {
        self.value.snapshot().await
    }

    /// The shared buffer backing GATT reads
    pub fn value_buffer(&self) -> &ValueBuffer {
        &self.value
    }

    /// Currently published descriptor, if any
    pub async fn descriptor(&self) -> Option<ServiceDescriptor> {
        self.published.read().await.clone()
    }
}
