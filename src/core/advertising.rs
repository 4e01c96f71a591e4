//! Advertising controller

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::BluetoothStack,
    core::error::{ServerError, ServerResult},
};

/// Starts and stops advertising of the service UUID
///
/// Local state mirrors the stack: the stack ends advertising on its own when
/// a central connects, and nothing here restarts it implicitly.
pub struct AdvertisingController<S: BluetoothStack> {
    stack: Arc<S>,
    active: Mutex<Option<Uuid>>,
}

impl<S: BluetoothStack> AdvertisingController<S> {
    pub fn new(stack: Arc<S>) -> Self {
        Self {
            stack,
            active: Mutex::new(None),
        }
    }

    /// Begin advertising `service_uuid`
    pub async fn start(&self, service_uuid: Uuid) -> ServerResult<()> {
        let mut active = self.active.lock().await;
        if let Some(current) = *active {
            return Err(ServerError::Advertising(format!(
                "Already advertising {}",
                current
            )));
        }

        self.stack
            .start_advertising(service_uuid)
            .await
            .map_err(|e| ServerError::Advertising(e.to_string()))?;

        info!("Advertising service {}", service_uuid);
        *active = Some(service_uuid);
        Ok(())
    }

    /// Stop advertising; a no-op when not advertising
    pub async fn stop(&self) {
        let Some(service_uuid) = self.active.lock().await.take() else {
            return;
        };

        match self.stack.stop_advertising().await {
            Ok(()) => info!("Stopped advertising service {}", service_uuid),
            Err(e) => warn!("Stopping advertisement failed: {}", e),
        }
    }

    /// Record that the stack ended advertising because a central connected
    pub async fn mark_stopped_by_connection(&self) {
        if let Some(service_uuid) = self.active.lock().await.take() {
            debug!("Advertising of {} ended by connection", service_uuid);
        }
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockStack, StackCall};

    const SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

    #[tokio::test]
    async fn test_start_and_stop() {
        let stack = Arc::new(MockStack::new());
        let controller = AdvertisingController::new(stack.clone());

        controller.start(SERVICE).await.unwrap();
        assert!(controller.is_active().await);
        assert!(stack.is_advertising());

        controller.stop().await;
        assert!(!controller.is_active().await);
        assert!(!stack.is_advertising());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let stack = Arc::new(MockStack::new());
        let controller = AdvertisingController::new(stack.clone());

        controller.start(SERVICE).await.unwrap();
        assert!(matches!(
            controller.start(SERVICE).await,
            Err(ServerError::Advertising(_))
        ));

        // Second attempt never reached the stack
        let starts = stack
            .calls()
            .into_iter()
            .filter(|c| matches!(c, StackCall::StartAdvertising(_)))
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn test_stack_failure() {
        let stack = Arc::new(MockStack::new());
        stack.set_advertising_failure(true);
        let controller = AdvertisingController::new(stack);

        assert!(matches!(
            controller.start(SERVICE).await,
            Err(ServerError::Advertising(_))
        ));
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let stack = Arc::new(MockStack::new());
        let controller = AdvertisingController::new(stack.clone());

        controller.stop().await;
        controller.start(SERVICE).await.unwrap();
        controller.stop().await;
        controller.stop().await;

        let stops = stack
            .calls()
            .into_iter()
            .filter(|c| *c == StackCall::StopAdvertising)
            .count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn test_connection_ends_advertising_without_stack_call() {
        let stack = Arc::new(MockStack::new());
        let controller = AdvertisingController::new(stack.clone());

        controller.start(SERVICE).await.unwrap();
        controller.mark_stopped_by_connection().await;
        assert!(!controller.is_active().await);

        // Nothing left to stop
        controller.stop().await;
        assert!(!stack.calls().contains(&StackCall::StopAdvertising));
    }
}
