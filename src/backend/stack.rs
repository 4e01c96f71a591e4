//! Bluetooth stack trait definition

use tokio::sync::mpsc::UnboundedSender;
use trait_variant::make;
use uuid::Uuid;

use crate::core::error::StackResult;
use crate::core::types::{
    AdapterHandle, CentralRef, NOTIFICATION_OVERHEAD, ServiceDescriptor, StackEvent,
};

/// Abstraction over the platform Bluetooth stack (typically BlueZ)
///
/// This trait enables testing by allowing mock implementations
/// while providing a standard interface for the peripheral role.
/// Connection lifecycle is reported asynchronously through the event
/// sender handed over in [`BluetoothStack::acquire_adapter`].
#[make(Send)]
pub trait BluetoothStack: Send + Sync + 'static {
    /// Take ownership of the local controller
    ///
    /// Powers the adapter and makes it discoverable. From now on the stack
    /// pushes connect, disconnect, MTU and adapter-loss events into `events`.
    async fn acquire_adapter(
        &self,
        events: UnboundedSender<StackEvent>,
    ) -> StackResult<AdapterHandle>;

    /// Give the controller back
    async fn release_adapter(&self, handle: AdapterHandle) -> StackResult<()>;

    /// Publish the GATT application described by `descriptor`
    ///
    /// Read requests are answered from `descriptor.value`.
    async fn register_application(&self, descriptor: &ServiceDescriptor) -> StackResult<()>;

    /// Remove the GATT application; drops any notification session
    async fn unregister_application(&self) -> StackResult<()>;

    /// Begin connectable advertising of `service_uuid`
    async fn start_advertising(&self, service_uuid: Uuid) -> StackResult<()>;

    /// Stop advertising
    async fn stop_advertising(&self) -> StackResult<()>;

    /// Drop the notification session of `central`
    ///
    /// Used for centrals the server refuses; no `Disconnected` event follows.
    /// A no-op when `central` is no longer attached.
    async fn disconnect(&self, central: &CentralRef) -> StackResult<()>;

    /// Queue one notification for `central`
    ///
    /// Returns once the payload has been handed to the outbound queue, not
    /// when the central acknowledges it.
    async fn notify(&self, central: &CentralRef, payload: &[u8]) -> StackResult<()>;

    /// Bytes of each notification the stack keeps for itself at a given MTU
    fn notify_overhead(&self) -> usize {
        NOTIFICATION_OVERHEAD
    }
}
