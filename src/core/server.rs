//! Peripheral server facade

use std::sync::Arc;
use tokio::{
    sync::{
        Mutex,
        mpsc::{self, UnboundedReceiver},
        watch,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    backend::BluetoothStack,
    core::{
        adapter::AdapterBinding,
        advertising::AdvertisingController,
        connection::{ConnectionManager, Transition},
        dispatcher::NotificationDispatcher,
        error::{ServerError, ServerResult},
        registry::GattServiceRegistry,
        types::{
            ConnectionSnapshot, ConnectionState, ServerStatus, ServiceDescriptor, StackEvent,
            parse_uuid,
        },
    },
};

/// Server lifecycle
enum Lifecycle {
    Stopped,
    Running {
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        events: JoinHandle<()>,
    },
}

/// Components shared with the stack event loop
struct Shared<S: BluetoothStack> {
    stack: Arc<S>,
    adapter: AdapterBinding<S>,
    registry: Arc<GattServiceRegistry<S>>,
    advertising: AdvertisingController<S>,
    connection: Arc<ConnectionManager>,
    lifecycle: Mutex<Lifecycle>,
}

impl<S: BluetoothStack> Shared<S> {
    /// Tear down in reverse start order; every step is idempotent
    async fn teardown(&self) {
        self.connection.begin_teardown().await;
        self.advertising.stop().await;
        self.registry.unpublish().await;
        self.connection.reset().await;
        self.adapter.release().await;
    }

    /// Idle -> Advertising
    ///
    /// The state moves first: a central may connect as soon as the stack
    /// advertises, possibly before `start` returns.
    async fn advertise(&self, service_uuid: Uuid) -> ServerResult<()> {
        self.connection.start_advertising().await?;
        if let Err(e) = self.advertising.start(service_uuid).await {
            self.connection.cancel_advertising().await;
            return Err(e);
        }
        Ok(())
    }

    async fn handle_adapter_lost(&self, reason: &str) {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(*lifecycle, Lifecycle::Stopped) {
            return;
        }

        error!(
            "Bluetooth adapter lost ({}); server stopped, restart required",
            reason
        );
        self.teardown().await;
        // Detaches this very task's handle; the loop exits right after
        *lifecycle = Lifecycle::Stopped;
    }

    async fn run_event_loop(self: Arc<Self>, mut events: UnboundedReceiver<StackEvent>) {
        debug!("Stack event loop started");

        while let Some(event) = events.recv().await {
            match event {
                StackEvent::AdapterLost { reason } => {
                    self.handle_adapter_lost(&reason).await;
                    break;
                }
                event => match self.connection.apply(&event).await {
                    Transition::Connected(_) => {
                        self.advertising.mark_stopped_by_connection().await;
                    }
                    Transition::Rejected(central) => {
                        // Free the stack's slot so the next central can attach
                        if let Err(e) = self.stack.disconnect(&central).await {
                            warn!("Dropping refused central {} failed: {}", central.address, e);
                        }
                    }
                    _ => {}
                },
            }
        }

        debug!("Stack event loop ended");
    }
}

/// BLE peripheral server: the single entry point for calling code
///
/// Owns the adapter binding, the service registry, the advertising
/// controller, the connection manager and the notification dispatcher, and
/// enforces the start/stop lifecycle across them.
pub struct PeripheralServer<S: BluetoothStack> {
    shared: Arc<Shared<S>>,
    dispatcher: NotificationDispatcher<S>,
}

impl<S: BluetoothStack> PeripheralServer<S> {
    /// Create a stopped server on top of `stack`
    pub fn new(stack: Arc<S>) -> Self {
        let registry = Arc::new(GattServiceRegistry::new(stack.clone()));
        let connection = Arc::new(ConnectionManager::with_overhead(stack.notify_overhead()));
        let dispatcher =
            NotificationDispatcher::new(stack.clone(), connection.clone(), registry.clone());

        let shared = Arc::new(Shared {
            stack: stack.clone(),
            adapter: AdapterBinding::new(stack.clone()),
            registry,
            advertising: AdvertisingController::new(stack),
            connection,
            lifecycle: Mutex::new(Lifecycle::Stopped),
        });

        Self { shared, dispatcher }
    }

    /// Acquire the adapter, publish the service and start advertising
    ///
    /// On failure everything acquired so far is released again.
    pub async fn start(&self, service_uuid: &str, characteristic_uuid: &str) -> ServerResult<()> {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        if matches!(*lifecycle, Lifecycle::Running { .. }) {
            return Err(ServerError::AlreadyRunning);
        }

        let service_uuid = parse_uuid(service_uuid)?;
        let characteristic_uuid = parse_uuid(characteristic_uuid)?;
        info!(
            "Starting server: service {}, characteristic {}",
            service_uuid, characteristic_uuid
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let descriptor = ServiceDescriptor::new(service_uuid, characteristic_uuid);

        let result = async {
            self.shared.adapter.acquire(events_tx).await?;
            self.shared.registry.publish(descriptor).await?;
            self.shared.advertise(service_uuid).await
        }
        .await;

        if let Err(e) = result {
            error!("Server start failed: {}", e);
            self.shared.teardown().await;
            return Err(e);
        }

        let events = tokio::spawn(self.shared.clone().run_event_loop(events_rx));
        *lifecycle = Lifecycle::Running {
            service_uuid,
            characteristic_uuid,
            events,
        };

        info!("Server started");
        Ok(())
    }

    /// Tear everything down; safe from any state, including never started
    pub async fn stop(&self) {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        let Lifecycle::Running { events, .. } =
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        else {
            debug!("Stop requested while not running");
            return;
        };

        info!("Stopping server");
        events.abort();
        self.shared.teardown().await;
        info!("Server stopped");
    }

    /// Send `payload` to the connected central as one notification
    pub async fn notify(&self, payload: &[u8]) -> ServerResult<usize> {
        self.dispatcher.notify(payload).await
    }

    /// Send `data` split into notifications of at most the current payload limit
    ///
    /// Stops at the first failed chunk and returns its error.
    pub async fn send_data(&self, data: &[u8]) -> ServerResult<usize> {
        let snapshot = self.shared.connection.snapshot().await;
        if snapshot.central.is_none() {
            return Err(ServerError::NotConnected);
        }

        let chunk_size = snapshot.payload_limit().max(1);
        let mut sent = 0;
        for chunk in data.chunks(chunk_size) {
            sent += self.dispatcher.notify(chunk).await?;
        }

        debug!(
            "Sent {} bytes in {} notifications",
            sent,
            data.len().div_ceil(chunk_size)
        );
        Ok(sent)
    }

    /// Advertise again after a central disconnected
    pub async fn restart_advertising(&self) -> ServerResult<()> {
        let lifecycle = self.shared.lifecycle.lock().await;
        let Lifecycle::Running { service_uuid, .. } = *lifecycle else {
            return Err(ServerError::Advertising("Server not running".into()));
        };

        self.shared.advertise(service_uuid).await
    }

    /// Store a new characteristic value without notifying
    pub async fn update_value(&self, value: &[u8]) {
        self.shared.registry.update_value(value).await;
    }

    /// Current characteristic value
    pub async fn value(&self) -> Vec<u8> {
        self.shared.registry.value().await
    }

    pub async fn connection(&self) -> ConnectionSnapshot {
        self.shared.connection.snapshot().await
    }

    /// Observe connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        matches!(
            *self.shared.lifecycle.lock().await,
            Lifecycle::Running { .. }
        )
    }

    /// Configuration and connection state
    pub async fn status(&self) -> ServerStatus {
        let (running, service_uuid, characteristic_uuid) =
            match &*self.shared.lifecycle.lock().await {
                Lifecycle::Stopped => (false, None, None),
                Lifecycle::Running {
                    service_uuid,
                    characteristic_uuid,
                    ..
                } => (true, Some(*service_uuid), Some(*characteristic_uuid)),
            };

        ServerStatus {
            running,
            service_uuid,
            characteristic_uuid,
            connection: self.shared.connection.snapshot().await,
        }
    }
}
