//! BlueZ backend implementation using bluer

use bluer::{
    Session,
    adv::{Advertisement, AdvertisementHandle, Type},
    gatt::{
        CharacteristicWriter,
        local::{ApplicationHandle, CharacteristicControl, CharacteristicControlEvent},
    },
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::{
    sync::{Mutex, Notify, mpsc::UnboundedSender},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::BluetoothStack,
    core::{
        error::{StackError, StackResult},
        types::{
            AdapterHandle, CentralRef, ConnectionId, MAX_ATT_MTU, ServiceDescriptor, StackEvent,
        },
    },
    transport::ble::{BleAdapter, CentralSession, build_application},
};

/// Bytes of the ATT MTU unavailable to a notification payload
///
/// The ATT header takes 3; bluer holds back 2 more because BlueZ truncates
/// notifications that fill the reported MTU, and reports
/// [`CharacteristicWriter::mtu`] as the remaining payload size.
const BLUER_NOTIFY_OVERHEAD: usize = 5;

/// Notification session of one subscribed central
#[derive(Clone)]
struct Subscription {
    writer: Arc<CharacteristicWriter>,
    dropped: Arc<Notify>,
}

impl Subscription {
    fn new(writer: CharacteristicWriter) -> Self {
        Self {
            writer: Arc::new(writer),
            dropped: Arc::new(Notify::new()),
        }
    }

    fn att_mtu(&self) -> u16 {
        att_mtu(self.writer.mtu())
    }
}

/// ATT MTU of the link, recovered from a writer's payload size
fn att_mtu(writer_mtu: usize) -> u16 {
    u16::try_from(writer_mtu + BLUER_NOTIFY_OVERHEAD)
        .unwrap_or(MAX_ATT_MTU)
        .min(MAX_ATT_MTU)
}

/// Resources held while the adapter is owned
struct Owned {
    adapter: BleAdapter,
    events: UnboundedSender<StackEvent>,
    watcher: JoinHandle<()>,
    application: Option<(ApplicationHandle, JoinHandle<()>)>,
}

/// BlueZ-backed Bluetooth stack
///
/// Connections are observed through the notify subscription: BlueZ hands
/// out one socket per subscribed central, which carries its address and
/// MTU and closes when the central goes away.
pub struct BluezStack {
    adapter_name: Option<String>,
    device_name: String,
    owned: Mutex<Option<Owned>>,
    advertisement: Arc<Mutex<Option<AdvertisementHandle>>>,
    central: Arc<CentralSession<Subscription>>,
}

impl BluezStack {
    /// Create a stack for adapter `adapter_name` (default adapter if `None`)
    pub fn new(adapter_name: Option<String>, device_name: String) -> Self {
        Self {
            adapter_name,
            device_name,
            owned: Mutex::new(None),
            advertisement: Arc::new(Mutex::new(None)),
            central: Arc::new(CentralSession::new()),
        }
    }

    fn not_owned() -> StackError {
        StackError::new("NotReady", "Adapter not acquired")
    }
}

impl BluetoothStack for BluezStack {
    async fn acquire_adapter(
        &self,
        events: UnboundedSender<StackEvent>,
    ) -> StackResult<AdapterHandle> {
        let mut owned = self.owned.lock().await;
        if owned.is_some() {
            return Err(StackError::new("InProgress", "Adapter already acquired"));
        }

        let session = Session::new().await?;
        let adapter = BleAdapter::open(
            &session,
            self.adapter_name.as_deref(),
            self.device_name.clone(),
        )
        .await?;
        adapter.power_on().await?;
        let address = adapter.address().await?;

        let handle = AdapterHandle::new(adapter.name(), address.into());
        let watcher = adapter.spawn_event_watcher(events.clone());
        *owned = Some(Owned {
            adapter,
            events,
            watcher,
            application: None,
        });

        Ok(handle)
    }

    async fn release_adapter(&self, handle: AdapterHandle) -> StackResult<()> {
        let Some(owned) = self.owned.lock().await.take() else {
            return Ok(());
        };

        debug!("Releasing adapter {}", handle.name());
        owned.watcher.abort();
        if let Some((application, control_task)) = owned.application {
            control_task.abort();
            drop(application);
        }
        self.advertisement.lock().await.take();
        self.central.clear().await;

        owned.adapter.shutdown().await?;
        Ok(())
    }

    async fn register_application(&self, descriptor: &ServiceDescriptor) -> StackResult<()> {
        let mut guard = self.owned.lock().await;
        let owned = guard.as_mut().ok_or_else(Self::not_owned)?;
        if owned.application.is_some() {
            return Err(StackError::new(
                "AlreadyExists",
                "GATT application already registered",
            ));
        }

        let (application, control) = build_application(descriptor);
        let handle = owned
            .adapter
            .inner()
            .serve_gatt_application(application)
            .await?;

        let control_task = tokio::spawn(run_notify_control(
            control,
            self.central.clone(),
            self.advertisement.clone(),
            owned.events.clone(),
        ));
        owned.application = Some((handle, control_task));

        info!(
            "GATT application registered on {}",
            owned.adapter.name()
        );
        Ok(())
    }

    async fn unregister_application(&self) -> StackResult<()> {
        let mut guard = self.owned.lock().await;
        let owned = guard.as_mut().ok_or_else(Self::not_owned)?;

        if let Some((application, control_task)) = owned.application.take() {
            control_task.abort();
            // Dropping the handle unregisters the application from BlueZ
            drop(application);
            if let Some(central) = self.central.clear().await {
                debug!("Closed notification session of {}", central.address);
            }
            info!("GATT application unregistered");
        }
        Ok(())
    }

    async fn start_advertising(&self, service_uuid: Uuid) -> StackResult<()> {
        let guard = self.owned.lock().await;
        let owned = guard.as_ref().ok_or_else(Self::not_owned)?;

        let mut advertisement = self.advertisement.lock().await;
        if advertisement.is_some() {
            return Err(StackError::new(
                "AlreadyExists",
                "Advertisement already registered",
            ));
        }

        let handle = owned
            .adapter
            .inner()
            .advertise(Advertisement {
                advertisement_type: Type::Peripheral,
                service_uuids: [service_uuid].into_iter().collect(),
                discoverable: Some(true),
                local_name: Some(self.device_name.clone()),
                ..Default::default()
            })
            .await?;

        *advertisement = Some(handle);
        Ok(())
    }

    async fn stop_advertising(&self) -> StackResult<()> {
        // Dropping the handle unregisters the advertisement
        self.advertisement.lock().await.take();
        Ok(())
    }

    async fn disconnect(&self, central: &CentralRef) -> StackResult<()> {
        if let Some(subscription) = self.central.detach(central.id).await {
            // The socket closes once the close watcher lets go of it too
            subscription.dropped.notify_one();
            info!("Dropped notification session of {}", central.address);
        }
        Ok(())
    }

    async fn notify(&self, central: &CentralRef, payload: &[u8]) -> StackResult<()> {
        let subscription = self
            .central
            .writer(central.id)
            .await
            .ok_or_else(|| StackError::new("NotConnected", "Central no longer subscribed"))?;

        subscription
            .writer
            .send(payload)
            .await
            .map_err(|e| StackError::new("Failed", e.to_string()))
    }

    fn notify_overhead(&self) -> usize {
        BLUER_NOTIFY_OVERHEAD
    }
}

/// Turn notify subscriptions into connect and disconnect events
///
/// Subscriptions are only accepted while advertising; anything else is
/// dropped right away, which ends the central's notification session.
async fn run_notify_control(
    mut control: CharacteristicControl,
    central: Arc<CentralSession<Subscription>>,
    advertisement: Arc<Mutex<Option<AdvertisementHandle>>>,
    events: UnboundedSender<StackEvent>,
) {
    let mut closers = JoinSet::new();

    loop {
        tokio::select! {
            event = control.next() => match event {
                Some(CharacteristicControlEvent::Notify(writer)) => {
                    let address = writer.device_address();
                    let subscription = Subscription::new(writer);
                    let mtu = subscription.att_mtu();

                    let mut advertising = advertisement.lock().await;
                    if advertising.is_none() {
                        warn!("Rejecting subscription from {}: not advertising", address);
                        continue;
                    }

                    let Some(connected) = central.attach(address.into(), subscription.clone()).await else {
                        warn!("Rejecting subscription from {}: a central is already connected", address);
                        continue;
                    };

                    // A peripheral advertisement ends with the first connection
                    advertising.take();
                    drop(advertising);

                    let _ = events.send(StackEvent::Connected { central: connected, mtu });
                    closers.spawn(watch_closed(subscription, connected.id, central.clone(), events.clone()));
                }
                Some(_) => {}
                None => break,
            },
            Some(_) = closers.join_next(), if !closers.is_empty() => {}
        }
    }

    debug!("Characteristic control stream ended");
}

async fn watch_closed(
    subscription: Subscription,
    id: ConnectionId,
    central: Arc<CentralSession<Subscription>>,
    events: UnboundedSender<StackEvent>,
) {
    tokio::select! {
        result = subscription.writer.closed() => {
            if let Err(e) = result {
                debug!("Notification session {} ended with error: {}", id, e);
            }
        }
        _ = subscription.dropped.notified() => {
            debug!("Notification session {} dropped locally", id);
            return;
        }
    }

    if central.detach(id).await.is_some() {
        let _ = events.send(StackEvent::Disconnected { id });
    }
}
