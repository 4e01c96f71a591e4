//! BLE adapter management

use bluer::{Adapter, AdapterEvent, AdapterProperty, Address, Session};
use futures::StreamExt;
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::core::types::StackEvent;

/// Local controller used for the peripheral role
pub struct BleAdapter {
    adapter: Adapter,
    device_name: String,
}

impl BleAdapter {
    /// Open adapter `name`, or the default adapter when `None`
    pub async fn open(
        session: &Session,
        name: Option<&str>,
        device_name: String,
    ) -> Result<Self, bluer::Error> {
        let adapter = match name {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };

        info!("Using BLE adapter: {}", adapter.name());

        Ok(Self {
            adapter,
            device_name,
        })
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub async fn address(&self) -> Result<Address, bluer::Error> {
        self.adapter.address().await
    }

    /// The underlying bluer adapter
    pub fn inner(&self) -> &Adapter {
        &self.adapter
    }

    /// Power on, set the alias and make the adapter discoverable
    pub async fn power_on(&self) -> Result<(), bluer::Error> {
        self.adapter.set_powered(true).await?;
        self.adapter.set_alias(self.device_name.clone()).await?;
        self.adapter.set_discoverable(true).await?;

        info!(
            "BLE adapter {} powered and discoverable as '{}'",
            self.adapter.name(),
            self.device_name
        );
        Ok(())
    }

    /// Leave the adapter powered but no longer discoverable
    pub async fn shutdown(&self) -> Result<(), bluer::Error> {
        self.adapter.set_discoverable(false).await?;
        info!("BLE adapter {} released", self.adapter.name());
        Ok(())
    }

    /// Watch the adapter and report its loss as [`StackEvent::AdapterLost`]
    pub fn spawn_event_watcher(&self, events: UnboundedSender<StackEvent>) -> JoinHandle<()> {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            let reason = match watch_adapter(&adapter).await {
                Ok(reason) => reason,
                Err(e) => format!("adapter events unavailable: {}", e),
            };
            warn!("BLE adapter {} lost: {}", adapter.name(), reason);
            let _ = events.send(StackEvent::AdapterLost { reason });
        })
    }
}

/// Run until the adapter goes away; returns the reason
async fn watch_adapter(adapter: &Adapter) -> Result<String, bluer::Error> {
    let mut events = adapter.events().await?;

    debug!("BLE adapter event loop started");

    while let Some(event) = events.next().await {
        match event {
            AdapterEvent::PropertyChanged(AdapterProperty::Powered(false)) => {
                return Ok("adapter powered off".into());
            }
            AdapterEvent::DeviceRemoved(addr) => {
                debug!("Device removed: {}", addr);
            }
            _ => {}
        }
    }

    Ok("adapter removed".into())
}
