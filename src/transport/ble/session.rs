//! BLE central session tracking

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::core::types::{CentralRef, ConnectionId, DeviceAddress};

#[derive(Debug)]
struct ActiveCentral<W> {
    central: CentralRef,
    writer: W,
}

/// Slot for the one subscribed central and its notification writer
///
/// Every attached central gets a fresh [`ConnectionId`], so events about an
/// earlier connection can be told apart from the current one.
#[derive(Debug)]
pub struct CentralSession<W> {
    next_id: AtomicU64,
    active: RwLock<Option<ActiveCentral<W>>>,
}

impl<W: Clone> CentralSession<W> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: RwLock::new(None),
        }
    }

    /// Attach a subscribing central; `None` while another one is attached
    pub async fn attach(&self, address: DeviceAddress, writer: W) -> Option<CentralRef> {
        let mut active = self.active.write().await;
        if active.is_some() {
            return None;
        }

        let central = CentralRef {
            id: ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            address,
        };
        *active = Some(ActiveCentral { central, writer });
        Some(central)
    }

    /// Detach the central with `id` and hand back its writer
    ///
    /// `None` if that central is no longer current.
    pub async fn detach(&self, id: ConnectionId) -> Option<W> {
        let mut active = self.active.write().await;
        match &*active {
            Some(current) if current.central.id == id => active.take().map(|a| a.writer),
            _ => None,
        }
    }

    /// Drop whatever central is attached
    pub async fn clear(&self) -> Option<CentralRef> {
        self.active.write().await.take().map(|a| a.central)
    }

    /// Writer of the central with `id`, if it is still current
    pub async fn writer(&self, id: ConnectionId) -> Option<W> {
        match &*self.active.read().await {
            Some(current) if current.central.id == id => Some(current.writer.clone()),
            _ => None,
        }
    }

    pub async fn central(&self) -> Option<CentralRef> {
        self.active.read().await.as_ref().map(|a| a.central)
    }
}

impl<W: Clone> Default for CentralSession<W> {
    fn default() -> Self {
        Self::new()
    }
}
