//! Central connection manager with state machine

use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, info, warn};

use crate::core::{
    error::{ServerError, ServerResult},
    types::{
        CentralRef, ConnectionId, ConnectionSnapshot, ConnectionState, DEFAULT_ATT_MTU,
        NOTIFICATION_OVERHEAD, StackEvent, clamp_mtu, payload_limit,
    },
};

/// Connection state machine
///
/// `state == Connected` holds exactly when `central` is set.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    central: Option<CentralRef>,
    mtu: u16,
    overhead: usize,
}

impl ConnectionStateMachine {
    fn new() -> Self {
        Self::with_overhead(NOTIFICATION_OVERHEAD)
    }

    fn with_overhead(overhead: usize) -> Self {
        Self {
            state: ConnectionState::Idle,
            central: None,
            mtu: DEFAULT_ATT_MTU,
            overhead,
        }
    }

    /// Advertising was started
    fn start_advertising(&mut self) -> ServerResult<()> {
        match self.state {
            ConnectionState::Idle => {
                self.state = ConnectionState::Advertising;
                Ok(())
            }
            other => Err(ServerError::Advertising(format!(
                "Cannot advertise while {:?}",
                other
            ))),
        }
    }

    /// Advertising could not be started after all
    fn cancel_advertising(&mut self) -> bool {
        if self.state == ConnectionState::Advertising {
            self.state = ConnectionState::Idle;
            true
        } else {
            false
        }
    }

    /// A central connected; only honored while advertising
    fn connect(&mut self, central: CentralRef, mtu: u16) -> bool {
        match self.state {
            ConnectionState::Advertising => {
                self.state = ConnectionState::Connected;
                self.central = Some(central);
                self.mtu = clamp_mtu(mtu);
                true
            }
            _ => false,
        }
    }

    /// The central with `id` went away
    fn disconnect(&mut self, central_id: ConnectionId) -> Option<CentralRef> {
        match self.central {
            Some(central) if central.id == central_id => {
                self.reset();
                Some(central)
            }
            _ => None,
        }
    }

    fn update_mtu(&mut self, central_id: ConnectionId, mtu: u16) -> bool {
        match self.central {
            Some(central) if central.id == central_id => {
                self.mtu = clamp_mtu(mtu);
                true
            }
            _ => false,
        }
    }

    /// Explicit stop while connected; the central is invalidated immediately
    fn begin_teardown(&mut self) -> Option<CentralRef> {
        let central = self.central.take();
        if central.is_some() {
            self.state = ConnectionState::Disconnecting;
        }
        central
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Idle;
        self.central = None;
        self.mtu = DEFAULT_ATT_MTU;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connected central, only ever set in the `Connected` state
    pub fn central(&self) -> Option<&CentralRef> {
        self.central.as_ref()
    }

    /// Largest payload a single notification may carry right now
    pub fn payload_limit(&self) -> usize {
        payload_limit(self.mtu, self.overhead)
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            central: self.central,
            mtu: self.mtu,
            max_payload: self.payload_limit(),
        }
    }
}

/// Outcome of applying a stack event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connected(CentralRef),
    /// The stack attached a central the state machine refused
    Rejected(CentralRef),
    Disconnected(CentralRef),
    MtuUpdated(u16),
    Ignored,
}

/// Serializes every access to the single logical connection
pub struct ConnectionManager {
    machine: Mutex<ConnectionStateMachine>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_overhead(NOTIFICATION_OVERHEAD)
    }

    /// Manager for a stack that spends `overhead` bytes per notification
    pub fn with_overhead(overhead: usize) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            machine: Mutex::new(ConnectionStateMachine::with_overhead(overhead)),
            state_tx,
        }
    }

    /// Exclusive access to the state machine
    ///
    /// Transitions wait until the guard is dropped, so a holder never
    /// observes a central that is being invalidated.
    pub async fn lock(&self) -> MutexGuard<'_, ConnectionStateMachine> {
        self.machine.lock().await
    }

    /// Wake observers only on an actual state change
    fn publish(&self, machine: &ConnectionStateMachine) {
        let state = machine.state();
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        self.machine.lock().await.state()
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        self.machine.lock().await.snapshot()
    }

    /// Idle -> Advertising
    pub async fn start_advertising(&self) -> ServerResult<()> {
        let mut machine = self.machine.lock().await;
        machine.start_advertising()?;
        debug!("Connection state: Advertising");
        self.publish(&machine);
        Ok(())
    }

    /// Advertising -> Idle, when the stack refused to advertise
    pub async fn cancel_advertising(&self) {
        let mut machine = self.machine.lock().await;
        if machine.cancel_advertising() {
            debug!("Connection state: Idle");
            self.publish(&machine);
        }
    }

    /// Apply a connect, disconnect or MTU event from the stack
    pub async fn apply(&self, event: &StackEvent) -> Transition {
        let mut machine = self.machine.lock().await;
        let transition = match *event {
            StackEvent::Connected { central, mtu } => {
                if machine.central().is_some_and(|c| c.id == central.id) {
                    debug!("Ignoring repeated connect for {}", central.id);
                    Transition::Ignored
                } else if machine.connect(central, mtu) {
                    info!(
                        "Central {} connected ({}), MTU {}",
                        central.address,
                        central.id,
                        machine.mtu
                    );
                    Transition::Connected(central)
                } else {
                    warn!(
                        "Rejected connection from {} while {:?}",
                        central.address,
                        machine.state()
                    );
                    Transition::Rejected(central)
                }
            }
            StackEvent::Disconnected { id } => match machine.disconnect(id) {
                Some(central) => {
                    info!("Central {} disconnected ({})", central.address, id);
                    Transition::Disconnected(central)
                }
                None => {
                    debug!("Ignoring disconnect for stale connection {}", id);
                    Transition::Ignored
                }
            },
            StackEvent::MtuChanged { id, mtu } => {
                if machine.update_mtu(id, mtu) {
                    info!("MTU for connection {} is now {}", id, machine.mtu);
                    Transition::MtuUpdated(machine.mtu)
                } else {
                    debug!("Ignoring MTU change for stale connection {}", id);
                    Transition::Ignored
                }
            }
            StackEvent::AdapterLost { .. } => Transition::Ignored,
        };

        self.publish(&machine);
        transition
    }

    /// Connected -> Disconnecting, ahead of an explicit stop
    pub async fn begin_teardown(&self) {
        let mut machine = self.machine.lock().await;
        if let Some(central) = machine.begin_teardown() {
            info!("Disconnecting central {}", central.address);
            self.publish(&machine);
        }
    }

    /// Any state -> Idle
    pub async fn reset(&self) {
        let mut machine = self.machine.lock().await;
        machine.reset();
        self.publish(&machine);
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
