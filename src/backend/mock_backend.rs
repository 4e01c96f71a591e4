//! Mock Bluetooth stack for testing

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::backend::BluetoothStack;
use crate::core::error::{StackError, StackResult};
use crate::core::types::{
    AdapterHandle, CentralRef, ConnectionId, DeviceAddress, ServiceDescriptor, StackEvent,
};

/// Stack call as recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    AcquireAdapter,
    ReleaseAdapter,
    RegisterApplication {
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    },
    UnregisterApplication,
    StartAdvertising(Uuid),
    StopAdvertising,
    Disconnect(ConnectionId),
    Notify {
        id: ConnectionId,
        payload: Vec<u8>,
    },
}

/// Internal state for the mock stack
#[derive(Debug, Default)]
struct MockState {
    adapter_present: bool,
    adapter_owned: bool,
    fail_register: bool,
    fail_advertising: bool,
    fail_notify: bool,
    notify_delay: Option<Duration>,
    connect_on_advertise: Option<(DeviceAddress, u16)>,
    registered: Option<ServiceDescriptor>,
    advertising: Option<Uuid>,
    central: Option<CentralRef>,
    events: Option<UnboundedSender<StackEvent>>,
    next_id: u64,
    calls: Vec<StackCall>,
}

/// Mock Bluetooth stack for testing
///
/// Records every call and lets tests inject the asynchronous events a real
/// stack would deliver, without requiring actual hardware.
#[derive(Debug, Clone)]
pub struct MockStack {
    inner: Arc<Mutex<MockState>>,
}

impl MockStack {
    /// Create a new mock stack with a present, unowned adapter
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                adapter_present: true,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configure whether a controller is present
    pub fn set_adapter_present(&self, present: bool) {
        self.state().adapter_present = present;
    }

    /// Configure mock to reject GATT registration
    pub fn set_register_failure(&self, should_fail: bool) {
        self.state().fail_register = should_fail;
    }

    /// Configure mock to reject advertising
    pub fn set_advertising_failure(&self, should_fail: bool) {
        self.state().fail_advertising = should_fail;
    }

    /// Configure mock to fail notifications
    pub fn set_notify_failure(&self, should_fail: bool) {
        self.state().fail_notify = should_fail;
    }

    /// Hold every notification in flight for `delay` before queueing it
    pub fn set_notify_delay(&self, delay: Option<Duration>) {
        self.state().notify_delay = delay;
    }

    /// Let `address` connect as soon as the next advertisement is up
    ///
    /// The advertising call then lingers briefly before returning, so the
    /// connect event is handled while advertising is still being started.
    pub fn connect_on_next_advertise(&self, address: DeviceAddress, mtu: u16) {
        self.state().connect_on_advertise = Some((address, mtu));
    }

    /// Simulate a central connecting and subscribing
    ///
    /// Like a real controller, advertising stops on connection and a second
    /// central is refused while one is connected. Returns the central the
    /// stack reported, if any.
    pub fn simulate_connect(&self, address: DeviceAddress, mtu: u16) -> Option<CentralRef> {
        Self::connect(&mut self.state(), address, mtu)
    }

    fn connect(state: &mut MockState, address: DeviceAddress, mtu: u16) -> Option<CentralRef> {
        if state.central.is_some() || state.events.is_none() {
            return None;
        }

        state.next_id += 1;
        let central = CentralRef {
            id: ConnectionId(state.next_id),
            address,
        };
        state.central = Some(central);
        state.advertising = None;
        Self::emit(state, StackEvent::Connected { central, mtu });
        Some(central)
    }

    /// Simulate the connected central going away
    pub fn simulate_disconnect(&self) -> Option<ConnectionId> {
        let mut state = self.state();
        let central = state.central.take()?;
        Self::emit(&state, StackEvent::Disconnected { id: central.id });
        Some(central.id)
    }

    /// Deliver an arbitrary event, bypassing the mock's own bookkeeping
    pub fn inject_event(&self, event: StackEvent) {
        Self::emit(&self.state(), event);
    }

    /// Simulate an ATT MTU exchange on the current connection
    pub fn simulate_mtu_change(&self, mtu: u16) -> bool {
        let state = self.state();
        match state.central {
            Some(central) => {
                Self::emit(&state, StackEvent::MtuChanged { id: central.id, mtu });
                true
            }
            None => false,
        }
    }

    /// Simulate the controller being removed underneath the process
    pub fn simulate_adapter_lost(&self) {
        let mut state = self.state();
        state.adapter_present = false;
        state.central = None;
        state.advertising = None;
        Self::emit(
            &state,
            StackEvent::AdapterLost {
                reason: "controller removed".into(),
            },
        );
    }

    fn emit(state: &MockState, event: StackEvent) {
        if let Some(events) = &state.events {
            let _ = events.send(event);
        }
    }

    /// All stack calls in order
    pub fn calls(&self) -> Vec<StackCall> {
        self.state().calls.clone()
    }

    /// Payloads of every notification that reached the stack
    pub fn notifications(&self) -> Vec<Vec<u8>> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                StackCall::Notify { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_adapter_owned(&self) -> bool {
        self.state().adapter_owned
    }

    pub fn is_registered(&self) -> bool {
        self.state().registered.is_some()
    }

    pub fn is_advertising(&self) -> bool {
        self.state().advertising.is_some()
    }

    /// Central currently holding the notification session
    pub fn central(&self) -> Option<CentralRef> {
        self.state().central
    }

    /// Value a GATT read request would currently return
    pub async fn read_value(&self) -> Option<Vec<u8>> {
        let value = self.state().registered.as_ref().map(|d| d.value.clone())?;
        Some(value.snapshot().await)
    }
}

impl Default for MockStack {
    fn default() -> Self {
        Self::new()
    }
}

impl BluetoothStack for MockStack {
    async fn acquire_adapter(
        &self,
        events: UnboundedSender<StackEvent>,
    ) -> StackResult<AdapterHandle> {
        let mut state = self.state();
        state.calls.push(StackCall::AcquireAdapter);
        if !state.adapter_present {
            return Err(StackError::new("NotFound", "No Bluetooth adapter present"));
        }
        if state.adapter_owned {
            return Err(StackError::new("NotPermitted", "Adapter already owned"));
        }

        state.adapter_owned = true;
        state.events = Some(events);
        Ok(AdapterHandle::new("hci0", DeviceAddress([0, 0x1a, 0x7d, 0xda, 0x71, 0x13])))
    }

    async fn release_adapter(&self, _handle: AdapterHandle) -> StackResult<()> {
        let mut state = self.state();
        state.calls.push(StackCall::ReleaseAdapter);
        state.adapter_owned = false;
        state.events = None;
        state.central = None;
        Ok(())
    }

    async fn register_application(&self, descriptor: &ServiceDescriptor) -> StackResult<()> {
        let mut state = self.state();
        state.calls.push(StackCall::RegisterApplication {
            service_uuid: descriptor.service_uuid,
            characteristic_uuid: descriptor.characteristic_uuid,
        });
        if state.fail_register {
            return Err(StackError::new("InvalidArguments", "Mock registration failure"));
        }

        state.registered = Some(descriptor.clone());
        Ok(())
    }

    async fn unregister_application(&self) -> StackResult<()> {
        let mut state = self.state();
        state.calls.push(StackCall::UnregisterApplication);
        state.registered = None;
        state.central = None;
        Ok(())
    }

    async fn start_advertising(&self, service_uuid: Uuid) -> StackResult<()> {
        let early_connect = {
            let mut state = self.state();
            state.calls.push(StackCall::StartAdvertising(service_uuid));
            if state.fail_advertising {
                return Err(StackError::new("NotPermitted", "Maximum advertisements reached"));
            }
            if state.advertising.is_some() {
                return Err(StackError::new("AlreadyExists", "Advertisement already registered"));
            }

            state.advertising = Some(service_uuid);
            match state.connect_on_advertise.take() {
                Some((address, mtu)) => Self::connect(&mut state, address, mtu).is_some(),
                None => false,
            }
        };

        if early_connect {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    async fn stop_advertising(&self) -> StackResult<()> {
        let mut state = self.state();
        state.calls.push(StackCall::StopAdvertising);
        state.advertising = None;
        Ok(())
    }

    async fn disconnect(&self, central: &CentralRef) -> StackResult<()> {
        let mut state = self.state();
        state.calls.push(StackCall::Disconnect(central.id));
        if state.central.map(|c| c.id) == Some(central.id) {
            state.central = None;
        }
        Ok(())
    }

    async fn notify(&self, central: &CentralRef, payload: &[u8]) -> StackResult<()> {
        let delay = self.state().notify_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_notify {
            return Err(StackError::new("Failed", "Mock notify failure"));
        }
        if state.central.map(|c| c.id) != Some(central.id) {
            return Err(StackError::new("NotConnected", "Unknown central"));
        }

        state.calls.push(StackCall::Notify {
            id: central.id,
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
