//! Hub runtime
//!
//! A [`Hub`] couples a declared identity and its peripherals with the
//! program logic that drives them. Hubs are built with [`HubBuilder`] before
//! the system starts and stay alive for the whole run. The connection
//! protocol fills in the hub's [`HubConnection`] exactly once.

mod builder;

pub use builder::HubBuilder;

use crate::communication::queue::{CommandQueue, OutboundRequest};
use crate::protocol::{commands, Color, DuploSound, HubProperty, PortDetails, PropertyOperation};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use trainbrick_core::{
    ConnectionError, DataCallback, DeviceHandle, HubError, HubIdentity, IoType, Peripheral,
    Result, TxTarget,
};

/// Program logic of one hub
#[async_trait]
pub trait HubLogic: Send + Sync + 'static {
    /// Drive the hub. Called once every declared peripheral has a port.
    async fn run(&self, hub: Arc<Hub>) -> anyhow::Result<()>;
}

/// A value reported by a peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralUpdate {
    /// Peripheral name
    pub peripheral: String,
    /// Port the value came from
    pub port: u8,
    /// Raw value bytes
    pub value: Vec<u8>,
}

/// Handler invoked for each [`PeripheralUpdate`] of one peripheral
pub type ChangeHandler = DataCallback<PeripheralUpdate>;

/// Connection outputs written once by the connection protocol
#[derive(Debug, Clone)]
pub struct HubConnection {
    /// Device handle minted by the adapter
    pub device: DeviceHandle,
    /// Write and notification target
    pub tx: TxTarget,
    /// Address the device was found at
    pub address: String,
    /// Queue the hub sends commands through
    pub queue: CommandQueue,
}

/// A hub and its runtime state
pub struct Hub {
    identity: HubIdentity,
    peripherals: Vec<Peripheral>,
    handlers: HashMap<String, ChangeHandler>,
    logic: Arc<dyn HubLogic>,
    connection: OnceLock<HubConnection>,
    port_details: Mutex<BTreeMap<u8, PortDetails>>,
    updates: mpsc::UnboundedSender<PeripheralUpdate>,
    update_stream: Mutex<Option<mpsc::UnboundedReceiver<PeripheralUpdate>>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("name", &self.identity.name)
            .field("peripherals", &self.peripherals.len())
            .field("connection", &self.connection.get().map(|c| c.tx))
            .finish()
    }
}

impl Hub {
    /// Start declaring a hub
    pub fn builder(identity: HubIdentity) -> HubBuilder {
        HubBuilder::new(identity)
    }

    fn new(
        identity: HubIdentity,
        peripherals: Vec<Peripheral>,
        handlers: HashMap<String, ChangeHandler>,
        logic: Arc<dyn HubLogic>,
    ) -> Self {
        let (updates, update_stream) = mpsc::unbounded_channel();
        Self {
            identity,
            peripherals,
            handlers,
            logic,
            connection: OnceLock::new(),
            port_details: Mutex::new(BTreeMap::new()),
            updates,
            update_stream: Mutex::new(Some(update_stream)),
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn identity(&self) -> &HubIdentity {
        &self.identity
    }

    /// Declared peripherals, in declaration order
    pub fn peripherals(&self) -> &[Peripheral] {
        &self.peripherals
    }

    /// Look up a peripheral by name
    pub fn peripheral(&self, name: &str) -> std::result::Result<&Peripheral, HubError> {
        self.peripherals
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| HubError::UnknownPeripheral {
                peripheral: name.to_string(),
            })
    }

    /// Whether every declared peripheral has been assigned a port
    pub fn all_attached(&self) -> bool {
        self.peripherals.iter().all(Peripheral::is_attached)
    }

    /// Connection outputs, once connected
    pub fn connection(&self) -> Option<&HubConnection> {
        self.connection.get()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.get().is_some()
    }

    /// Resolved write target, once connected
    pub fn tx_target(&self) -> Option<TxTarget> {
        self.connection.get().map(|c| c.tx)
    }

    /// Resolved device address, once connected
    pub fn address(&self) -> Option<&str> {
        self.connection.get().map(|c| c.address.as_str())
    }

    pub(crate) fn set_connection(&self, connection: HubConnection) -> std::result::Result<(), ConnectionError> {
        self.connection
            .set(connection)
            .map_err(|_| ConnectionError::AlreadyConnected {
                hub: self.name().to_string(),
            })
    }

    fn queue(&self) -> std::result::Result<&CommandQueue, ConnectionError> {
        self.connection
            .get()
            .map(|c| &c.queue)
            .ok_or_else(|| ConnectionError::NotConnected {
                hub: self.name().to_string(),
            })
    }

    /// Enqueue a raw payload for this hub
    pub fn send(self: &Arc<Self>, payload: Vec<u8>) -> Result<()> {
        self.queue()?.put(OutboundRequest::tx(self.clone(), payload))?;
        Ok(())
    }

    /// Re-register notifications on this hub's characteristic
    pub fn request_notifications(self: &Arc<Self>) -> Result<()> {
        self.queue()?.put(OutboundRequest::notify(self.clone()))?;
        Ok(())
    }

    /// Wait until every command queued so far has been handed to the adapter
    pub async fn flush(&self) -> Result<()> {
        self.queue()?.join().await;
        Ok(())
    }

    fn attached_port(&self, name: &str) -> Result<u8> {
        let peripheral = self.peripheral(name)?;
        Ok(peripheral.port().ok_or_else(|| HubError::NotAttached {
            peripheral: name.to_string(),
        })?)
    }

    /// Run a motor peripheral at `power` percent
    pub fn set_power(self: &Arc<Self>, peripheral: &str, power: i8) -> Result<()> {
        let port = self.attached_port(peripheral)?;
        tracing::debug!("{}: {} power {}", self.name(), peripheral, power);
        self.send(commands::start_power(port, power))
    }

    /// Set a light peripheral to a preset color
    pub fn set_color(self: &Arc<Self>, peripheral: &str, color: Color) -> Result<()> {
        let port = self.attached_port(peripheral)?;
        self.send(commands::set_color(port, color))
    }

    /// Play a sound on a Duplo speaker peripheral
    pub fn play_sound(self: &Arc<Self>, peripheral: &str, sound: DuploSound) -> Result<()> {
        let port = self.attached_port(peripheral)?;
        self.send(commands::play_sound(port, sound))
    }

    /// Subscribe to value updates of one sensing capability.
    ///
    /// The hub button has no port mode; it is enabled through the button
    /// hub property instead.
    pub fn activate_updates(self: &Arc<Self>, peripheral: &str, capability: &str, delta: u32) -> Result<()> {
        let port = self.attached_port(peripheral)?;
        let declared = self.peripheral(peripheral)?;
        let mode = declared
            .capability(capability)
            .map(|c| c.mode)
            .ok_or_else(|| HubError::UnknownCapability {
                peripheral: peripheral.to_string(),
                capability: capability.to_string(),
            })?;
        if declared.is_builtin() {
            return self.send(commands::hub_property(
                HubProperty::Button,
                PropertyOperation::EnableUpdates,
            ));
        }
        self.send(commands::port_input_format_setup(port, mode, delta, true))
    }

    /// Snapshot of what the hub reported about a port
    pub fn port_details(&self, port: u8) -> Option<PortDetails> {
        self.port_details.lock().get(&port).cloned()
    }

    pub(crate) fn update_port_details(&self, port: u8, update: impl FnOnce(&mut PortDetails)) {
        update(self.port_details.lock().entry(port).or_default());
    }

    /// Assign `port` to the first declared peripheral accepting the attach.
    ///
    /// Returns the peripheral's name, or `None` if nothing was declared for
    /// this I/O type and port.
    pub(crate) fn attach_port(&self, io_type: IoType, port: u8) -> Option<String> {
        let peripheral = self
            .peripherals
            .iter()
            .find(|p| p.port() == Some(port) && p.io_type() == io_type)
            .or_else(|| {
                self.peripherals
                    .iter()
                    .find(|p| !p.is_attached() && p.accepts(io_type, port))
            })?;
        peripheral.assign_port(port);
        Some(peripheral.name().to_string())
    }

    /// Clear the peripheral sitting on `port`
    pub(crate) fn detach_port(&self, port: u8) -> Option<String> {
        let peripheral = self.peripherals.iter().find(|p| p.port() == Some(port))?;
        peripheral.clear_port();
        Some(peripheral.name().to_string())
    }

    /// Hand a value to the listening task. Returns the receiving
    /// peripheral's name.
    pub(crate) fn deliver_value(&self, port: u8, value: Vec<u8>) -> Option<String> {
        let peripheral = self.peripherals.iter().find(|p| p.port() == Some(port))?;
        let update = PeripheralUpdate {
            peripheral: peripheral.name().to_string(),
            port,
            value,
        };
        if self.updates.send(update).is_err() {
            tracing::debug!("{}: update stream closed", self.name());
        }
        Some(peripheral.name().to_string())
    }

    /// Peripheral-listening task: call each peripheral's change handler with
    /// its updates. Runs until cancelled.
    pub async fn listen(&self) {
        let stream = self.update_stream.lock().take();
        let Some(mut stream) = stream else {
            tracing::warn!("{}: listening task already started", self.name());
            return;
        };

        while let Some(update) = stream.recv().await {
            match self.handlers.get(&update.peripheral) {
                Some(handler) => handler(&update),
                None => tracing::debug!(
                    "{}: no handler for {} value {:02x?}",
                    self.name(),
                    update.peripheral,
                    update.value
                ),
            }
        }
    }

    /// Run the hub's program logic
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let logic = self.logic.clone();
        logic.run(self).await
    }
}
