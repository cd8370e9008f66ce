//! Connection protocol
//!
//! Drives one hub through discover → match → connect → subscribe against
//! the adapter. Connects are serialized: a [`Connector`] owns the adapter's
//! response stream, so only one session can be waiting on it at a time.

use super::adapter::{AdapterCommand, AdapterEvent};
use super::matcher::{select_device, MatchTarget};
use super::queue::CommandQueue;
use super::router::ListenerTable;
use crate::hub::{Hub, HubConnection};
use crate::protocol::MessageParser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use trainbrick_core::{
    ConnectionError, ConnectionEvent, DiscoveredDevice, EventBus, Result, SystemEvent, TxTarget,
};

/// Default number of discovery rounds before giving up
pub const DEFAULT_SCAN_ROUNDS: u32 = 60;

/// Default pause between discovery rounds
pub const DEFAULT_SCAN_BACKOFF: Duration = Duration::from_secs(1);

/// Retry budget of the discovery phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Discovery rounds before "device not found"
    pub max_rounds: u32,
    /// Pause after a round without a match
    pub backoff: Duration,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_SCAN_ROUNDS,
            backoff: DEFAULT_SCAN_BACKOFF,
        }
    }
}

/// Connection protocol states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Session created, nothing sent yet
    Idle,
    /// Waiting for a discovery round
    Scanning,
    /// A device in the last scan matched the target
    Matched,
    /// Waiting for the adapter to connect
    Connecting,
    /// Listener registered, notifications requested
    Subscribing,
    /// Hub connected and parsing notifications
    Connected,
    /// The attempt ended with an error
    Failed,
}

/// State of one connect attempt
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    state: ConnectionState,
    history: Vec<ConnectionState>,
    remaining: u32,
    rounds: u32,
    last_scan: Vec<DiscoveredDevice>,
    matched: Option<DiscoveredDevice>,
}

impl ConnectionSession {
    fn new(budget: u32) -> Self {
        Self {
            state: ConnectionState::Idle,
            history: vec![ConnectionState::Idle],
            remaining: budget,
            rounds: 0,
            last_scan: Vec::new(),
            matched: None,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        tracing::trace!("Connection state {:?} -> {:?}", self.state, next);
        self.state = next;
        if self.history.last() != Some(&next) {
            self.history.push(next);
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// States visited, consecutive repeats collapsed
    pub fn history(&self) -> &[ConnectionState] {
        &self.history
    }

    /// Discovery rounds left in the budget
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Discovery rounds performed
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Snapshot returned by the last discovery round
    pub fn last_scan(&self) -> &[DiscoveredDevice] {
        &self.last_scan
    }

    /// Device the session settled on
    pub fn matched(&self) -> Option<&DiscoveredDevice> {
        self.matched.as_ref()
    }
}

/// Result of a successful connect
#[derive(Debug)]
pub struct Connected {
    /// The finished session
    pub session: ConnectionSession,
    /// Task running the hub's message parser
    pub parser: JoinHandle<()>,
}

/// Runs connect sessions against the adapter
pub struct Connector {
    commands: mpsc::UnboundedSender<AdapterCommand>,
    responses: mpsc::UnboundedReceiver<AdapterEvent>,
    listeners: ListenerTable,
    queue: CommandQueue,
    events: Arc<EventBus>,
    policy: ScanPolicy,
}

impl Connector {
    /// Create a connector owning the adapter's response stream
    pub fn new(
        commands: mpsc::UnboundedSender<AdapterCommand>,
        responses: mpsc::UnboundedReceiver<AdapterEvent>,
        listeners: ListenerTable,
        queue: CommandQueue,
        events: Arc<EventBus>,
        policy: ScanPolicy,
    ) -> Self {
        Self {
            commands,
            responses,
            listeners,
            queue,
            events,
            policy,
        }
    }

    /// Connect a hub and start its message parser.
    ///
    /// Fails with `AlreadyConnected` for a hub that has a connection,
    /// `AmbiguousAdvertisement` when a scan contains a device with several
    /// manufacturer-data entries and `DeviceNotFound` once the scan budget
    /// is spent.
    pub async fn connect(&mut self, hub: &Arc<Hub>) -> Result<Connected> {
        let mut session = ConnectionSession::new(self.policy.max_rounds);
        match self.run_session(hub, &mut session).await {
            Ok(parser) => Ok(Connected { session, parser }),
            Err(e) => {
                session.transition(ConnectionState::Failed);
                tracing::error!("Connecting {} failed: {}", hub.name(), e);
                self.events
                    .emit(SystemEvent::Connection(ConnectionEvent::ConnectionFailed {
                        hub: hub.name().to_string(),
                        error: e.to_string(),
                    }));
                Err(e)
            }
        }
    }

    async fn run_session(
        &mut self,
        hub: &Arc<Hub>,
        session: &mut ConnectionSession,
    ) -> Result<JoinHandle<()>> {
        if hub.is_connected() {
            return Err(ConnectionError::AlreadyConnected {
                hub: hub.name().to_string(),
            }
            .into());
        }

        let target = MatchTarget::for_identity(hub.identity());
        match &target.identifier {
            Some(id) => tracing::info!("Looking for specific hub id {}", id),
            None => tracing::info!("Looking for first matching hub"),
        }

        let device = self.scan(hub, &target, session).await?;

        session.transition(ConnectionState::Connecting);
        self.send(AdapterCommand::Connect {
            address: device.address.clone(),
        })?;
        let handle = match self.next_response().await? {
            AdapterEvent::Connected(handle) => handle,
            AdapterEvent::Failed { reason } => {
                return Err(ConnectionError::AdapterFailure { reason }.into())
            }
            other => return Err(unexpected("connected", &other).into()),
        };

        let tx = TxTarget {
            device: handle,
            characteristic: hub.identity().char_uuid,
        };
        hub.set_connection(HubConnection {
            device: handle,
            tx,
            address: device.address.clone(),
            queue: self.queue.clone(),
        })?;

        session.transition(ConnectionState::Subscribing);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        self.listeners.register((tx.device, tx.characteristic), frames_tx);
        let parser = MessageParser::new(hub.clone(), self.events.clone());
        let parser = tokio::spawn(parser.run(frames_rx));
        self.send(AdapterCommand::Notify {
            device: tx.device,
            characteristic: tx.characteristic,
        })?;

        session.transition(ConnectionState::Connected);
        tracing::info!("Connected to device {}:{}", device.name, device.address);
        self.events
            .emit(SystemEvent::Connection(ConnectionEvent::Connected {
                hub: hub.name().to_string(),
                address: device.address,
            }));
        Ok(parser)
    }

    async fn scan(
        &mut self,
        hub: &Hub,
        target: &MatchTarget,
        session: &mut ConnectionSession,
    ) -> Result<DiscoveredDevice> {
        if session.remaining == 0 {
            return Err(ConnectionError::DeviceNotFound {
                name: target.name.clone(),
                rounds: 0,
            }
            .into());
        }

        loop {
            session.transition(ConnectionState::Scanning);
            session.rounds += 1;
            self.send(AdapterCommand::Discover)?;

            let devices = match self.next_response().await? {
                AdapterEvent::Discovered(devices) => devices,
                AdapterEvent::Failed { reason } => {
                    return Err(ConnectionError::AdapterFailure { reason }.into())
                }
                other => return Err(unexpected("discovered", &other).into()),
            };
            tracing::debug!("Scan round {} saw {} devices", session.rounds, devices.len());

            let found = select_device(&devices, target)?.cloned();
            session.last_scan = devices;

            if let Some(device) = found {
                tracing::info!("found device {}", device.name);
                session.matched = Some(device.clone());
                session.transition(ConnectionState::Matched);
                self.events
                    .emit(SystemEvent::Connection(ConnectionEvent::DeviceMatched {
                        hub: hub.name().to_string(),
                        device_name: device.name.clone(),
                        address: device.address.clone(),
                    }));
                return Ok(device);
            }

            session.remaining -= 1;
            if session.remaining == 0 {
                return Err(ConnectionError::DeviceNotFound {
                    name: target.name.clone(),
                    rounds: session.rounds,
                }
                .into());
            }

            tracing::info!(
                "Rescanning for {} ({} tries left)",
                hub.identity().uart_uuid,
                session.remaining
            );
            self.events
                .emit(SystemEvent::Connection(ConnectionEvent::Rescanning {
                    hub: hub.name().to_string(),
                    remaining: session.remaining,
                }));
            tokio::time::sleep(self.policy.backoff).await;
        }
    }

    fn send(&self, command: AdapterCommand) -> std::result::Result<(), ConnectionError> {
        self.commands
            .send(command)
            .map_err(|_| ConnectionError::ChannelClosed {
                channel: "adapter commands".to_string(),
            })
    }

    async fn next_response(&mut self) -> std::result::Result<AdapterEvent, ConnectionError> {
        self.responses
            .recv()
            .await
            .ok_or_else(|| ConnectionError::ChannelClosed {
                channel: "adapter events".to_string(),
            })
    }
}

fn unexpected(expected: &str, actual: &AdapterEvent) -> ConnectionError {
    ConnectionError::UnexpectedResponse {
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}
