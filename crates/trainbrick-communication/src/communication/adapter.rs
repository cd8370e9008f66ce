//! BLE adapter boundary
//!
//! The adapter owns the physical BLE stack and runs in its own execution
//! context. The core talks to it only through two channels: an inbound
//! stream of [`AdapterCommand`]s and an outbound stream of
//! [`AdapterEvent`]s. `discover` and `connect` each answer with exactly one
//! event; `tx` is fire-and-forget; `notify` starts a stream of
//! [`AdapterEvent::Notification`]s; `quit` disconnects everything and ends
//! the worker.

use async_trait::async_trait;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use trainbrick_core::{DeviceHandle, DiscoveredDevice, Error, Result};
use uuid::Uuid;

/// Command sent to the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCommand {
    /// Run one discovery round
    Discover,
    /// Connect to the device at an address
    Connect {
        /// Address taken from a discovery snapshot
        address: String,
    },
    /// Write a framed message
    Tx {
        /// Connected device
        device: DeviceHandle,
        /// Characteristic to write
        characteristic: Uuid,
        /// Framed bytes
        data: Vec<u8>,
    },
    /// Deliver notifications from a characteristic
    Notify {
        /// Connected device
        device: DeviceHandle,
        /// Characteristic to subscribe to
        characteristic: Uuid,
    },
    /// Disconnect all devices and stop
    Quit,
}

/// Event produced by the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Result of a discovery round
    Discovered(Vec<DiscoveredDevice>),
    /// A connect request succeeded
    Connected(DeviceHandle),
    /// A discover or connect request failed
    Failed {
        /// Adapter supplied reason
        reason: String,
    },
    /// Bytes received on a subscribed characteristic
    Notification {
        /// Source device
        device: DeviceHandle,
        /// Source characteristic
        characteristic: Uuid,
        /// Raw frame
        data: Vec<u8>,
    },
}

impl AdapterEvent {
    /// Short name of the event kind, for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterEvent::Discovered(_) => "discovered",
            AdapterEvent::Connected(_) => "connected",
            AdapterEvent::Failed { .. } => "failed",
            AdapterEvent::Notification { .. } => "notification",
        }
    }
}

/// Where an adapter pushes notification bytes after a `notify` request
#[derive(Debug, Clone)]
pub struct NotificationSink {
    events: mpsc::UnboundedSender<AdapterEvent>,
}

impl NotificationSink {
    /// Wrap the outbound event stream
    pub fn new(events: mpsc::UnboundedSender<AdapterEvent>) -> Self {
        Self { events }
    }

    /// Push one notification. Returns false once the core has gone away.
    pub fn deliver(&self, device: DeviceHandle, characteristic: Uuid, data: Vec<u8>) -> bool {
        self.events
            .send(AdapterEvent::Notification {
                device,
                characteristic,
                data,
            })
            .is_ok()
    }
}

/// Physical BLE operations
///
/// Implementations are driven by a single worker and never see concurrent
/// calls.
#[async_trait]
pub trait Adapter: Send + 'static {
    /// Scan once and report every device seen
    async fn discover(&mut self) -> anyhow::Result<Vec<DiscoveredDevice>>;

    /// Connect to a device from the last scan
    async fn connect(&mut self, address: &str) -> anyhow::Result<DeviceHandle>;

    /// Write bytes to a characteristic
    async fn write(
        &mut self,
        device: DeviceHandle,
        characteristic: Uuid,
        data: &[u8],
    ) -> anyhow::Result<()>;

    /// Start forwarding notifications of a characteristic into `sink`
    async fn subscribe(
        &mut self,
        device: DeviceHandle,
        characteristic: Uuid,
        sink: NotificationSink,
    ) -> anyhow::Result<()>;

    /// Disconnect every connected device
    async fn shutdown(&mut self) -> anyhow::Result<()>;
}

/// Core-side ends of the adapter channels
#[derive(Debug)]
pub struct AdapterHandle {
    /// Inbound command stream
    pub commands: mpsc::UnboundedSender<AdapterCommand>,
    /// Outbound event stream
    pub events: mpsc::UnboundedReceiver<AdapterEvent>,
}

/// Worker thread running an adapter
#[derive(Debug)]
pub struct AdapterThread {
    handle: std::thread::JoinHandle<()>,
}

impl AdapterThread {
    /// Wait for the worker to finish (after `quit`)
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| Error::other("BLE adapter thread panicked"))
    }

    /// Whether the worker has returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn channels() -> (
    AdapterHandle,
    mpsc::UnboundedReceiver<AdapterCommand>,
    mpsc::UnboundedSender<AdapterEvent>,
) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let handle = AdapterHandle {
        commands: command_tx,
        events: event_rx,
    };
    (handle, command_rx, event_tx)
}

/// Run an adapter on a dedicated OS thread with its own single-threaded
/// runtime.
pub fn spawn_adapter_thread<A: Adapter>(adapter: A) -> Result<(AdapterHandle, AdapterThread)> {
    spawn_adapter_thread_with(move || async move { Ok(adapter) })
}

/// Build the adapter on a dedicated OS thread and run it there.
///
/// Adapters holding platform handles (btleplug, dbus) must be created on
/// the runtime that drives them. If `factory` fails, every `discover` and
/// `connect` is answered with [`AdapterEvent::Failed`] until `quit`.
pub fn spawn_adapter_thread_with<A, F, Fut>(factory: F) -> Result<(AdapterHandle, AdapterThread)>
where
    A: Adapter,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<A>>,
{
    let (handle, commands, events) = channels();

    let thread = std::thread::Builder::new()
        .name("ble-adapter".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!("Failed to start BLE adapter runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(async move {
                match factory().await {
                    Ok(adapter) => run_adapter(adapter, commands, events).await,
                    Err(e) => {
                        tracing::error!("Failed to open BLE adapter: {:#}", e);
                        refuse_commands(format!("adapter unavailable: {:#}", e), commands, events)
                            .await
                    }
                }
            });
        })?;

    Ok((handle, AdapterThread { handle: thread }))
}

/// Answer requests of an adapter that never came up
async fn refuse_commands(
    reason: String,
    mut commands: mpsc::UnboundedReceiver<AdapterCommand>,
    events: mpsc::UnboundedSender<AdapterEvent>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            AdapterCommand::Discover | AdapterCommand::Connect { .. } => {
                let failed = AdapterEvent::Failed {
                    reason: reason.clone(),
                };
                if events.send(failed).is_err() {
                    break;
                }
            }
            AdapterCommand::Quit => break,
            _ => {}
        }
    }
}

/// Run an adapter as a task on the current runtime.
///
/// Same protocol as [`spawn_adapter_thread`]; meant for adapters that do not
/// block, such as the simulated one.
pub fn spawn_adapter_task<A: Adapter>(adapter: A) -> (AdapterHandle, JoinHandle<()>) {
    let (handle, commands, events) = channels();
    let task = tokio::spawn(run_adapter(adapter, commands, events));
    (handle, task)
}

/// Adapter worker loop: execute commands in arrival order until `quit` or
/// until the core drops the command stream.
pub async fn run_adapter<A: Adapter>(
    mut adapter: A,
    mut commands: mpsc::UnboundedReceiver<AdapterCommand>,
    events: mpsc::UnboundedSender<AdapterEvent>,
) {
    tracing::debug!("BLE adapter worker started");

    while let Some(command) = commands.recv().await {
        tracing::debug!("Adapter command: {:?}", command);
        let reply = match command {
            AdapterCommand::Discover => Some(match adapter.discover().await {
                Ok(devices) => AdapterEvent::Discovered(devices),
                Err(e) => AdapterEvent::Failed {
                    reason: format!("discover failed: {}", e),
                },
            }),
            AdapterCommand::Connect { address } => Some(match adapter.connect(&address).await {
                Ok(device) => AdapterEvent::Connected(device),
                Err(e) => AdapterEvent::Failed {
                    reason: format!("connect to {} failed: {}", address, e),
                },
            }),
            AdapterCommand::Tx {
                device,
                characteristic,
                data,
            } => {
                if let Err(e) = adapter.write(device, characteristic, &data).await {
                    tracing::warn!("Write to {} failed: {}", device, e);
                }
                None
            }
            AdapterCommand::Notify {
                device,
                characteristic,
            } => {
                let sink = NotificationSink::new(events.clone());
                if let Err(e) = adapter.subscribe(device, characteristic, sink).await {
                    tracing::warn!("Subscribing to {} on {} failed: {}", characteristic, device, e);
                }
                None
            }
            AdapterCommand::Quit => {
                tracing::info!("Adapter received quit");
                break;
            }
        };

        if let Some(reply) = reply {
            if events.send(reply).is_err() {
                tracing::debug!("Adapter event stream closed");
                break;
            }
        }
    }

    if let Err(e) = adapter.shutdown().await {
        tracing::warn!("Adapter shutdown failed: {}", e);
    }
    tracing::debug!("BLE adapter worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::simulated::{SimulatedAdapter, SimulatedCall};

    #[tokio::test]
    async fn test_factory_builds_adapter_on_worker_thread() {
        let adapter = SimulatedAdapter::new().with_scan(vec![DiscoveredDevice::new("Train", "aa")]);
        let log = adapter.log();
        let (mut handle, thread) = spawn_adapter_thread_with(move || async move {
            assert_eq!(std::thread::current().name(), Some("ble-adapter"));
            Ok(adapter)
        })
        .unwrap();

        handle.commands.send(AdapterCommand::Discover).unwrap();
        let event = handle.events.recv().await.unwrap();
        assert!(matches!(event, AdapterEvent::Discovered(ref devices) if devices.len() == 1));

        handle.commands.send(AdapterCommand::Quit).unwrap();
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.calls(), vec![SimulatedCall::Discover, SimulatedCall::Shutdown]);
    }

    #[tokio::test]
    async fn test_failed_factory_refuses_requests() {
        let (mut handle, thread) = spawn_adapter_thread_with(|| async {
            Err::<SimulatedAdapter, _>(anyhow::anyhow!("no Bluetooth adapter found"))
        })
        .unwrap();

        handle.commands.send(AdapterCommand::Discover).unwrap();
        match handle.events.recv().await.unwrap() {
            AdapterEvent::Failed { reason } => assert!(reason.contains("no Bluetooth adapter")),
            other => panic!("unexpected event {:?}", other),
        }

        handle.commands.send(AdapterCommand::Quit).unwrap();
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .unwrap()
            .unwrap();
    }
}
