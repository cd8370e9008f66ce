//! In-memory adapter
//!
//! Replays scripted discovery snapshots, mints device handles on connect and
//! answers a subscription with the attached-I/O messages a real hub sends
//! when it reports its ports. Every call is recorded for inspection.

use super::adapter::{Adapter, NotificationSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use trainbrick_core::{DeviceHandle, DiscoveredDevice, IoType};
use uuid::Uuid;

/// One recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedCall {
    /// A discovery round
    Discover,
    /// A connect request
    Connect(String),
    /// A characteristic write
    Write {
        /// Target device
        device: DeviceHandle,
        /// Target characteristic
        characteristic: Uuid,
        /// Framed bytes
        data: Vec<u8>,
    },
    /// A notification subscription
    Subscribe {
        /// Target device
        device: DeviceHandle,
        /// Target characteristic
        characteristic: Uuid,
    },
    /// Final disconnect
    Shutdown,
}

type SinkMap = HashMap<(DeviceHandle, Uuid), NotificationSink>;

/// Shared view of a simulated adapter, usable after the adapter has moved
/// into its worker
#[derive(Debug, Clone, Default)]
pub struct SimulationLog {
    calls: Arc<Mutex<Vec<SimulatedCall>>>,
    sinks: Arc<Mutex<SinkMap>>,
}

impl SimulationLog {
    /// Every call so far, in order
    pub fn calls(&self) -> Vec<SimulatedCall> {
        self.calls.lock().clone()
    }

    /// Number of discovery rounds
    pub fn discover_count(&self) -> usize {
        self.count(|c| matches!(c, SimulatedCall::Discover))
    }

    /// Framed writes, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                SimulatedCall::Write { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether the adapter was shut down
    pub fn was_shut_down(&self) -> bool {
        self.count(|c| matches!(c, SimulatedCall::Shutdown)) > 0
    }

    /// Push a notification into a subscribed characteristic.
    ///
    /// Returns false if nothing is subscribed there.
    pub fn inject(&self, device: DeviceHandle, characteristic: Uuid, data: Vec<u8>) -> bool {
        match self.sinks.lock().get(&(device, characteristic)) {
            Some(sink) => sink.deliver(device, characteristic, data),
            None => false,
        }
    }

    fn count(&self, pred: impl Fn(&SimulatedCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: SimulatedCall) {
        self.calls.lock().push(call);
    }
}

/// Scripted adapter for tests and `--simulate` runs
#[derive(Debug, Default)]
pub struct SimulatedAdapter {
    scans: VecDeque<Vec<DiscoveredDevice>>,
    attached: HashMap<String, Vec<(u8, IoType)>>,
    connected: HashMap<DeviceHandle, String>,
    next_handle: u64,
    scan_delay: Duration,
    log: SimulationLog,
}

impl SimulatedAdapter {
    /// Adapter that never sees any device
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a discovery snapshot. Snapshots are returned in order; the last
    /// one repeats once the script runs out.
    pub fn with_scan(mut self, devices: Vec<DiscoveredDevice>) -> Self {
        self.scans.push_back(devices);
        self
    }

    /// Report `io_type` on `port` when the device at `address` is subscribed
    pub fn with_attached_io(mut self, address: impl Into<String>, port: u8, io_type: IoType) -> Self {
        self.attached
            .entry(address.into())
            .or_default()
            .push((port, io_type));
        self
    }

    /// Make every discovery round take this long
    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = delay;
        self
    }

    /// Handle on the call log and subscriptions
    pub fn log(&self) -> SimulationLog {
        self.log.clone()
    }

    fn next_scan(&mut self) -> Vec<DiscoveredDevice> {
        if self.scans.len() > 1 {
            self.scans.pop_front().unwrap_or_default()
        } else {
            self.scans.front().cloned().unwrap_or_default()
        }
    }
}

/// Attached-I/O frame as a hub sends it: length, hub id, type 0x04, port,
/// event "attached", I/O type, hardware and software revision.
pub fn attached_io_frame(port: u8, io_type: IoType) -> Vec<u8> {
    let mut frame = vec![0x0F, 0x00, 0x04, port, 0x01];
    frame.extend_from_slice(&io_type.id().to_le_bytes());
    frame.extend_from_slice(&[0x00, 0x00, 0x00, 0x10]);
    frame.extend_from_slice(&[0x00, 0x00, 0x00, 0x10]);
    frame
}

#[async_trait]
impl Adapter for SimulatedAdapter {
    async fn discover(&mut self) -> anyhow::Result<Vec<DiscoveredDevice>> {
        self.log.record(SimulatedCall::Discover);
        if !self.scan_delay.is_zero() {
            tokio::time::sleep(self.scan_delay).await;
        }
        Ok(self.next_scan())
    }

    async fn connect(&mut self, address: &str) -> anyhow::Result<DeviceHandle> {
        self.log.record(SimulatedCall::Connect(address.to_string()));
        self.next_handle += 1;
        let device = DeviceHandle(self.next_handle);
        self.connected.insert(device, address.to_string());
        tracing::debug!("Simulated connect to {} as {}", address, device);
        Ok(device)
    }

    async fn write(
        &mut self,
        device: DeviceHandle,
        characteristic: Uuid,
        data: &[u8],
    ) -> anyhow::Result<()> {
        if !self.connected.contains_key(&device) {
            anyhow::bail!("{} is not connected", device);
        }
        self.log.record(SimulatedCall::Write {
            device,
            characteristic,
            data: data.to_vec(),
        });
        Ok(())
    }

    async fn subscribe(
        &mut self,
        device: DeviceHandle,
        characteristic: Uuid,
        sink: NotificationSink,
    ) -> anyhow::Result<()> {
        let address = self
            .connected
            .get(&device)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} is not connected", device))?;
        self.log.record(SimulatedCall::Subscribe {
            device,
            characteristic,
        });

        for (port, io_type) in self.attached.get(&address).into_iter().flatten() {
            sink.deliver(device, characteristic, attached_io_frame(*port, *io_type));
        }
        self.log.sinks.lock().insert((device, characteristic), sink);
        Ok(())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.log.record(SimulatedCall::Shutdown);
        self.log.sinks.lock().clear();
        for (device, address) in self.connected.drain() {
            tracing::debug!("Simulated disconnect of {} ({})", device, address);
        }
        Ok(())
    }
}
