//! btleplug-backed adapter
//!
//! Only built with the `ble` feature. Runs inside the adapter worker; every
//! subscription spawns a task on the worker's runtime which forwards the
//! peripheral's notification stream.

use super::adapter::{Adapter, NotificationSink};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use btleplug::api::{BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter as BtleCentral, Manager, Peripheral};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use trainbrick_core::{DeviceHandle, DiscoveredDevice};
use uuid::Uuid;

/// Adapter driving the first Bluetooth controller of the host
pub struct BtleplugAdapter {
    central: BtleCentral,
    scan_window: Duration,
    seen: HashMap<String, Peripheral>,
    connected: HashMap<DeviceHandle, Peripheral>,
    forwarders: Vec<JoinHandle<()>>,
    next_handle: u64,
}

impl BtleplugAdapter {
    /// Open the first Bluetooth adapter. Each discovery round listens for
    /// `scan_window`.
    pub async fn new(scan_window: Duration) -> anyhow::Result<Self> {
        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no Bluetooth adapter found"))?;

        Ok(Self {
            central,
            scan_window,
            seen: HashMap::new(),
            connected: HashMap::new(),
            forwarders: Vec::new(),
            next_handle: 0,
        })
    }

    fn peripheral(&self, device: DeviceHandle) -> anyhow::Result<&Peripheral> {
        self.connected
            .get(&device)
            .ok_or_else(|| anyhow!("{} is not connected", device))
    }

    fn characteristic(peripheral: &Peripheral, uuid: Uuid) -> anyhow::Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| anyhow!("characteristic {} not found", uuid))
    }
}

#[async_trait]
impl Adapter for BtleplugAdapter {
    async fn discover(&mut self) -> anyhow::Result<Vec<DiscoveredDevice>> {
        self.central.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(self.scan_window).await;
        self.central.stop_scan().await?;

        let mut devices = Vec::new();
        self.seen.clear();
        for peripheral in self.central.peripherals().await? {
            let Some(props) = peripheral.properties().await? else {
                continue;
            };
            let address = if props.address == BDAddr::default() {
                peripheral.id().to_string()
            } else {
                props.address.to_string()
            };
            devices.push(DiscoveredDevice {
                name: props.local_name.unwrap_or_else(|| "Unknown".to_string()),
                address: address.clone(),
                service_uuids: props.services,
                manufacturer_data: props.manufacturer_data,
            });
            self.seen.insert(address, peripheral);
        }
        Ok(devices)
    }

    async fn connect(&mut self, address: &str) -> anyhow::Result<DeviceHandle> {
        let peripheral = self
            .seen
            .get(address)
            .cloned()
            .ok_or_else(|| anyhow!("{} was not seen in the last scan", address))?;

        peripheral
            .connect()
            .await
            .with_context(|| format!("connecting to {}", address))?;
        peripheral.discover_services().await?;

        self.next_handle += 1;
        let device = DeviceHandle(self.next_handle);
        self.connected.insert(device, peripheral);
        Ok(device)
    }

    async fn write(
        &mut self,
        device: DeviceHandle,
        characteristic: Uuid,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let peripheral = self.peripheral(device)?;
        let characteristic = Self::characteristic(peripheral, characteristic)?;
        peripheral
            .write(&characteristic, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(
        &mut self,
        device: DeviceHandle,
        characteristic: Uuid,
        sink: NotificationSink,
    ) -> anyhow::Result<()> {
        let peripheral = self.peripheral(device)?.clone();
        let target = Self::characteristic(&peripheral, characteristic)?;
        peripheral.subscribe(&target).await?;

        let mut notifications = peripheral.notifications().await?;
        self.forwarders.push(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != characteristic {
                    continue;
                }
                if !sink.deliver(device, characteristic, notification.value) {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        for (device, peripheral) in self.connected.drain() {
            if let Err(e) = peripheral.disconnect().await {
                tracing::warn!("Disconnecting {} failed: {}", device, e);
            }
        }
        Ok(())
    }
}
