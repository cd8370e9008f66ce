//! # TrainBrick Core
//!
//! Core types, errors and the event bus for TrainBrick.
//! Provides the hub and peripheral declarations, BLE discovery records and
//! the error taxonomy shared by the communication and settings crates.

pub mod data;
pub mod error;
pub mod event_bus;
pub mod types;

pub use data::{
    BleIdentifier, Capability, DeviceHandle, DiscoveredDevice, HubIdentity, HubKind, IoType,
    Peripheral, TxTarget, LEGO_COMPANY_ID, LEGO_HUB_CHARACTERISTIC_UUID, LEGO_HUB_SERVICE_UUID,
};

pub use error::{ConnectionError, Error, HubError, ProtocolError, Result};

pub use event_bus::{
    CommunicationEvent, ConnectionEvent, ErrorEvent, EventBus, EventBusConfig, EventCategory,
    EventFilter, PeripheralEvent, SubscriptionId, SystemEvent,
};

pub use types::{thread_safe_rw_map, DataCallback, ThreadSafeRwMap};
