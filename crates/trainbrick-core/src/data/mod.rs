//! Data models for TrainBrick
//!
//! Provides the records exchanged between the hub declarations, the
//! connection protocol and the BLE adapter:
//! - BLE identities, discovery snapshots and resolved handles
//! - Hub identity records and the known LEGO hub kinds
//! - Declarative peripheral descriptions with their port assignment

pub mod device;
pub mod hub;
pub mod peripheral;

pub use device::{
    BleIdentifier, DeviceHandle, DiscoveredDevice, TxTarget, LEGO_COMPANY_ID,
    LEGO_HUB_CHARACTERISTIC_UUID, LEGO_HUB_SERVICE_UUID,
};
pub use hub::{HubIdentity, HubKind};
pub use peripheral::{Capability, IoType, Peripheral};
