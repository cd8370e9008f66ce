//! BLE device records
//!
//! Discovery snapshots, device identifiers and the handles the adapter hands
//! back after a successful connect.

use crate::error::ConnectionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// GATT service advertised by every LEGO Powered Up hub
pub const LEGO_HUB_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001623_1212_efde_1623_785feabcd123);

/// Characteristic carrying both directions of the LEGO wireless protocol
pub const LEGO_HUB_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00001624_1212_efde_1623_785feabcd123);

/// Bluetooth SIG company identifier of the LEGO System A/S
pub const LEGO_COMPANY_ID: u16 = 0x0397;

/// Opaque handle for a device the adapter has connected to.
///
/// Handles are minted by the adapter and only meaningful to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceHandle(pub u64);

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

/// Resolved write target of a connected hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxTarget {
    /// Connected device
    pub device: DeviceHandle,
    /// Characteristic used for writes and notifications
    pub characteristic: Uuid,
}

impl std::fmt::Display for TxTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.device, self.characteristic)
    }
}

/// A user-supplied hub identifier.
///
/// Depending on the platform a BLE device is addressed either by a MAC
/// address (Linux, Windows) or by a UUID (macOS). Users may give either
/// form; [`BleIdentifier::parse`] decides which one it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleIdentifier {
    /// Structured unique identifier
    Uuid(Uuid),
    /// Raw network address string
    Address(String),
}

impl BleIdentifier {
    /// Parse an identifier, falling back to a raw address when the string
    /// is not a UUID
    pub fn parse(raw: &str) -> Self {
        match Uuid::parse_str(raw.trim()) {
            Ok(uuid) => Self::Uuid(uuid),
            Err(_) => {
                tracing::info!(
                    "BLE id {} is not a parseable UUID, treating it as a network address",
                    raw
                );
                Self::Address(raw.trim().to_string())
            }
        }
    }

    /// Check whether a device address refers to this identifier
    pub fn matches(&self, address: &str) -> bool {
        match self {
            Self::Uuid(uuid) => Uuid::parse_str(address).is_ok_and(|a| a == *uuid),
            Self::Address(expected) => expected.eq_ignore_ascii_case(address),
        }
    }
}

impl std::fmt::Display for BleIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uuid(uuid) => write!(f, "{}", uuid),
            Self::Address(address) => write!(f, "{}", address),
        }
    }
}

/// A single result of a discovery round
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Advertised local name ("Unknown" when the device sent none)
    pub name: String,
    /// Platform address (MAC string or UUID string)
    pub address: String,
    /// Advertised service UUIDs
    pub service_uuids: Vec<Uuid>,
    /// Manufacturer data keyed by company identifier
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

impl DiscoveredDevice {
    /// Create a device record with no advertisement metadata
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            service_uuids: Vec::new(),
            manufacturer_data: HashMap::new(),
        }
    }

    /// Add an advertised service
    pub fn with_service(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    /// Add a manufacturer-data entry
    pub fn with_manufacturer_data(mut self, company_id: u16, data: Vec<u8>) -> Self {
        self.manufacturer_data.insert(company_id, data);
        self
    }

    /// Whether the device advertised any services at all
    pub fn has_service_metadata(&self) -> bool {
        !self.service_uuids.is_empty()
    }

    /// Derive the manufacturer identifier from the advertisement.
    ///
    /// LEGO hubs put their system type id in the second byte of the single
    /// manufacturer-data payload. More than one entry is an error; no entry
    /// or a short payload yields `None`.
    pub fn manufacturer_id(&self) -> Result<Option<u8>, ConnectionError> {
        if self.manufacturer_data.len() > 1 {
            return Err(ConnectionError::AmbiguousAdvertisement {
                address: self.address.clone(),
                entries: self.manufacturer_data.len(),
            });
        }

        Ok(self
            .manufacturer_data
            .values()
            .next()
            .and_then(|data| data.get(1).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_parse() {
        let id = BleIdentifier::parse("e5a8c7a0-1b2c-4d3e-8f90-a1b2c3d4e5f6");
        assert!(matches!(id, BleIdentifier::Uuid(_)));

        let id = BleIdentifier::parse("90:84:2B:4A:2B:75");
        assert_eq!(id, BleIdentifier::Address("90:84:2B:4A:2B:75".to_string()));
    }

    #[test]
    fn test_identifier_matches() {
        let id = BleIdentifier::parse("90:84:2B:4A:2B:75");
        assert!(id.matches("90:84:2b:4a:2b:75"));
        assert!(!id.matches("90:84:2B:4A:2B:76"));

        let id = BleIdentifier::parse("E5A8C7A0-1B2C-4D3E-8F90-A1B2C3D4E5F6");
        assert!(id.matches("e5a8c7a0-1b2c-4d3e-8f90-a1b2c3d4e5f6"));
        assert!(!id.matches("90:84:2B:4A:2B:75"));
    }

    #[test]
    fn test_manufacturer_id_derivation() {
        let device = DiscoveredDevice::new("Train Base", "aa")
            .with_manufacturer_data(0x0397, vec![0x00, 0x20, 0x00, 0x41]);
        assert_eq!(device.manufacturer_id(), Ok(Some(0x20)));

        let device = DiscoveredDevice::new("Short", "bb").with_manufacturer_data(0x0397, vec![0x00]);
        assert_eq!(device.manufacturer_id(), Ok(None));

        let device = DiscoveredDevice::new("None", "cc");
        assert_eq!(device.manufacturer_id(), Ok(None));
    }

    #[test]
    fn test_manufacturer_id_ambiguous() {
        let device = DiscoveredDevice::new("Two", "dd")
            .with_manufacturer_data(0x0397, vec![0x00, 0x20])
            .with_manufacturer_data(0x004c, vec![0x02, 0x15]);
        assert!(matches!(
            device.manufacturer_id(),
            Err(ConnectionError::AmbiguousAdvertisement { entries: 2, .. })
        ));
    }
}
