//! Hub identity records
//!
//! A hub identity describes which physical hub a program wants to drive.
//! It is created before any connection attempt and never changes.

use super::device::{LEGO_HUB_CHARACTERISTIC_UUID, LEGO_HUB_SERVICE_UUID};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Known LEGO hub families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubKind {
    /// Duplo train base
    DuploTrain,
    /// Boost move hub
    Boost,
    /// Powered Up hub (two ports)
    PoweredUp,
    /// Powered Up handset remote
    PoweredUpRemote,
    /// Control+ / Technic hub
    ControlPlus,
}

impl HubKind {
    /// System type id advertised in the manufacturer data
    pub fn manufacturer_id(&self) -> u8 {
        match self {
            Self::DuploTrain => 0x20,
            Self::Boost => 0x40,
            Self::PoweredUp => 0x41,
            Self::PoweredUpRemote => 0x42,
            Self::ControlPlus => 0x80,
        }
    }

    /// Factory advertised name
    pub fn default_ble_name(&self) -> &'static str {
        match self {
            Self::DuploTrain => "Train Base",
            Self::Boost => "LEGO Move Hub",
            Self::PoweredUp => "HUB NO.4",
            Self::PoweredUpRemote => "Handset",
            Self::ControlPlus => "Technic Hub",
        }
    }
}

impl std::fmt::Display for HubKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuploTrain => write!(f, "Duplo Train"),
            Self::Boost => write!(f, "Boost Move Hub"),
            Self::PoweredUp => write!(f, "Powered Up Hub"),
            Self::PoweredUpRemote => write!(f, "Powered Up Remote"),
            Self::ControlPlus => write!(f, "Control+ Hub"),
        }
    }
}

/// Identity of a hub the system should connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubIdentity {
    /// Display name used in logs
    pub name: String,
    /// Advertised BLE name to look for
    pub ble_name: String,
    /// Manufacturer (system type) identifier to look for
    pub manufacturer_id: u8,
    /// Optional address or UUID pinning a specific physical hub
    pub ble_id: Option<String>,
    /// UART service UUID
    pub uart_uuid: Uuid,
    /// Characteristic used for writes and notifications
    pub char_uuid: Uuid,
}

impl HubIdentity {
    /// Create an identity with the LEGO service and characteristic
    pub fn new(name: impl Into<String>, ble_name: impl Into<String>, manufacturer_id: u8) -> Self {
        Self {
            name: name.into(),
            ble_name: ble_name.into(),
            manufacturer_id,
            ble_id: None,
            uart_uuid: LEGO_HUB_SERVICE_UUID,
            char_uuid: LEGO_HUB_CHARACTERISTIC_UUID,
        }
    }

    /// Create an identity with the defaults of a known hub family
    pub fn for_kind(name: impl Into<String>, kind: HubKind) -> Self {
        Self::new(name, kind.default_ble_name(), kind.manufacturer_id())
    }

    /// Pin the identity to a specific address or UUID
    pub fn with_ble_id(mut self, ble_id: impl Into<String>) -> Self {
        self.ble_id = Some(ble_id.into());
        self
    }

    /// Override the advertised name to look for
    pub fn with_ble_name(mut self, ble_name: impl Into<String>) -> Self {
        self.ble_name = ble_name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_for_kind() {
        let identity = HubIdentity::for_kind("My train", HubKind::DuploTrain);
        assert_eq!(identity.name, "My train");
        assert_eq!(identity.ble_name, "Train Base");
        assert_eq!(identity.manufacturer_id, 0x20);
        assert_eq!(identity.uart_uuid, LEGO_HUB_SERVICE_UUID);
        assert_eq!(identity.char_uuid, LEGO_HUB_CHARACTERISTIC_UUID);
        assert!(identity.ble_id.is_none());
    }

    #[test]
    fn test_identity_builders() {
        let identity = HubIdentity::for_kind("Crane", HubKind::ControlPlus)
            .with_ble_id("90:84:2B:4A:2B:75")
            .with_ble_name("Crane Hub");
        assert_eq!(identity.ble_id.as_deref(), Some("90:84:2B:4A:2B:75"));
        assert_eq!(identity.ble_name, "Crane Hub");
        assert_eq!(identity.manufacturer_id, 0x80);
    }

    #[test]
    fn test_hub_kind_serde_names() {
        let kind: HubKind = serde_json::from_str("\"powered_up_remote\"").unwrap();
        assert_eq!(kind, HubKind::PoweredUpRemote);
        assert_eq!(serde_json::to_string(&HubKind::DuploTrain).unwrap(), "\"duplo_train\"");
    }
}
