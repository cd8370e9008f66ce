//! Device matching
//!
//! Picks the device a hub identity refers to out of one discovery snapshot.

use trainbrick_core::{BleIdentifier, ConnectionError, DiscoveredDevice, HubIdentity};

/// What a discovery snapshot is searched for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTarget {
    /// Advertised name
    pub name: String,
    /// Manufacturer (system type) identifier
    pub manufacturer_id: u8,
    /// Optional identifier pinning one physical device
    pub identifier: Option<BleIdentifier>,
}

impl MatchTarget {
    /// Build the target for a hub identity, resolving its BLE id
    pub fn for_identity(identity: &HubIdentity) -> Self {
        Self {
            name: identity.ble_name.clone(),
            manufacturer_id: identity.manufacturer_id,
            identifier: identity.ble_id.as_deref().map(BleIdentifier::parse),
        }
    }
}

/// Select at most one device from a snapshot.
///
/// Devices without service metadata are ignored. Every remaining device must
/// advertise at most one manufacturer-data entry, otherwise the whole match
/// fails. A device is a candidate when its manufacturer id or its name
/// matches; with an identifier only the candidate at that address is
/// accepted, without one the first candidate in scan order wins.
pub fn select_device<'a>(
    devices: &'a [DiscoveredDevice],
    target: &MatchTarget,
) -> Result<Option<&'a DiscoveredDevice>, ConnectionError> {
    let advertised = devices
        .iter()
        .filter(|d| d.has_service_metadata())
        .map(|d| d.manufacturer_id().map(|id| (d, id)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut candidates = advertised.into_iter().filter_map(|(device, id)| {
        let by_id = id == Some(target.manufacturer_id);
        (by_id || device.name == target.name).then_some(device)
    });

    Ok(match &target.identifier {
        Some(identifier) => candidates.find(|d| identifier.matches(&d.address)),
        None => candidates.next(),
    })
}
