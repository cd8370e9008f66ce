//! Downstream command payloads
//!
//! Payloads start with the hub id; the length byte is added by the
//! dispatcher when the request is framed.

use super::{message_type, HubProperty, PropertyOperation};

const HUB_ID: u8 = 0x00;

/// Execute immediately and request command feedback
const STARTUP_AND_COMPLETION: u8 = 0x11;

/// Port output sub-command "WriteDirectModeData"
const WRITE_DIRECT_MODE_DATA: u8 = 0x51;

/// Colors understood by the hub RGB light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black = 0,
    Pink = 1,
    Purple = 2,
    Blue = 3,
    LightBlue = 4,
    Cyan = 5,
    Green = 6,
    Yellow = 7,
    Orange = 8,
    Red = 9,
    White = 10,
}

/// Sounds built into the Duplo train speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuploSound {
    Brake = 3,
    StationDeparture = 5,
    WaterRefill = 7,
    Horn = 9,
    Steam = 10,
}

/// Hub property request, e.g. enable button updates
pub fn hub_property(property: HubProperty, operation: PropertyOperation) -> Vec<u8> {
    vec![
        HUB_ID,
        message_type::HUB_PROPERTIES,
        property.id(),
        operation.id(),
    ]
}

/// Ask for port information (0 = value, 1 = mode info, 2 = combinations)
pub fn port_information_request(port: u8, information_type: u8) -> Vec<u8> {
    vec![
        HUB_ID,
        message_type::PORT_INFORMATION_REQUEST,
        port,
        information_type,
    ]
}

/// Ask for information about one mode of a port
pub fn port_mode_information_request(port: u8, mode: u8, information_type: u8) -> Vec<u8> {
    vec![
        HUB_ID,
        message_type::PORT_MODE_INFORMATION_REQUEST,
        port,
        mode,
        information_type,
    ]
}

/// Select the mode a port reports values for.
///
/// `delta` is the change needed before a new value is sent.
pub fn port_input_format_setup(port: u8, mode: u8, delta: u32, notify: bool) -> Vec<u8> {
    let mut payload = vec![HUB_ID, message_type::PORT_INPUT_FORMAT_SETUP, port, mode];
    payload.extend_from_slice(&delta.to_le_bytes());
    payload.push(notify as u8);
    payload
}

/// Write raw data to a port mode
pub fn write_direct_mode(port: u8, mode: u8, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![
        HUB_ID,
        message_type::PORT_OUTPUT_COMMAND,
        port,
        STARTUP_AND_COMPLETION,
        WRITE_DIRECT_MODE_DATA,
        mode,
    ];
    payload.extend_from_slice(data);
    payload
}

/// Run a motor at `power` percent (-100..=100, 0 floats, 127 brakes)
pub fn start_power(port: u8, power: i8) -> Vec<u8> {
    write_direct_mode(port, 0, &[power as u8])
}

/// Set the hub light to a preset color
pub fn set_color(port: u8, color: Color) -> Vec<u8> {
    write_direct_mode(port, 0, &[color as u8])
}

/// Play one of the Duplo train sounds
pub fn play_sound(port: u8, sound: DuploSound) -> Vec<u8> {
    write_direct_mode(port, 1, &[sound as u8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_power() {
        assert_eq!(
            start_power(0, -50),
            vec![0x00, 0x81, 0x00, 0x11, 0x51, 0x00, 0xce]
        );
    }

    #[test]
    fn test_input_format_setup() {
        assert_eq!(
            port_input_format_setup(0x13, 1, 1, true),
            vec![0x00, 0x41, 0x13, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_light_and_sound() {
        assert_eq!(set_color(0x11, Color::Red)[6], 9);
        assert_eq!(&play_sound(0x01, DuploSound::Horn)[5..], &[0x01, 0x09]);
    }

    #[test]
    fn test_requests() {
        assert_eq!(
            hub_property(HubProperty::Button, PropertyOperation::EnableUpdates),
            vec![0x00, 0x01, 0x02, 0x02]
        );
        assert_eq!(port_information_request(0, 1), vec![0x00, 0x21, 0x00, 0x01]);
        assert_eq!(
            port_mode_information_request(0, 2, 0x80),
            vec![0x00, 0x22, 0x00, 0x02, 0x80]
        );
    }
}
