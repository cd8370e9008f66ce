//! LEGO wireless protocol messages
//!
//! Upstream messages are decoded into [`HubMessage`] by [`parser`];
//! downstream payloads are built by [`commands`]. Both sides exclude the
//! length byte, which belongs to the framing layer.

pub mod commands;
pub mod parser;

use std::collections::BTreeMap;
use std::fmt;
use trainbrick_core::IoType;

pub use commands::{Color, DuploSound};
pub use parser::{parse_message, MessageParser};

/// Message type bytes
pub mod message_type {
    /// Hub properties
    pub const HUB_PROPERTIES: u8 = 0x01;
    /// Attached I/O
    pub const ATTACHED_IO: u8 = 0x04;
    /// Generic error
    pub const GENERIC_ERROR: u8 = 0x05;
    /// Port information request
    pub const PORT_INFORMATION_REQUEST: u8 = 0x21;
    /// Port mode information request
    pub const PORT_MODE_INFORMATION_REQUEST: u8 = 0x22;
    /// Port input format setup (single)
    pub const PORT_INPUT_FORMAT_SETUP: u8 = 0x41;
    /// Port information
    pub const PORT_INFORMATION: u8 = 0x43;
    /// Port mode information
    pub const PORT_MODE_INFORMATION: u8 = 0x44;
    /// Port value (single)
    pub const PORT_VALUE: u8 = 0x45;
    /// Port value (combined mode)
    pub const PORT_COMBO_VALUE: u8 = 0x46;
    /// Port output command
    pub const PORT_OUTPUT_COMMAND: u8 = 0x81;
    /// Port output command feedback
    pub const PORT_OUTPUT_FEEDBACK: u8 = 0x82;
}

/// Pseudo port the hub button reports on
pub const BUTTON_PORT: u8 = 255;

/// Hub property ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubProperty {
    AdvertisingName,
    Button,
    FirmwareVersion,
    HardwareVersion,
    Rssi,
    BatteryVoltage,
    BatteryType,
    ManufacturerName,
    RadioFirmwareVersion,
    ProtocolVersion,
    SystemTypeId,
    NetworkId,
    PrimaryMac,
    SecondaryMac,
    NetworkFamily,
    Other(u8),
}

impl HubProperty {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x01 => Self::AdvertisingName,
            0x02 => Self::Button,
            0x03 => Self::FirmwareVersion,
            0x04 => Self::HardwareVersion,
            0x05 => Self::Rssi,
            0x06 => Self::BatteryVoltage,
            0x07 => Self::BatteryType,
            0x08 => Self::ManufacturerName,
            0x09 => Self::RadioFirmwareVersion,
            0x0A => Self::ProtocolVersion,
            0x0B => Self::SystemTypeId,
            0x0C => Self::NetworkId,
            0x0D => Self::PrimaryMac,
            0x0E => Self::SecondaryMac,
            0x0F => Self::NetworkFamily,
            other => Self::Other(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::AdvertisingName => 0x01,
            Self::Button => 0x02,
            Self::FirmwareVersion => 0x03,
            Self::HardwareVersion => 0x04,
            Self::Rssi => 0x05,
            Self::BatteryVoltage => 0x06,
            Self::BatteryType => 0x07,
            Self::ManufacturerName => 0x08,
            Self::RadioFirmwareVersion => 0x09,
            Self::ProtocolVersion => 0x0A,
            Self::SystemTypeId => 0x0B,
            Self::NetworkId => 0x0C,
            Self::PrimaryMac => 0x0D,
            Self::SecondaryMac => 0x0E,
            Self::NetworkFamily => 0x0F,
            Self::Other(id) => *id,
        }
    }
}

/// Hub property operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOperation {
    Set,
    EnableUpdates,
    DisableUpdates,
    Reset,
    RequestUpdate,
    Update,
    Other(u8),
}

impl PropertyOperation {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x01 => Self::Set,
            0x02 => Self::EnableUpdates,
            0x03 => Self::DisableUpdates,
            0x04 => Self::Reset,
            0x05 => Self::RequestUpdate,
            0x06 => Self::Update,
            other => Self::Other(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Set => 0x01,
            Self::EnableUpdates => 0x02,
            Self::DisableUpdates => 0x03,
            Self::Reset => 0x04,
            Self::RequestUpdate => 0x05,
            Self::Update => 0x06,
            Self::Other(id) => *id,
        }
    }
}

/// Hardware or software revision as packed by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision(pub u32);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = (self.0 >> 28) & 0x7;
        let minor = (self.0 >> 24) & 0xF;
        let bugfix = (self.0 >> 16) & 0xFF;
        let build = self.0 & 0xFFFF;
        write!(f, "{}.{}.{:02x}.{:04x}", major, minor, bugfix, build)
    }
}

/// Body of an attached-I/O message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoEvent {
    Detached,
    Attached {
        io_type: IoType,
        hardware: Revision,
        software: Revision,
    },
    VirtualAttached {
        io_type: IoType,
        port_a: u8,
        port_b: u8,
    },
}

/// Body of a port information message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortInformation {
    /// Capabilities bitmask (output, input, combinable, synchronizable),
    /// number of modes and the input/output mode bitmasks
    ModeInfo {
        capabilities: u8,
        mode_count: u8,
        input_modes: u16,
        output_modes: u16,
    },
    /// Mode combinations the port supports, each a list of modes
    Combinations(Vec<Vec<u8>>),
}

/// Body of a port mode information message
#[derive(Debug, Clone, PartialEq)]
pub enum ModeInformation {
    Name(String),
    RawRange { min: f32, max: f32 },
    PercentRange { min: f32, max: f32 },
    SiRange { min: f32, max: f32 },
    Symbol(String),
    Mapping { input: u8, output: u8 },
    ValueFormat {
        datasets: u8,
        dataset_type: DatasetType,
        figures: u8,
        decimals: u8,
    },
}

/// Numeric type of a mode's datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetType {
    Int8,
    Int16,
    Int32,
    Float,
}

/// A decoded upstream message
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    HubProperty {
        property: HubProperty,
        operation: PropertyOperation,
        payload: Vec<u8>,
    },
    AttachedIo {
        port: u8,
        event: IoEvent,
    },
    GenericError {
        command: u8,
        code: u8,
    },
    PortInformation {
        port: u8,
        info: PortInformation,
    },
    PortModeInformation {
        port: u8,
        mode: u8,
        info: ModeInformation,
    },
    PortValue {
        port: u8,
        value: Vec<u8>,
    },
    PortComboValue {
        port: u8,
        value: Vec<u8>,
    },
    /// Feedback pairs of (port, feedback bits)
    PortOutputFeedback(Vec<(u8, u8)>),
}

impl fmt::Display for HubMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubMessage::HubProperty {
                property,
                operation,
                payload,
            } => write!(f, "Hub property {:?} {:?}: {:02x?}", property, operation, payload),
            HubMessage::AttachedIo { port, event } => match event {
                IoEvent::Detached => write!(f, "Detached IO Port:{}", port),
                IoEvent::Attached {
                    io_type,
                    hardware,
                    software,
                } => write!(
                    f,
                    "Attached IO Port:{} {} HW:{} SW:{}",
                    port, io_type, hardware, software
                ),
                IoEvent::VirtualAttached {
                    io_type,
                    port_a,
                    port_b,
                } => write!(
                    f,
                    "Attached VirtualIO Port:{} {} Port A: {}, Port B: {}",
                    port, io_type, port_a, port_b
                ),
            },
            HubMessage::GenericError { command, code } => {
                write!(f, "Error 0x{:02x} for command 0x{:02x}", code, command)
            }
            HubMessage::PortInformation { port, info } => match info {
                PortInformation::ModeInfo {
                    capabilities,
                    mode_count,
                    input_modes,
                    output_modes,
                } => write!(
                    f,
                    "Port {} INFO: caps {:04b}, nModes:{}, input:{:016b}, output:{:016b}",
                    port, capabilities, mode_count, input_modes, output_modes
                ),
                PortInformation::Combinations(combinations) => {
                    write!(f, "Port {} Combinations: {:?}", port, combinations)
                }
            },
            HubMessage::PortModeInformation { port, mode, info } => {
                write!(f, "MODE INFO Port:{} Mode:{} {:?}", port, mode, info)
            }
            HubMessage::PortValue { port, value } => {
                write!(f, "Port {} changed value to {:02x?}", port, value)
            }
            HubMessage::PortComboValue { port, value } => {
                write!(f, "Port {} changed combo value to {:02x?}", port, value)
            }
            HubMessage::PortOutputFeedback(feedback) => {
                write!(f, "Command feedback:")?;
                for (port, bits) in feedback {
                    write!(f, " Port {} {}", port, describe_feedback(*bits))?;
                }
                Ok(())
            }
        }
    }
}

fn describe_feedback(bits: u8) -> String {
    let flags = [
        (0x01, "in progress"),
        (0x02, "completed"),
        (0x04, "discarded"),
        (0x08, "idle"),
        (0x10, "busy"),
    ];
    let names: Vec<&str> = flags
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    format!("[{}]", names.join(","))
}

/// What a hub told us about one of its modes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeDetails {
    pub input: bool,
    pub output: bool,
    pub name: Option<String>,
    pub raw_range: Option<(f32, f32)>,
    pub pct_range: Option<(f32, f32)>,
    pub si_range: Option<(f32, f32)>,
    pub symbol: Option<String>,
    pub mapping: Option<(u8, u8)>,
    pub value_format: Option<(u8, DatasetType, u8, u8)>,
}

/// Accumulated information about one port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortDetails {
    pub io_type: Option<IoType>,
    pub capabilities: u8,
    pub mode_count: u8,
    pub combinations: Vec<Vec<u8>>,
    pub virtual_ports: Option<(u8, u8)>,
    pub modes: BTreeMap<u8, ModeDetails>,
}

impl PortDetails {
    /// Fold a port information message into the record
    pub fn apply_port_information(&mut self, info: &PortInformation) {
        match info {
            PortInformation::ModeInfo {
                capabilities,
                mode_count,
                input_modes,
                output_modes,
            } => {
                self.capabilities = *capabilities;
                self.mode_count = *mode_count;
                for mode in 0..16u8 {
                    if input_modes & (1 << mode) != 0 {
                        self.modes.entry(mode).or_default().input = true;
                    }
                    if output_modes & (1 << mode) != 0 {
                        self.modes.entry(mode).or_default().output = true;
                    }
                }
            }
            PortInformation::Combinations(combinations) => {
                self.combinations = combinations.clone();
            }
        }
    }

    /// Fold a port mode information message into the record
    pub fn apply_mode_information(&mut self, mode: u8, info: &ModeInformation) {
        let details = self.modes.entry(mode).or_default();
        match info {
            ModeInformation::Name(name) => details.name = Some(name.clone()),
            ModeInformation::RawRange { min, max } => details.raw_range = Some((*min, *max)),
            ModeInformation::PercentRange { min, max } => details.pct_range = Some((*min, *max)),
            ModeInformation::SiRange { min, max } => details.si_range = Some((*min, *max)),
            ModeInformation::Symbol(symbol) => details.symbol = Some(symbol.clone()),
            ModeInformation::Mapping { input, output } => details.mapping = Some((*input, *output)),
            ModeInformation::ValueFormat {
                datasets,
                dataset_type,
                figures,
                decimals,
            } => details.value_format = Some((*datasets, *dataset_type, *figures, *decimals)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_display() {
        assert_eq!(Revision(0x1000_0000).to_string(), "1.0.00.0000");
        assert_eq!(Revision(0x1102_0017).to_string(), "1.1.02.0017");
    }

    #[test]
    fn test_port_details_accumulate() {
        let mut details = PortDetails::default();
        details.apply_port_information(&PortInformation::ModeInfo {
            capabilities: 0b0110,
            mode_count: 2,
            input_modes: 0b01,
            output_modes: 0b10,
        });
        details.apply_mode_information(0, &ModeInformation::Name("SPEED".to_string()));

        assert_eq!(details.mode_count, 2);
        assert!(details.modes[&0].input);
        assert!(details.modes[&1].output);
        assert_eq!(details.modes[&0].name.as_deref(), Some("SPEED"));
    }

    #[test]
    fn test_feedback_display() {
        let msg = HubMessage::PortOutputFeedback(vec![(0, 0x0a)]);
        assert_eq!(msg.to_string(), "Command feedback: Port 0 [completed,idle]");
    }
}
