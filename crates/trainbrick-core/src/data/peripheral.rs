//! Declarative peripheral descriptions
//!
//! A peripheral is a motor, sensor, light or speaker attached to a hub.
//! Programs declare the peripherals they expect; the hub reports which
//! port each one sits on through an attached-I/O message, at which point
//! the peripheral's port is assigned.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// LEGO I/O type identifiers reported in attached-I/O messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoType {
    /// Simple medium linear motor
    Motor,
    /// Train motor
    TrainMotor,
    /// Hub button
    Button,
    /// LED light
    LedLight,
    /// Battery voltage sensor
    Voltage,
    /// Current sensor
    Current,
    /// Piezo tone speaker
    PiezoTone,
    /// Hub RGB light
    RgbLight,
    /// External tilt sensor
    TiltSensor,
    /// Motion sensor
    MotionSensor,
    /// Color and distance sensor
    VisionSensor,
    /// External motor with tacho
    ExternalMotorWithTacho,
    /// Internal motor with tacho
    InternalMotorWithTacho,
    /// Internal tilt sensor
    InternalTilt,
    /// Duplo train motor
    DuploTrainMotor,
    /// Duplo train speaker
    DuploTrainSpeaker,
    /// Duplo train color sensor
    DuploTrainColor,
    /// Duplo train speedometer
    DuploTrainSpeedometer,
    /// Technic large motor
    TechnicLargeMotor,
    /// Technic XL motor
    TechnicXlMotor,
    /// Remote control button
    RemoteButton,
    /// Remote control signal level
    RemoteSignalLevel,
    /// Any type without a dedicated variant
    Other(u16),
}

impl IoType {
    /// Decode an I/O type id
    pub fn from_id(id: u16) -> Self {
        match id {
            0x01 => Self::Motor,
            0x02 => Self::TrainMotor,
            0x05 => Self::Button,
            0x08 => Self::LedLight,
            0x14 => Self::Voltage,
            0x15 => Self::Current,
            0x16 => Self::PiezoTone,
            0x17 => Self::RgbLight,
            0x22 => Self::TiltSensor,
            0x23 => Self::MotionSensor,
            0x25 => Self::VisionSensor,
            0x26 => Self::ExternalMotorWithTacho,
            0x27 => Self::InternalMotorWithTacho,
            0x28 => Self::InternalTilt,
            0x29 => Self::DuploTrainMotor,
            0x2A => Self::DuploTrainSpeaker,
            0x2B => Self::DuploTrainColor,
            0x2C => Self::DuploTrainSpeedometer,
            0x2E => Self::TechnicLargeMotor,
            0x2F => Self::TechnicXlMotor,
            0x37 => Self::RemoteButton,
            0x38 => Self::RemoteSignalLevel,
            other => Self::Other(other),
        }
    }

    /// The wire id of this type
    pub fn id(&self) -> u16 {
        match self {
            Self::Motor => 0x01,
            Self::TrainMotor => 0x02,
            Self::Button => 0x05,
            Self::LedLight => 0x08,
            Self::Voltage => 0x14,
            Self::Current => 0x15,
            Self::PiezoTone => 0x16,
            Self::RgbLight => 0x17,
            Self::TiltSensor => 0x22,
            Self::MotionSensor => 0x23,
            Self::VisionSensor => 0x25,
            Self::ExternalMotorWithTacho => 0x26,
            Self::InternalMotorWithTacho => 0x27,
            Self::InternalTilt => 0x28,
            Self::DuploTrainMotor => 0x29,
            Self::DuploTrainSpeaker => 0x2A,
            Self::DuploTrainColor => 0x2B,
            Self::DuploTrainSpeedometer => 0x2C,
            Self::TechnicLargeMotor => 0x2E,
            Self::TechnicXlMotor => 0x2F,
            Self::RemoteButton => 0x37,
            Self::RemoteSignalLevel => 0x38,
            Self::Other(id) => *id,
        }
    }
}

impl std::fmt::Display for IoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(id) => write!(f, "I/O type 0x{:04x}", id),
            known => write!(f, "{:?}", known),
        }
    }
}

/// Something a peripheral can do, tied to one of its modes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Capability name, e.g. "sense_speed"
    pub name: String,
    /// Port mode implementing the capability
    pub mode: u8,
    /// Whether the capability produces value updates
    pub sensing: bool,
}

impl Capability {
    /// A capability that reports values back to the hub program
    pub fn sense(name: impl Into<String>, mode: u8) -> Self {
        Self {
            name: name.into(),
            mode,
            sensing: true,
        }
    }

    /// A write-only capability
    pub fn output(name: impl Into<String>, mode: u8) -> Self {
        Self {
            name: name.into(),
            mode,
            sensing: false,
        }
    }
}

/// A peripheral declared on a hub
#[derive(Debug)]
pub struct Peripheral {
    name: String,
    io_type: IoType,
    declared_port: Option<u8>,
    capabilities: Vec<Capability>,
    port: RwLock<Option<u8>>,
}

impl Peripheral {
    /// Declare a peripheral of the given type
    pub fn new(name: impl Into<String>, io_type: IoType) -> Self {
        Self {
            name: name.into(),
            io_type,
            declared_port: None,
            capabilities: Vec::new(),
            port: RwLock::new(None),
        }
    }

    /// Duplo train motor (port 0)
    pub fn duplo_train_motor(name: impl Into<String>) -> Self {
        Self::new(name, IoType::DuploTrainMotor)
            .on_port(0)
            .with_capability(Capability::output("speed", 0))
    }

    /// Duplo train speaker (port 1)
    pub fn duplo_speaker(name: impl Into<String>) -> Self {
        Self::new(name, IoType::DuploTrainSpeaker)
            .on_port(1)
            .with_capability(Capability::output("sound", 1))
    }

    /// Hub RGB light
    pub fn rgb_light(name: impl Into<String>) -> Self {
        Self::new(name, IoType::RgbLight).with_capability(Capability::output("color", 0))
    }

    /// Duplo train speedometer
    pub fn duplo_speedometer(name: impl Into<String>) -> Self {
        Self::new(name, IoType::DuploTrainSpeedometer)
            .with_capability(Capability::sense("sense_speed", 0))
            .with_capability(Capability::sense("sense_count", 1))
    }

    /// Duplo train color sensor
    pub fn duplo_vision_sensor(name: impl Into<String>) -> Self {
        Self::new(name, IoType::DuploTrainColor)
            .with_capability(Capability::sense("sense_color", 0))
            .with_capability(Capability::sense("sense_reflectivity", 3))
    }

    /// Hub button, reported on pseudo port 255 through hub property updates
    pub fn hub_button(name: impl Into<String>) -> Self {
        Self::new(name, IoType::Button)
            .on_port(255)
            .with_capability(Capability::sense("sense_press", 0))
    }

    /// Whether the peripheral is built into the hub and never reported by
    /// an attached-I/O message
    pub fn is_builtin(&self) -> bool {
        self.io_type == IoType::Button && self.declared_port.is_some()
    }

    /// Expect the peripheral on a specific port
    pub fn on_port(mut self, port: u8) -> Self {
        self.declared_port = Some(port);
        self
    }

    /// Add a capability
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Peripheral name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// I/O type the hub reports for this peripheral
    pub fn io_type(&self) -> IoType {
        self.io_type
    }

    /// Port the program expects the peripheral on, if any
    pub fn declared_port(&self) -> Option<u8> {
        self.declared_port
    }

    /// Declared capabilities
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Look up a capability by name
    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    /// Whether any capability produces value updates
    pub fn needs_handler(&self) -> bool {
        self.capabilities.iter().any(|c| c.sensing)
    }

    /// Port assigned by the hub, if attached
    pub fn port(&self) -> Option<u8> {
        *self.port.read()
    }

    /// Whether the hub has assigned a port
    pub fn is_attached(&self) -> bool {
        self.port.read().is_some()
    }

    /// Record the port reported by an attached-I/O message
    pub fn assign_port(&self, port: u8) {
        *self.port.write() = Some(port);
    }

    /// Clear the port after a detach
    pub fn clear_port(&self) {
        *self.port.write() = None;
    }

    /// Whether an attach of `io_type` on `port` belongs to this peripheral
    pub fn accepts(&self, io_type: IoType, port: u8) -> bool {
        self.io_type == io_type && self.declared_port.map_or(true, |p| p == port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_type_round_trip_known_ids() {
        for id in [0x01u16, 0x17, 0x29, 0x2A, 0x2B, 0x2C, 0x37] {
            assert_eq!(IoType::from_id(id).id(), id);
        }
        assert_eq!(IoType::from_id(0x99), IoType::Other(0x99));
        assert_eq!(IoType::from_id(0x0117), IoType::Other(0x0117));
        assert_eq!(IoType::Other(0x0117).id(), 0x0117);
    }

    #[test]
    fn test_port_assignment() {
        let motor = Peripheral::duplo_train_motor("motor");
        assert!(!motor.is_attached());
        assert!(motor.accepts(IoType::DuploTrainMotor, 0));
        assert!(!motor.accepts(IoType::DuploTrainMotor, 1));
        assert!(!motor.accepts(IoType::RgbLight, 0));

        motor.assign_port(0);
        assert_eq!(motor.port(), Some(0));

        motor.clear_port();
        assert_eq!(motor.port(), None);
    }

    #[test]
    fn test_sensing_capabilities() {
        assert!(!Peripheral::rgb_light("light").needs_handler());
        let speed = Peripheral::duplo_speedometer("speed");
        assert!(speed.needs_handler());
        assert_eq!(speed.capability("sense_count").map(|c| c.mode), Some(1));
        // Undeclared port accepts any port of the right type
        assert!(speed.accepts(IoType::DuploTrainSpeedometer, 19));
    }

    #[test]
    fn test_hub_button_is_builtin() {
        let button = Peripheral::hub_button("button");
        assert!(button.is_builtin());
        assert!(button.needs_handler());
        assert_eq!(button.declared_port(), Some(255));
        assert!(!Peripheral::duplo_train_motor("motor").is_builtin());
    }
}
