//! Upstream message parser
//!
//! One [`MessageParser`] is created per hub at connect time. It decodes each
//! notification, logs it and applies its side effects to the hub: attached
//! I/O assigns peripheral ports, port values reach the hub's listening task
//! and port information accumulates in the hub's port table.

use super::{
    message_type, DatasetType, HubMessage, HubProperty, IoEvent, ModeInformation,
    PortInformation, PropertyOperation, Revision, BUTTON_PORT,
};
use crate::communication::framing;
use crate::hub::Hub;
use std::sync::Arc;
use tokio::sync::mpsc;
use trainbrick_core::{
    CommunicationEvent, ErrorEvent, EventBus, IoType, PeripheralEvent, ProtocolError,
    SystemEvent,
};

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self, field: &str) -> Result<u8, ProtocolError> {
        let value = *self.data.get(self.pos).ok_or_else(|| truncated(field))?;
        self.pos += 1;
        Ok(value)
    }

    fn u16(&mut self, field: &str) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes([self.u8(field)?, self.u8(field)?]))
    }

    fn u32(&mut self, field: &str) -> Result<u32, ProtocolError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn f32(&mut self, field: &str) -> Result<f32, ProtocolError> {
        Ok(f32::from_bits(self.u32(field)?))
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos + len;
        let bytes = self.data.get(self.pos..end).ok_or_else(|| truncated(field))?;
        self.pos = end;
        Ok(bytes)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        rest
    }

    fn text(&mut self) -> String {
        self.rest()
            .iter()
            .filter(|b| **b != 0)
            .map(|b| *b as char)
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }
}

fn truncated(field: &str) -> ProtocolError {
    ProtocolError::Truncated {
        field: field.to_string(),
    }
}

/// Decode one framed upstream message
pub fn parse_message(frame: &[u8]) -> Result<HubMessage, ProtocolError> {
    let body = framing::decode(frame)?;
    let mut r = Reader::new(body);
    let _hub_id = r.u8("hub id")?;
    let msg_type = r.u8("message type")?;

    match msg_type {
        message_type::HUB_PROPERTIES => Ok(HubMessage::HubProperty {
            property: HubProperty::from_id(r.u8("property")?),
            operation: PropertyOperation::from_id(r.u8("operation")?),
            payload: r.rest().to_vec(),
        }),
        message_type::ATTACHED_IO => parse_attached_io(&mut r),
        message_type::GENERIC_ERROR => Ok(HubMessage::GenericError {
            command: r.u8("command type")?,
            code: r.u8("error code")?,
        }),
        message_type::PORT_INFORMATION => parse_port_information(&mut r),
        message_type::PORT_MODE_INFORMATION => parse_mode_information(&mut r),
        message_type::PORT_VALUE => Ok(HubMessage::PortValue {
            port: r.u8("port")?,
            value: r.rest().to_vec(),
        }),
        message_type::PORT_COMBO_VALUE => Ok(HubMessage::PortComboValue {
            port: r.u8("port")?,
            value: r.rest().to_vec(),
        }),
        message_type::PORT_OUTPUT_FEEDBACK => {
            let mut feedback = vec![(r.u8("port")?, r.u8("feedback")?)];
            while !r.is_empty() {
                feedback.push((r.u8("port")?, r.u8("feedback")?));
            }
            Ok(HubMessage::PortOutputFeedback(feedback))
        }
        other => Err(ProtocolError::UnknownMessageType { msg_type: other }),
    }
}

fn parse_attached_io(r: &mut Reader<'_>) -> Result<HubMessage, ProtocolError> {
    let port = r.u8("port")?;
    let event = match r.u8("event")? {
        0x00 => IoEvent::Detached,
        0x01 => IoEvent::Attached {
            io_type: IoType::from_id(r.u16("io type")?),
            hardware: Revision(r.u32("hardware revision")?),
            software: Revision(r.u32("software revision")?),
        },
        0x02 => IoEvent::VirtualAttached {
            io_type: IoType::from_id(r.u16("io type")?),
            port_a: r.u8("port a")?,
            port_b: r.u8("port b")?,
        },
        value => {
            return Err(ProtocolError::InvalidField {
                field: "attached io event".to_string(),
                value,
            })
        }
    };
    Ok(HubMessage::AttachedIo { port, event })
}

fn parse_port_information(r: &mut Reader<'_>) -> Result<HubMessage, ProtocolError> {
    let port = r.u8("port")?;
    let info = match r.u8("information type")? {
        0x01 => PortInformation::ModeInfo {
            capabilities: r.u8("capabilities")?,
            mode_count: r.u8("mode count")?,
            input_modes: r.u16("input modes")?,
            output_modes: r.u16("output modes")?,
        },
        0x02 => {
            let mut combinations = Vec::new();
            while !r.is_empty() {
                let mask = r.u16("mode combination")?;
                if mask == 0 {
                    break;
                }
                combinations.push((0..16u8).filter(|m| mask & (1 << m) != 0).collect());
            }
            PortInformation::Combinations(combinations)
        }
        value => {
            return Err(ProtocolError::InvalidField {
                field: "port information type".to_string(),
                value,
            })
        }
    };
    Ok(HubMessage::PortInformation { port, info })
}

fn parse_mode_information(r: &mut Reader<'_>) -> Result<HubMessage, ProtocolError> {
    let port = r.u8("port")?;
    let mode = r.u8("mode")?;
    let info = match r.u8("mode information type")? {
        0x00 => ModeInformation::Name(r.text()),
        0x01 => ModeInformation::RawRange {
            min: r.f32("raw min")?,
            max: r.f32("raw max")?,
        },
        0x02 => ModeInformation::PercentRange {
            min: r.f32("pct min")?,
            max: r.f32("pct max")?,
        },
        0x03 => ModeInformation::SiRange {
            min: r.f32("si min")?,
            max: r.f32("si max")?,
        },
        0x04 => ModeInformation::Symbol(r.text()),
        0x05 => ModeInformation::Mapping {
            input: r.u8("input mapping")?,
            output: r.u8("output mapping")?,
        },
        0x80 => ModeInformation::ValueFormat {
            datasets: r.u8("datasets")?,
            dataset_type: match r.u8("dataset type")? {
                0x00 => DatasetType::Int8,
                0x01 => DatasetType::Int16,
                0x02 => DatasetType::Int32,
                0x03 => DatasetType::Float,
                value => {
                    return Err(ProtocolError::InvalidField {
                        field: "dataset type".to_string(),
                        value,
                    })
                }
            },
            figures: r.u8("total figures")?,
            decimals: r.u8("decimals")?,
        },
        value => {
            return Err(ProtocolError::InvalidField {
                field: "mode information type".to_string(),
                value,
            })
        }
    };
    Ok(HubMessage::PortModeInformation { port, mode, info })
}

/// Per-hub consumer of inbound notifications
pub struct MessageParser {
    hub: Arc<Hub>,
    events: Arc<EventBus>,
}

impl MessageParser {
    pub fn new(hub: Arc<Hub>, events: Arc<EventBus>) -> Self {
        Self { hub, events }
    }

    /// Decode a frame and apply it to the hub
    pub fn handle(&self, frame: &[u8]) -> Result<HubMessage, ProtocolError> {
        let message = parse_message(frame)?;
        self.apply(&message);
        Ok(message)
    }

    fn apply(&self, message: &HubMessage) {
        let hub = self.hub.name();
        match message {
            HubMessage::AttachedIo { port, event } => match event {
                IoEvent::Detached => {
                    if let Some(peripheral) = self.hub.detach_port(*port) {
                        tracing::info!("{}: {} detached from port {}", hub, peripheral, port);
                    }
                    self.emit(SystemEvent::Peripheral(PeripheralEvent::Detached {
                        hub: hub.to_string(),
                        port: *port,
                    }));
                }
                IoEvent::Attached { io_type, .. } | IoEvent::VirtualAttached { io_type, .. } => {
                    if let IoEvent::VirtualAttached { port_a, port_b, .. } = event {
                        self.hub
                            .update_port_details(*port, |d| d.virtual_ports = Some((*port_a, *port_b)));
                    }
                    self.hub
                        .update_port_details(*port, |d| d.io_type = Some(*io_type));

                    match self.hub.attach_port(*io_type, *port) {
                        Some(peripheral) => {
                            tracing::info!("{}: {} attached on port {}", hub, peripheral, port);
                            self.emit(SystemEvent::Peripheral(PeripheralEvent::Attached {
                                hub: hub.to_string(),
                                peripheral,
                                port: *port,
                            }));
                        }
                        None => {
                            tracing::debug!("{}: no declared peripheral for {} on port {}", hub, io_type, port)
                        }
                    }
                }
            },
            HubMessage::PortInformation { port, info } => {
                self.hub
                    .update_port_details(*port, |d| d.apply_port_information(info));
            }
            HubMessage::PortModeInformation { port, mode, info } => {
                self.hub
                    .update_port_details(*port, |d| d.apply_mode_information(*mode, info));
            }
            HubMessage::PortValue { port, value } | HubMessage::PortComboValue { port, value } => {
                self.forward_value(*port, value);
            }
            HubMessage::HubProperty {
                property: HubProperty::Button,
                operation: PropertyOperation::Update,
                payload,
            } => {
                self.forward_value(BUTTON_PORT, payload);
            }
            HubMessage::GenericError { command, code } => {
                tracing::warn!("{}: hub reported error 0x{:02x} for command 0x{:02x}", hub, code, command);
            }
            HubMessage::HubProperty { .. } | HubMessage::PortOutputFeedback(_) => {}
        }
    }

    fn forward_value(&self, port: u8, value: &[u8]) {
        match self.hub.deliver_value(port, value.to_vec()) {
            Some(peripheral) => {
                self.emit(SystemEvent::Peripheral(PeripheralEvent::ValueChanged {
                    hub: self.hub.name().to_string(),
                    peripheral,
                    value: value.to_vec(),
                }));
            }
            None => tracing::debug!("{}: value for unassigned port {}", self.hub.name(), port),
        }
    }

    fn emit(&self, event: SystemEvent) {
        self.events.emit(event);
    }

    /// Consume frames until the listener is removed
    pub async fn run(self, mut frames: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(frame) = frames.recv().await {
            tracing::debug!("Raw data received from {}: {:02x?}", self.hub.name(), frame);
            match self.handle(&frame) {
                Ok(message) => {
                    tracing::debug!("{} Received: {}", self.hub.name(), message);
                    self.emit(SystemEvent::Communication(CommunicationEvent::MessageReceived {
                        hub: self.hub.name().to_string(),
                        summary: message.to_string(),
                    }));
                }
                Err(e) => {
                    tracing::warn!("{}: could not parse {:02x?}: {}", self.hub.name(), frame, e);
                    self.emit(SystemEvent::Error(ErrorEvent::ParseFailed {
                        hub: self.hub.name().to_string(),
                        error: e.to_string(),
                    }));
                }
            }
        }
        tracing::debug!("Parser for {} stopped", self.hub.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attached_io() {
        let frame = [
            0x0F, 0x00, 0x04, 0x00, 0x01, 0x29, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            0x10,
        ];
        match parse_message(&frame).unwrap() {
            HubMessage::AttachedIo {
                port: 0,
                event: IoEvent::Attached { io_type, hardware, .. },
            } => {
                assert_eq!(io_type, IoType::DuploTrainMotor);
                assert_eq!(hardware.to_string(), "1.0.00.0000");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_detach_and_virtual_attach() {
        assert_eq!(
            parse_message(&[0x05, 0x00, 0x04, 0x01, 0x00]).unwrap(),
            HubMessage::AttachedIo {
                port: 1,
                event: IoEvent::Detached
            }
        );
        assert_eq!(
            parse_message(&[0x09, 0x00, 0x04, 0x10, 0x02, 0x02, 0x00, 0x00, 0x01]).unwrap(),
            HubMessage::AttachedIo {
                port: 0x10,
                event: IoEvent::VirtualAttached {
                    io_type: IoType::TrainMotor,
                    port_a: 0,
                    port_b: 1
                }
            }
        );
    }

    #[test]
    fn test_io_type_keeps_high_byte() {
        assert_eq!(
            parse_message(&[0x09, 0x00, 0x04, 0x10, 0x02, 0x29, 0x01, 0x00, 0x01]).unwrap(),
            HubMessage::AttachedIo {
                port: 0x10,
                event: IoEvent::VirtualAttached {
                    io_type: IoType::Other(0x0129),
                    port_a: 0,
                    port_b: 1
                }
            }
        );
    }

    #[test]
    fn test_parse_port_value_and_button() {
        assert_eq!(
            parse_message(&[0x06, 0x00, 0x45, 0x13, 0x0a, 0x00]).unwrap(),
            HubMessage::PortValue {
                port: 0x13,
                value: vec![0x0a, 0x00]
            }
        );
        assert_eq!(
            parse_message(&[0x06, 0x00, 0x01, 0x02, 0x06, 0x01]).unwrap(),
            HubMessage::HubProperty {
                property: HubProperty::Button,
                operation: PropertyOperation::Update,
                payload: vec![0x01]
            }
        );
    }

    #[test]
    fn test_parse_port_information() {
        let msg = parse_message(&[0x0B, 0x00, 0x43, 0x00, 0x01, 0x01, 0x02, 0x00, 0x00, 0x03, 0x00]).unwrap();
        assert_eq!(
            msg,
            HubMessage::PortInformation {
                port: 0,
                info: PortInformation::ModeInfo {
                    capabilities: 0x01,
                    mode_count: 2,
                    input_modes: 0,
                    output_modes: 3
                }
            }
        );

        let msg = parse_message(&[0x09, 0x00, 0x43, 0x12, 0x02, 0x03, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(
            msg,
            HubMessage::PortInformation {
                port: 0x12,
                info: PortInformation::Combinations(vec![vec![0, 1]])
            }
        );
    }

    #[test]
    fn test_parse_mode_information() {
        let mut frame = vec![0x00, 0x00, 0x44, 0x00, 0x00, 0x01];
        frame.extend_from_slice(&0.0f32.to_le_bytes());
        frame.extend_from_slice(&100.0f32.to_le_bytes());
        frame[0] = frame.len() as u8;
        assert_eq!(
            parse_message(&frame).unwrap(),
            HubMessage::PortModeInformation {
                port: 0,
                mode: 0,
                info: ModeInformation::RawRange { min: 0.0, max: 100.0 }
            }
        );

        let frame = [0x0A, 0x00, 0x44, 0x00, 0x00, 0x00, b'P', b'O', b'W', 0x00];
        assert_eq!(
            parse_message(&frame).unwrap(),
            HubMessage::PortModeInformation {
                port: 0,
                mode: 0,
                info: ModeInformation::Name("POW".to_string())
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_message(&[0x03, 0x00, 0x7f]),
            Err(ProtocolError::UnknownMessageType { msg_type: 0x7f })
        );
        assert!(matches!(
            parse_message(&[0x04, 0x00, 0x04, 0x00]),
            Err(ProtocolError::Truncated { .. })
        ));
        assert!(matches!(
            parse_message(&[0x09, 0x00, 0x45]),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }
}
