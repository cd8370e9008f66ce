//! Event type definitions for the event bus.
//!
//! This module defines all system events organized by category.
//! Events are designed to be cloneable and serializable for logging/replay.

use serde::{Deserialize, Serialize};

/// Root event enum for all system events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemEvent {
    /// Discovery and connection lifecycle
    Connection(ConnectionEvent),
    /// Peripheral attach/detach and value updates
    Peripheral(PeripheralEvent),
    /// Traffic through the command queue and adapter
    Communication(CommunicationEvent),
    /// Error and diagnostic events
    Error(ErrorEvent),
}

impl SystemEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            SystemEvent::Connection(_) => EventCategory::Connection,
            SystemEvent::Peripheral(_) => EventCategory::Peripheral,
            SystemEvent::Communication(_) => EventCategory::Communication,
            SystemEvent::Error(_) => EventCategory::Error,
        }
    }

    /// Name of the hub the event concerns, if any
    pub fn hub(&self) -> Option<&str> {
        match self {
            SystemEvent::Connection(ConnectionEvent::AdapterShutdown) => None,
            SystemEvent::Connection(
                ConnectionEvent::Rescanning { hub, .. }
                | ConnectionEvent::DeviceMatched { hub, .. }
                | ConnectionEvent::Connected { hub, .. }
                | ConnectionEvent::ConnectionFailed { hub, .. },
            ) => Some(hub),
            SystemEvent::Peripheral(
                PeripheralEvent::Attached { hub, .. }
                | PeripheralEvent::Detached { hub, .. }
                | PeripheralEvent::ValueChanged { hub, .. },
            ) => Some(hub),
            SystemEvent::Communication(
                CommunicationEvent::FrameSent { hub, .. }
                | CommunicationEvent::MessageReceived { hub, .. },
            ) => Some(hub),
            SystemEvent::Error(
                ErrorEvent::ParseFailed { hub, .. } | ErrorEvent::HubTaskFailed { hub, .. },
            ) => Some(hub),
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            SystemEvent::Connection(e) => e.description(),
            SystemEvent::Peripheral(e) => e.description(),
            SystemEvent::Communication(e) => e.description(),
            SystemEvent::Error(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Discovery and connection events.
    Connection,
    /// Peripheral events.
    Peripheral,
    /// Queue and adapter traffic events.
    Communication,
    /// Error and diagnostic events.
    Error,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Peripheral => write!(f, "Peripheral"),
            EventCategory::Communication => write!(f, "Communication"),
            EventCategory::Error => write!(f, "Error"),
        }
    }
}

/// Connection-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// A discovery round found no match.
    Rescanning {
        /// Hub being searched for.
        hub: String,
        /// Discovery rounds left in the budget.
        remaining: u32,
    },
    /// A device matched the hub identity.
    DeviceMatched {
        /// Hub being connected.
        hub: String,
        /// Advertised name of the device.
        device_name: String,
        /// Address of the device.
        address: String,
    },
    /// The hub is connected and subscribed.
    Connected {
        /// Hub that connected.
        hub: String,
        /// Address of the device.
        address: String,
    },
    /// Connection attempt failed.
    ConnectionFailed {
        /// Hub that failed to connect.
        hub: String,
        /// Error message describing the failure.
        error: String,
    },
    /// The adapter was told to shut down.
    AdapterShutdown,
}

impl ConnectionEvent {
    fn description(&self) -> String {
        match self {
            ConnectionEvent::Rescanning { hub, remaining } => {
                format!("Rescanning for {} ({} tries left)", hub, remaining)
            }
            ConnectionEvent::DeviceMatched {
                hub,
                device_name,
                address,
            } => format!("{} matched {} ({})", hub, device_name, address),
            ConnectionEvent::Connected { hub, address } => {
                format!("Connected {} to {}", hub, address)
            }
            ConnectionEvent::ConnectionFailed { hub, error } => {
                format!("Connection failed for {}: {}", hub, error)
            }
            ConnectionEvent::AdapterShutdown => "Adapter shutdown requested".to_string(),
        }
    }
}

/// Peripheral events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeripheralEvent {
    /// A declared peripheral was assigned a port.
    Attached {
        /// Owning hub.
        hub: String,
        /// Peripheral name.
        peripheral: String,
        /// Assigned port.
        port: u8,
    },
    /// A port reported a detach.
    Detached {
        /// Owning hub.
        hub: String,
        /// Detached port.
        port: u8,
    },
    /// A sensing peripheral reported a new value.
    ValueChanged {
        /// Owning hub.
        hub: String,
        /// Peripheral name.
        peripheral: String,
        /// Raw value bytes.
        value: Vec<u8>,
    },
}

impl PeripheralEvent {
    fn description(&self) -> String {
        match self {
            PeripheralEvent::Attached {
                hub,
                peripheral,
                port,
            } => format!("{}: {} attached on port {}", hub, peripheral, port),
            PeripheralEvent::Detached { hub, port } => {
                format!("{}: port {} detached", hub, port)
            }
            PeripheralEvent::ValueChanged {
                hub,
                peripheral,
                value,
            } => format!("{}: {} = {:02x?}", hub, peripheral, value),
        }
    }
}

/// Queue and adapter traffic events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommunicationEvent {
    /// A framed command was handed to the adapter.
    FrameSent {
        /// Destination hub.
        hub: String,
        /// Framed length in bytes.
        len: usize,
    },
    /// An upstream message was parsed.
    MessageReceived {
        /// Source hub.
        hub: String,
        /// Human readable rendering of the message.
        summary: String,
    },
}

impl CommunicationEvent {
    fn description(&self) -> String {
        match self {
            CommunicationEvent::FrameSent { hub, len } => {
                format!("Sent {} bytes to {}", len, hub)
            }
            CommunicationEvent::MessageReceived { hub, summary } => {
                format!("{} Received: {}", hub, summary)
            }
        }
    }
}

/// Error and diagnostic events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ErrorEvent {
    /// An upstream frame could not be parsed.
    ParseFailed {
        /// Source hub.
        hub: String,
        /// Error message.
        error: String,
    },
    /// A hub run task returned an error.
    HubTaskFailed {
        /// Hub whose task failed.
        hub: String,
        /// Error message.
        error: String,
    },
}

impl ErrorEvent {
    fn description(&self) -> String {
        match self {
            ErrorEvent::ParseFailed { hub, error } => {
                format!("Parse error from {}: {}", hub, error)
            }
            ErrorEvent::HubTaskFailed { hub, error } => {
                format!("Hub {} failed: {}", hub, error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_category() {
        let event = SystemEvent::Connection(ConnectionEvent::AdapterShutdown);
        assert_eq!(event.category(), EventCategory::Connection);

        let event = SystemEvent::Peripheral(PeripheralEvent::Detached {
            hub: "train".to_string(),
            port: 1,
        });
        assert_eq!(event.category(), EventCategory::Peripheral);
    }

    #[test]
    fn test_event_description() {
        let event = SystemEvent::Connection(ConnectionEvent::Rescanning {
            hub: "train".to_string(),
            remaining: 59,
        });
        assert_eq!(event.description(), "Rescanning for train (59 tries left)");

        let event = SystemEvent::Peripheral(PeripheralEvent::ValueChanged {
            hub: "train".to_string(),
            peripheral: "speed".to_string(),
            value: vec![0x0a, 0xff],
        });
        assert_eq!(event.description(), "train: speed = [0a, ff]");
    }

    #[test]
    fn test_event_serialization() {
        let event = SystemEvent::Communication(CommunicationEvent::FrameSent {
            hub: "train".to_string(),
            len: 9,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("FrameSent"));
    }
}
