//! Error handling for TrainBrick
//!
//! Provides error types for each layer of the system:
//! - Connection errors (discovery, matching, adapter handshake)
//! - Protocol errors (framing and upstream message parsing)
//! - Hub errors (builder validation, peripheral lookups)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents failures of the discover → match → connect → subscribe
/// sequence and of the channels linking the core to the BLE adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// No matching device was seen before the scan budget ran out
    #[error("Device not found: no match for '{name}' after {rounds} scan rounds")]
    DeviceNotFound {
        /// The BLE name that was searched for.
        name: String,
        /// Number of discovery rounds that were performed.
        rounds: u32,
    },

    /// A device advertised more than one manufacturer-data entry
    #[error("Ambiguous advertisement from {address}: {entries} manufacturer-data entries")]
    AmbiguousAdvertisement {
        /// Address of the offending device.
        address: String,
        /// Number of manufacturer-data entries it advertised.
        entries: usize,
    },

    /// The hub already went through a successful connect
    #[error("Hub '{hub}' is already connected")]
    AlreadyConnected {
        /// Display name of the hub.
        hub: String,
    },

    /// The hub has not been connected yet
    #[error("Hub '{hub}' is not connected")]
    NotConnected {
        /// Display name of the hub.
        hub: String,
    },

    /// The adapter reported a failure for a discover or connect request
    #[error("Adapter failure: {reason}")]
    AdapterFailure {
        /// The reason reported by the adapter.
        reason: String,
    },

    /// The adapter answered a request with the wrong kind of response
    #[error("Unexpected adapter response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// The response kind that was expected.
        expected: String,
        /// The response kind that arrived.
        actual: String,
    },

    /// A channel to or from the adapter was closed
    #[error("Channel closed: {channel}")]
    ChannelClosed {
        /// Which channel was closed.
        channel: String,
    },
}

/// Protocol error type
///
/// Represents errors in the length-prefixed wire format and in parsing
/// upstream hub messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload does not fit in a one-byte length header
    #[error("Payload of {len} bytes is too long for a single frame (max {max})")]
    PayloadTooLong {
        /// Length of the rejected payload.
        len: usize,
        /// Largest payload that can be framed.
        max: usize,
    },

    /// The length header disagrees with the received byte count
    #[error("Frame length mismatch: header says {declared}, received {actual}")]
    LengthMismatch {
        /// Length declared in the first byte.
        declared: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// The frame ended before a required field
    #[error("Truncated message: missing {field}")]
    Truncated {
        /// Name of the missing field.
        field: String,
    },

    /// Message type without a parser
    #[error("Unknown message type 0x{msg_type:02x}")]
    UnknownMessageType {
        /// The message type byte.
        msg_type: u8,
    },

    /// A field carried a value outside its defined set
    #[error("Invalid {field} value 0x{value:02x}")]
    InvalidField {
        /// Name of the field.
        field: String,
        /// The value that was received.
        value: u8,
    },
}

/// Hub error type
///
/// Represents mistakes in hub declarations and peripheral lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// A sensing peripheral was declared without a change handler
    #[error("Hub '{hub}' needs a change handler for sensing peripheral '{peripheral}'")]
    MissingHandler {
        /// Display name of the hub.
        hub: String,
        /// Name of the peripheral lacking a handler.
        peripheral: String,
    },

    /// A change handler was registered for a peripheral that does not exist
    #[error("Hub '{hub}' has a handler for unknown peripheral '{peripheral}'")]
    OrphanHandler {
        /// Display name of the hub.
        hub: String,
        /// Name used by the handler.
        peripheral: String,
    },

    /// Two peripherals share the same name
    #[error("Hub '{hub}' declares peripheral '{peripheral}' twice")]
    DuplicatePeripheral {
        /// Display name of the hub.
        hub: String,
        /// The duplicated name.
        peripheral: String,
    },

    /// The hub has no run logic
    #[error("Hub '{hub}' has no run logic")]
    MissingLogic {
        /// Display name of the hub.
        hub: String,
    },

    /// No peripheral with the given name
    #[error("Unknown peripheral '{peripheral}'")]
    UnknownPeripheral {
        /// The name that was looked up.
        peripheral: String,
    },

    /// The peripheral has no capability with the given name
    #[error("Peripheral '{peripheral}' has no capability '{capability}'")]
    UnknownCapability {
        /// Name of the peripheral.
        peripheral: String,
        /// The capability that was looked up.
        capability: String,
    },

    /// The peripheral has not been assigned a port yet
    #[error("Peripheral '{peripheral}' is not attached to a port")]
    NotAttached {
        /// Name of the peripheral.
        peripheral: String,
    },
}

/// Main error type for TrainBrick
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Hub error
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is the scan-budget timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::DeviceNotFound { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a hub declaration error
    pub fn is_hub_error(&self) -> bool {
        matches!(self, Error::Hub(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::DeviceNotFound {
            name: "Train".to_string(),
            rounds: 60,
        };
        assert_eq!(
            err.to_string(),
            "Device not found: no match for 'Train' after 60 scan rounds"
        );

        let err = ConnectionError::AmbiguousAdvertisement {
            address: "90:84:2B:00:00:01".to_string(),
            entries: 2,
        };
        assert!(err.to_string().contains("2 manufacturer-data entries"));
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnknownMessageType { msg_type: 0x7f };
        assert_eq!(err.to_string(), "Unknown message type 0x7f");
    }

    #[test]
    fn test_error_classification() {
        let err: Error = ConnectionError::DeviceNotFound {
            name: "x".to_string(),
            rounds: 1,
        }
        .into();
        assert!(err.is_timeout());
        assert!(err.is_connection_error());
        assert!(!err.is_protocol_error());

        let err: Error = HubError::UnknownPeripheral {
            peripheral: "motor".to_string(),
        }
        .into();
        assert!(err.is_hub_error());
        assert!(!err.is_timeout());
    }
}
