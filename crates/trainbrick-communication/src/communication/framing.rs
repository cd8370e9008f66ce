//! Length-prefixed framing of LEGO wireless protocol messages
//!
//! Every message on the hub characteristic starts with a single length byte
//! counting the whole frame, header included.

use trainbrick_core::ProtocolError;

/// Largest payload that still fits a one-byte length header
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 1;

/// Wrap a payload in a frame: `[len(payload) + 1] ++ payload`.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push((payload.len() + 1) as u8);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Validate the length header of an inbound frame and return the body.
pub fn decode(frame: &[u8]) -> Result<&[u8], ProtocolError> {
    let declared = *frame.first().ok_or_else(|| ProtocolError::Truncated {
        field: "length header".to_string(),
    })? as usize;

    if declared != frame.len() {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }

    Ok(&frame[1..])
}
