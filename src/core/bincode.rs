/*!
 * Binary Serialization with bincode
 * Wire encoding for descriptors, control messages and stream frames
 */

use serde::{de::DeserializeOwned, Serialize};

/// Result type for bincode operations
pub type BincodeResult<T> = Result<T, BincodeError>;

/// Binary serialization errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BincodeError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Size of the length prefix in front of every stream frame
pub const FRAME_HEADER_LEN: usize = 4;

// ============================================================================
// Serialization Functions
// ============================================================================

/// Serialize to binary bytes using bincode
///
/// Fixed-width little-endian integers, so a descriptor always has the same
/// size regardless of its field values.
#[inline]
pub fn to_vec<T: Serialize>(value: &T) -> BincodeResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| BincodeError::Serialization(e.to_string()))
}

/// Deserialize from binary bytes using bincode
///
/// Trailing bytes are rejected: a buffer must hold exactly one value.
#[inline]
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> BincodeResult<T> {
    use bincode::Options;

    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(bytes)
        .map_err(|e| BincodeError::Deserialization(e.to_string()))
}

// ============================================================================
// Stream Framing
// ============================================================================

/// Prefix a payload with its length
///
/// Format: [4-byte little-endian length][payload]
pub fn encode_frame(payload: &[u8]) -> BincodeResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        BincodeError::Serialization(format!("Frame of {} bytes is too large", payload.len()))
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read the payload length out of a frame header
#[inline]
pub fn decode_frame_len(header: [u8; FRAME_HEADER_LEN]) -> usize {
    u32::from_le_bytes(header) as usize
}
