/*!
 * Channel Wire Format
 * Transfer descriptors and control messages
 */

use crate::core::bincode;
use crate::core::errors::{BincodeError, ChannelError};
use crate::core::types::{OperationId, Pid, RemoteAddress};
use serde::{Deserialize, Serialize};

/// Reference to a source region, handed from sender to receiver out of band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    pub operation_id: OperationId,
    /// Process owning the source memory
    pub pid: Pid,
    /// Source address inside `pid`
    pub ptr: RemoteAddress,
}

impl TransferDescriptor {
    pub fn encode(&self) -> Result<Vec<u8>, BincodeError> {
        bincode::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ChannelError> {
        bincode::from_slice(bytes).map_err(|e| ChannelError::InvalidDescriptor(e.to_string()))
    }
}

/// Message exchanged on the control connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// The receiver finished its copy for this operation
    Notification { operation_id: OperationId },
}

impl ControlMessage {
    pub fn encode(&self) -> Result<Vec<u8>, BincodeError> {
        bincode::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ChannelError> {
        bincode::from_slice(bytes).map_err(|e| ChannelError::MalformedMessage(e.to_string()))
    }
}
