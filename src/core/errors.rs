/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::{OperationId, Size};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use crate::core::bincode::BincodeError;

/// Errors observed by channel callbacks
///
/// Copy-level failures (`SystemFailure`, `ShortRead`) only ever reach the
/// receiving side. Everything else is sticky channel state.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ChannelError {
    #[error("Cross-memory copy failed: {}", errno_desc(.code))]
    #[diagnostic(
        code(channel::system_failure),
        help("process_vm_readv was refused. Both processes need matching credentials and a permissive ptrace scope.")
    )]
    SystemFailure { code: i32 },

    #[error("Short read: expected {expected} bytes, got {actual}")]
    #[diagnostic(
        code(channel::short_read),
        help("The remote region ended early. Check that the sender's buffer covers the requested length.")
    )]
    ShortRead { expected: Size, actual: Size },

    #[error("Channel closed")]
    #[diagnostic(
        code(channel::closed),
        help("The channel was closed explicitly, by its context, or after a control connection fault.")
    )]
    ChannelClosed,

    #[error("Protocol violation: notification for unknown operation {operation_id}")]
    #[diagnostic(
        code(channel::protocol_violation),
        help("The peer acknowledged an operation this channel never issued. The control stream cannot be trusted.")
    )]
    ProtocolViolation { operation_id: OperationId },

    #[error("Malformed control message: {0}")]
    #[diagnostic(
        code(channel::malformed_message),
        help("A control frame did not decode. The peer may be running an incompatible version.")
    )]
    MalformedMessage(String),

    #[error("Invalid transfer descriptor: {0}")]
    #[diagnostic(
        code(channel::invalid_descriptor),
        help("Pass the exact bytes produced by the sender's descriptor callback.")
    )]
    InvalidDescriptor(String),

    #[error("Context closed")]
    #[diagnostic(
        code(channel::context_closed),
        help("The owning context was closed before the operation could run.")
    )]
    ContextClosed,
}

impl ChannelError {
    /// Error for a failed syscall
    pub fn from_errno(errno: nix::errno::Errno) -> Self {
        ChannelError::SystemFailure { code: errno as i32 }
    }
}

fn errno_desc(code: &i32) -> &'static str {
    nix::errno::Errno::from_raw(*code).desc()
}

/// Errors raised while building a context
#[derive(Error, Debug, Diagnostic)]
pub enum ContextError {
    #[error("Unable to read boot id from {}: {reason}", .path.display())]
    #[diagnostic(
        code(context::boot_id),
        help("The domain fingerprint needs the kernel boot id. Is /proc mounted?")
    )]
    BootId { path: PathBuf, reason: String },

    #[error("Failed to spawn copy worker: {0}")]
    #[diagnostic(
        code(context::worker_spawn),
        help("The process may have hit its thread limit.")
    )]
    WorkerSpawn(String),
}

/// Errors reported by control connections
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TransportError {
    #[error("Connection closed")]
    #[diagnostic(code(transport::closed))]
    Closed,

    #[error("Connection I/O error: {0}")]
    #[diagnostic(
        code(transport::io),
        help("The underlying socket failed. The peer process may have exited.")
    )]
    Io(String),

    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    #[diagnostic(
        code(transport::frame_too_large),
        help("Raise max_frame_size in ContextConfig or check for stream corruption.")
    )]
    FrameTooLarge { size: Size, max: Size },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Result type for channel operations
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// Result type for connection operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;
