/*!
 * CMA Channel Library
 * Zero-copy-style bulk transfer between processes on one host through
 * cross-memory attach
 */

pub mod channel;
pub mod core;
pub mod monitoring;
pub mod transport;

// Re-exports
pub use crate::channel::{
    Channel, ChannelPhase, Context, ContextBuilder, ControlMessage, CopyEngine, CopyRegion, CopyStats,
    DomainFingerprint, ProcessVmEngine, TransferDescriptor,
};
pub use crate::core::{ChannelError, ChannelResult, ContextConfig, ContextError, TransportError};
pub use crate::transport::{Connection, LoopbackConnection, StreamConnection};
