/*!
 * Channel Module
 * Contexts, channels and the copy machinery behind them
 */

#[allow(clippy::module_inception)]
mod channel;
mod context;
pub mod fingerprint;
pub mod wire;
pub mod worker;

// Re-export public API
pub use channel::{Channel, ChannelPhase, CompletionCallback, DescriptorCallback};
pub use context::{Context, ContextBuilder};
pub use fingerprint::DomainFingerprint;
pub use wire::{ControlMessage, TransferDescriptor};
pub use worker::{CopyEngine, CopyRegion, CopyStats, ProcessVmEngine};
