/*!
 * Connection Traits
 * Boundary between channels and the framed byte transport under them
 */

use crate::core::errors::TransportResult;

/// Completion for a read: one whole frame or the reason none will come
pub type ReadCallback = Box<dyn FnOnce(TransportResult<Vec<u8>>) + Send + 'static>;

/// Completion for a write
pub type WriteCallback = Box<dyn FnOnce(TransportResult<()>) + Send + 'static>;

/// Reliable, ordered, message-framed connection
///
/// Callbacks may run synchronously inside the call that armed them or later
/// on a transport thread. Every callback runs exactly once; after `close`
/// outstanding and future reads complete with an error.
pub trait Connection: Send + Sync {
    /// Arm a read of the next frame
    fn read(&self, callback: ReadCallback);

    /// Queue one frame for delivery to the peer
    fn write(&self, frame: Vec<u8>, callback: WriteCallback);

    /// Close both directions; idempotent
    fn close(&self);
}
