/*!
 * Synchronization Primitives
 *
 * - Deferred executor: single-flight task loop giving each channel the
 *   illusion of single-threaded execution
 * - Closing registry: weak broadcast used by a context to close its channels
 */

mod closing;
mod deferred;

pub use closing::{ClosingEmitter, ClosingListener, ClosingReceiver};
pub use deferred::DeferredExecutor;
