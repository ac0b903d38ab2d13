/*!
 * Transport Module
 * Control connections carrying channel acknowledgements
 */

mod inbox;
pub mod loopback;
pub mod stream;
pub mod traits;

// Re-export public API
pub use loopback::LoopbackConnection;
pub use stream::StreamConnection;
pub use traits::{Connection, ReadCallback, WriteCallback};
