/*!
 * Loopback Connection
 * In-process connected pair, for tests and single-process setups
 */

use super::inbox::FrameInbox;
use super::traits::{Connection, ReadCallback, WriteCallback};
use crate::core::errors::TransportError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// One end of a loopback pair
pub struct LoopbackConnection {
    inbox: Arc<FrameInbox>,
    peer: Arc<FrameInbox>,
    closed: AtomicBool,
}

/// Create two connected ends
pub fn pair() -> (Arc<LoopbackConnection>, Arc<LoopbackConnection>) {
    let left = Arc::new(FrameInbox::new());
    let right = Arc::new(FrameInbox::new());

    (
        Arc::new(LoopbackConnection {
            inbox: left.clone(),
            peer: right.clone(),
            closed: AtomicBool::new(false),
        }),
        Arc::new(LoopbackConnection {
            inbox: right,
            peer: left,
            closed: AtomicBool::new(false),
        }),
    )
}

impl LoopbackConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Connection for LoopbackConnection {
    fn read(&self, callback: ReadCallback) {
        self.inbox.read(callback);
    }

    fn write(&self, frame: Vec<u8>, callback: WriteCallback) {
        if self.is_closed() {
            callback(Err(TransportError::Closed));
            return;
        }
        trace!(len = frame.len(), "Loopback frame written");
        callback(self.peer.deliver(frame));
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inbox.fail(TransportError::Closed, true);
        self.peer.fail(TransportError::Closed, false);
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.close();
    }
}
