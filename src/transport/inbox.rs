/*!
 * Frame Inbox
 * Matches arriving frames with armed reads, in order
 */

use super::traits::ReadCallback;
use crate::core::errors::{TransportError, TransportResult};
use parking_lot::Mutex;
use std::collections::VecDeque;

struct InboxState {
    frames: VecDeque<Vec<u8>>,
    readers: VecDeque<ReadCallback>,
    error: Option<TransportError>,
}

/// Receive side shared by the connection implementations
///
/// Callbacks are always invoked with the lock released.
pub(crate) struct FrameInbox {
    state: Mutex<InboxState>,
}

impl FrameInbox {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InboxState {
                frames: VecDeque::new(),
                readers: VecDeque::new(),
                error: None,
            }),
        }
    }

    /// Arm a read; completes immediately if a frame or an error is waiting
    pub fn read(&self, callback: ReadCallback) {
        let ready = {
            let mut state = self.state.lock();
            if let Some(frame) = state.frames.pop_front() {
                Ok(frame)
            } else if let Some(error) = state.error.clone() {
                Err(error)
            } else {
                state.readers.push_back(callback);
                return;
            }
        };
        callback(ready);
    }

    /// Hand a frame to the oldest waiting reader, or buffer it
    pub fn deliver(&self, frame: Vec<u8>) -> TransportResult<()> {
        let reader = {
            let mut state = self.state.lock();
            if let Some(error) = state.error.clone() {
                return Err(error);
            }
            match state.readers.pop_front() {
                Some(reader) => reader,
                None => {
                    state.frames.push_back(frame);
                    return Ok(());
                }
            }
        };
        reader(Ok(frame));
        Ok(())
    }

    /// Stop accepting frames and fail every waiting reader
    ///
    /// With `discard` unset, frames already buffered are still handed out
    /// before reads start failing (orderly shutdown by the peer).
    pub fn fail(&self, error: TransportError, discard: bool) {
        let readers: Vec<ReadCallback> = {
            let mut state = self.state.lock();
            if state.error.is_some() {
                return;
            }
            state.error = Some(error.clone());
            if discard {
                state.frames.clear();
            }
            state.readers.drain(..).collect()
        };
        for reader in readers {
            reader(Err(error.clone()));
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state.lock().error.is_some()
    }
}
