/*!
 * Stream Connection
 * Control connection over a Unix domain socket with length-prefixed frames
 */

use super::inbox::FrameInbox;
use super::traits::{Connection, ReadCallback, WriteCallback};
use crate::core::bincode::{decode_frame_len, encode_frame, FRAME_HEADER_LEN};
use crate::core::config::{ContextConfig, DEFAULT_MAX_FRAME_SIZE};
use crate::core::errors::{TransportError, TransportResult};
use crate::core::types::Size;
use parking_lot::Mutex;
use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Framed connection over a `UnixStream`
///
/// A dedicated reader thread pulls frames off the socket and hands them to
/// armed reads; writes go straight to the socket under a lock.
pub struct StreamConnection {
    writer: Mutex<UnixStream>,
    inbox: Arc<FrameInbox>,
    closed: AtomicBool,
}

impl StreamConnection {
    /// Wrap a connected socket with the default frame limit
    pub fn new(stream: UnixStream) -> TransportResult<Arc<Self>> {
        Self::with_max_frame_size(stream, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Wrap a connected socket with the frame limit from `config`
    pub fn from_config(stream: UnixStream, config: &ContextConfig) -> TransportResult<Arc<Self>> {
        Self::with_max_frame_size(stream, config.max_frame_size)
    }

    /// Wrap a connected socket, rejecting frames above `max_frame_size`
    pub fn with_max_frame_size(stream: UnixStream, max_frame_size: Size) -> TransportResult<Arc<Self>> {
        let reader = stream.try_clone()?;
        let inbox = Arc::new(FrameInbox::new());

        let thread_inbox = inbox.clone();
        thread::Builder::new()
            .name("cma-stream-reader".to_string())
            .spawn(move || run_reader(reader, thread_inbox, max_frame_size))?;

        Ok(Arc::new(Self {
            writer: Mutex::new(stream),
            inbox,
            closed: AtomicBool::new(false),
        }))
    }

    /// Connected pair over a fresh socketpair
    pub fn pair() -> TransportResult<(Arc<Self>, Arc<Self>)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::new(left)?, Self::new(right)?))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn write_frame(&self, payload: &[u8]) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let frame = encode_frame(payload).map_err(|e| TransportError::Io(e.to_string()))?;
        let mut writer = self.writer.lock();
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }
}

impl Connection for StreamConnection {
    fn read(&self, callback: ReadCallback) {
        self.inbox.read(callback);
    }

    fn write(&self, frame: Vec<u8>, callback: WriteCallback) {
        callback(self.write_frame(&frame));
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing stream connection");
        // Wakes the reader thread with EOF
        if let Err(e) = self.writer.lock().shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                warn!(error = %e, "Stream shutdown failed");
            }
        }
        self.inbox.fail(TransportError::Closed, true);
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_reader(mut stream: UnixStream, inbox: Arc<FrameInbox>, max_frame_size: Size) {
    loop {
        match read_frame(&mut stream, max_frame_size) {
            Ok(Some(frame)) => {
                if inbox.deliver(frame).is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("Stream peer closed");
                inbox.fail(TransportError::Closed, false);
                break;
            }
            Err(e) => {
                if !inbox.is_failed() {
                    warn!(error = %e, "Stream read failed");
                }
                inbox.fail(e, false);
                break;
            }
        }
    }
}

/// Read one frame; `None` on a clean EOF between frames
fn read_frame(stream: &mut UnixStream, max_frame_size: Size) -> TransportResult<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match stream.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = decode_frame_len(header);
    if len > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(Some(payload))
}
