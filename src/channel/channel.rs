/*!
 * Channel
 *
 * Per-peer send/receive/acknowledge state machine. Every entry point, public
 * or transport callback, is funneled through the channel's deferred
 * executor, so all state below is only touched by the thread currently
 * owning that loop.
 */

use super::context::ContextInner;
use super::wire::{ControlMessage, TransferDescriptor};
use super::worker::{CopyCompletion, CopyRegion, CopyRequest};
use crate::core::errors::{ChannelError, ChannelResult, TransportError};
use crate::core::sync::{ClosingListener, ClosingReceiver, DeferredExecutor};
use crate::core::types::{current_pid, Address, OperationId, Size};
use crate::transport::Connection;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Receives the serialized descriptor produced by a send
pub type DescriptorCallback = Box<dyn FnOnce(ChannelResult<Vec<u8>>) + Send + 'static>;

/// Completion of a send or a receive
pub type CompletionCallback = Box<dyn FnOnce(ChannelResult<()>) + Send + 'static>;

/// Channel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    Created,
    /// Subscribing to the context and arming the first read
    Initializing,
    Active,
    /// Terminal; entered on close or on any control connection fault
    Closed,
}

struct SendOperation {
    id: OperationId,
    callback: CompletionCallback,
}

struct ChannelState {
    phase: ChannelPhase,
    error: Option<ChannelError>,
    next_operation_id: OperationId,
    pending_sends: VecDeque<SendOperation>,
    closing_receiver: Option<ClosingReceiver>,
}

pub(crate) struct ChannelInner {
    id: String,
    context: Arc<ContextInner>,
    connection: Arc<dyn Connection>,
    executor: DeferredExecutor,
    // Only locked for short sections, never while running callbacks
    state: Mutex<ChannelState>,
}

/// Cross-memory channel to one peer
///
/// Created by [`Context::create_channel`](super::Context::create_channel).
/// Dropping the handle closes the channel; outstanding callbacks still fire.
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn create(
        id: String,
        context: Arc<ContextInner>,
        connection: Arc<dyn Connection>,
    ) -> Self {
        let inner = Arc::new(ChannelInner {
            id,
            context,
            connection,
            executor: DeferredExecutor::new(),
            state: Mutex::new(ChannelState {
                phase: ChannelPhase::Created,
                error: None,
                next_operation_id: 0,
                pending_sends: VecDeque::new(),
                closing_receiver: None,
            }),
        });
        inner.init();
        Self { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn phase(&self) -> ChannelPhase {
        self.inner.state.lock().phase
    }

    /// Offer `length` bytes at `ptr` to the peer
    ///
    /// `descriptor_callback` receives the bytes the caller must deliver to
    /// the peer out of band; `callback` fires once the peer acknowledges its
    /// copy, or with the channel error if the channel closes first. The
    /// region must stay valid and unmodified until then.
    pub fn send<D, F>(&self, ptr: *const u8, length: Size, descriptor_callback: D, callback: F)
    where
        D: FnOnce(ChannelResult<Vec<u8>>) + Send + 'static,
        F: FnOnce(ChannelResult<()>) + Send + 'static,
    {
        let ptr = ptr as Address;
        let descriptor_callback: DescriptorCallback = Box::new(descriptor_callback);
        let callback: CompletionCallback = Box::new(callback);
        self.inner.defer(move |inner| {
            inner.send_from_loop(ptr, length, descriptor_callback, callback)
        });
    }

    /// Copy the region named by `descriptor` into `length` bytes at `ptr`
    ///
    /// `callback` reports the outcome of the local copy. The peer is
    /// acknowledged whether or not the copy succeeded.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `length` bytes and must not be read
    /// or written by anyone else until `callback` has run.
    pub unsafe fn recv<F>(&self, descriptor: Vec<u8>, ptr: *mut u8, length: Size, callback: F)
    where
        F: FnOnce(ChannelResult<()>) + Send + 'static,
    {
        let ptr = ptr as Address;
        let callback: CompletionCallback = Box::new(callback);
        self.inner.defer(move |inner| {
            inner.recv_from_loop(descriptor, ptr, length, callback)
        });
    }

    /// Close the channel; pending sends fail with `ChannelClosed`
    pub fn close(&self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl ClosingListener for ChannelInner {
    fn on_close(self: Arc<Self>) {
        self.close();
    }
}

impl ChannelInner {
    fn defer<F>(self: &Arc<Self>, task: F)
    where
        F: FnOnce(&Arc<Self>) + Send + 'static,
    {
        let inner = Arc::clone(self);
        self.executor.defer(move || task(&inner));
    }

    fn error(&self) -> Option<ChannelError> {
        self.state.lock().error.clone()
    }

    fn init(self: &Arc<Self>) {
        self.defer(|inner| inner.init_from_loop());
    }

    fn close(self: &Arc<Self>) {
        self.defer(|inner| inner.fail(ChannelError::ChannelClosed));
    }

    fn init_from_loop(self: &Arc<Self>) {
        debug_assert!(self.executor.in_loop());
        self.state.lock().phase = ChannelPhase::Initializing;

        let weak: Weak<ChannelInner> = Arc::downgrade(self);
        let listener: Weak<dyn ClosingListener> = weak;
        match self.context.closing().subscribe(listener) {
            Some(receiver) => {
                let mut state = self.state.lock();
                state.closing_receiver = Some(receiver);
                state.phase = ChannelPhase::Active;
            }
            None => {
                debug!(channel = %self.id, "Context already closed");
                self.fail(ChannelError::ChannelClosed);
                return;
            }
        }

        debug!(channel = %self.id, "Channel initialized");
        self.read_packet();
    }

    fn send_from_loop(
        self: &Arc<Self>,
        ptr: Address,
        length: Size,
        descriptor_callback: DescriptorCallback,
        callback: CompletionCallback,
    ) {
        debug_assert!(self.executor.in_loop());

        let posted = {
            let mut state = self.state.lock();
            match state.error.clone() {
                Some(error) => Err((error, callback)),
                None => {
                    let id = state.next_operation_id;
                    state.next_operation_id += 1;

                    let descriptor = TransferDescriptor {
                        operation_id: id,
                        pid: current_pid(),
                        ptr: ptr as u64,
                    };
                    match descriptor.encode() {
                        Ok(bytes) => {
                            state.pending_sends.push_back(SendOperation { id, callback });
                            Ok((id, bytes))
                        }
                        Err(e) => Err((ChannelError::InvalidDescriptor(e.to_string()), callback)),
                    }
                }
            }
        };

        match posted {
            Ok((id, bytes)) => {
                debug!(channel = %self.id, operation_id = id, len = length, "Send posted");
                descriptor_callback(Ok(bytes));
            }
            Err((error, callback)) => {
                descriptor_callback(Err(error.clone()));
                callback(Err(error));
            }
        }
    }

    fn recv_from_loop(
        self: &Arc<Self>,
        descriptor: Vec<u8>,
        ptr: Address,
        length: Size,
        callback: CompletionCallback,
    ) {
        debug_assert!(self.executor.in_loop());

        if let Some(error) = self.error() {
            callback(Err(error));
            return;
        }

        let descriptor = match TransferDescriptor::decode(&descriptor) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                warn!(channel = %self.id, error = %error, "Rejected descriptor");
                callback(Err(error));
                return;
            }
        };

        let id = descriptor.operation_id;
        debug!(
            channel = %self.id,
            operation_id = id,
            pid = descriptor.pid,
            len = length,
            "Requesting copy"
        );

        let inner = Arc::clone(self);
        let completion = CopyCompletion::new(move |result| {
            inner.defer(move |inner| inner.on_copy_complete(id, result, callback));
        });

        self.context.request_copy(CopyRequest {
            region: CopyRegion {
                remote_pid: descriptor.pid,
                remote_addr: descriptor.ptr,
                local_addr: ptr,
                length,
            },
            completion,
        });
    }

    fn on_copy_complete(
        self: &Arc<Self>,
        id: OperationId,
        result: ChannelResult<()>,
        callback: CompletionCallback,
    ) {
        debug_assert!(self.executor.in_loop());

        if let Some(error) = self.error() {
            debug!(channel = %self.id, operation_id = id, "Copy finished after close");
            callback(Err(error));
            return;
        }

        // The sender is acknowledged even when the copy failed
        self.write_notification(id);
        callback(result);
    }

    fn write_notification(self: &Arc<Self>, id: OperationId) {
        let frame = match (ControlMessage::Notification { operation_id: id }).encode() {
            Ok(frame) => frame,
            Err(e) => {
                self.fail(ChannelError::MalformedMessage(e.to_string()));
                return;
            }
        };

        let inner = Arc::clone(self);
        self.connection.write(
            frame,
            Box::new(move |result| {
                if let Err(e) = result {
                    inner.defer(move |inner| inner.on_transport_error("write", e));
                }
            }),
        );
    }

    /// Arm the connection for the next control message
    fn read_packet(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.connection.read(Box::new(move |result| {
            inner.defer(move |inner| inner.on_packet(result));
        }));
    }

    fn on_packet(self: &Arc<Self>, result: Result<Vec<u8>, TransportError>) {
        debug_assert!(self.executor.in_loop());

        if self.error().is_some() {
            return;
        }

        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                self.on_transport_error("read", e);
                return;
            }
        };

        match ControlMessage::decode(&frame) {
            Ok(ControlMessage::Notification { operation_id }) => {
                if !self.on_notification(operation_id) {
                    return;
                }
            }
            Err(error) => {
                warn!(channel = %self.id, error = %error, "Undecodable control frame");
                self.fail(error);
                return;
            }
        }

        self.read_packet();
    }

    /// Complete the matching send; false if the channel had to be failed
    fn on_notification(self: &Arc<Self>, id: OperationId) -> bool {
        let operation = {
            let mut state = self.state.lock();
            state
                .pending_sends
                .iter()
                .position(|op| op.id == id)
                .and_then(|index| state.pending_sends.remove(index))
        };

        match operation {
            Some(operation) => {
                debug!(channel = %self.id, operation_id = id, "Send acknowledged");
                (operation.callback)(Ok(()));
                true
            }
            None => {
                warn!(channel = %self.id, operation_id = id, "Notification for unknown operation");
                self.fail(ChannelError::ProtocolViolation { operation_id: id });
                false
            }
        }
    }

    fn on_transport_error(self: &Arc<Self>, direction: &str, error: TransportError) {
        if self.error().is_none() {
            debug!(channel = %self.id, direction, error = %error, "Control connection failed");
        }
        self.fail(ChannelError::ChannelClosed);
    }

    /// Enter the terminal state once; later calls do nothing
    fn fail(self: &Arc<Self>, error: ChannelError) {
        let (pending, receiver) = {
            let mut state = self.state.lock();
            if state.error.is_some() {
                return;
            }
            state.error = Some(error.clone());
            state.phase = ChannelPhase::Closed;
            (
                std::mem::take(&mut state.pending_sends),
                state.closing_receiver.take(),
            )
        };
        drop(receiver);

        if error == ChannelError::ChannelClosed {
            info!(channel = %self.id, pending = pending.len(), "Channel closed");
        } else {
            warn!(channel = %self.id, pending = pending.len(), error = %error, "Channel failed");
        }

        for operation in pending {
            (operation.callback)(Err(error.clone()));
        }
        self.connection.close();
    }
}
