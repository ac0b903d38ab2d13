/*!
 * Copy Worker
 *
 * Dedicated thread draining a FIFO of cross-process read requests. Each
 * request is one blocking `process_vm_readv`; requests never run in
 * parallel within a context and are never retried.
 */

use crate::core::errors::{ChannelError, ChannelResult, ContextError};
use crate::core::types::{Address, Pid, RemoteAddress, Size};
use crate::monitoring::span_copy;
use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::unistd::Pid as NixPid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::IoSliceMut;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, info, warn};

/// Source and destination of one copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub remote_pid: Pid,
    pub remote_addr: RemoteAddress,
    pub local_addr: Address,
    pub length: Size,
}

/// Primitive that moves bytes out of another process
///
/// Returns the number of bytes read, which may be short.
pub trait CopyEngine: Send + Sync + 'static {
    fn copy(&self, region: &CopyRegion) -> nix::Result<usize>;
}

/// Cross-memory attach through `process_vm_readv`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessVmEngine;

impl CopyEngine for ProcessVmEngine {
    fn copy(&self, region: &CopyRegion) -> nix::Result<usize> {
        if region.length == 0 {
            return Ok(0);
        }

        // SAFETY: whoever queued the request guarantees the destination is
        // valid for `length` bytes and untouched until completion.
        let local = unsafe {
            std::slice::from_raw_parts_mut(region.local_addr as *mut u8, region.length)
        };
        let remote = RemoteIoVec {
            base: region.remote_addr as usize,
            len: region.length,
        };

        process_vm_readv(
            NixPid::from_raw(region.remote_pid),
            &mut [IoSliceMut::new(local)],
            &[remote],
        )
    }
}

type CompletionFn = Box<dyn FnOnce(ChannelResult<()>) + Send + 'static>;

/// Exactly-once completion for a copy request
///
/// A completion dropped without being fired (request discarded at shutdown)
/// reports `ContextClosed`.
pub struct CopyCompletion {
    callback: Option<CompletionFn>,
}

impl CopyCompletion {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(ChannelResult<()>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    pub fn complete(mut self, result: ChannelResult<()>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for CopyCompletion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(ChannelError::ContextClosed));
        }
    }
}

/// One queued copy
pub struct CopyRequest {
    pub region: CopyRegion,
    pub completion: CopyCompletion,
}

/// Copy worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub bytes_copied: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    bytes_copied: AtomicU64,
}

/// Queue plus thread performing copies for one context
pub struct CopyWorker {
    requests: Mutex<Option<flume::Sender<Option<CopyRequest>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    counters: Arc<Counters>,
}

impl CopyWorker {
    /// Start the worker thread
    pub fn spawn(thread_name: String, engine: Arc<dyn CopyEngine>) -> Result<Self, ContextError> {
        let (tx, rx) = flume::unbounded::<Option<CopyRequest>>();
        let counters = Arc::new(Counters::default());

        let thread_counters = counters.clone();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_copy_loop(rx, engine, thread_counters))
            .map_err(|e| ContextError::WorkerSpawn(e.to_string()))?;

        info!(thread = %thread_name, "Copy worker started");

        Ok(Self {
            requests: Mutex::new(Some(tx)),
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
            counters,
        })
    }

    /// Queue a request; it completes with `ContextClosed` once shut down
    pub fn submit(&self, request: CopyRequest) {
        let rejected = {
            let requests = self.requests.lock();
            match requests.as_ref() {
                Some(tx) => match tx.send(Some(request)) {
                    Ok(()) => {
                        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                    Err(flume::SendError(returned)) => returned,
                },
                None => Some(request),
            }
        };

        // Completions run outside the lock, they may submit again
        if let Some(request) = rejected {
            request.completion.complete(Err(ChannelError::ContextClosed));
        }
    }

    /// Push the sentinel; the worker exits after the request in flight
    ///
    /// Nothing can be queued behind the sentinel, later calls do nothing.
    pub fn shutdown(&self) {
        if let Some(tx) = self.requests.lock().take() {
            let _ = tx.send(None);
        }
    }

    /// Wait for the worker thread to exit
    pub fn join(&self) {
        if thread::current().id() == self.thread_id {
            warn!("Copy worker asked to join itself, skipping");
            return;
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Copy worker thread panicked");
            }
        }
    }

    pub fn stats(&self) -> CopyStats {
        CopyStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            bytes_copied: self.counters.bytes_copied.load(Ordering::Relaxed),
        }
    }
}

fn run_copy_loop(
    requests: flume::Receiver<Option<CopyRequest>>,
    engine: Arc<dyn CopyEngine>,
    counters: Arc<Counters>,
) {
    while let Ok(Some(request)) = requests.recv() {
        let CopyRequest { region, completion } = request;
        let span = span_copy(region.remote_pid, region.length);
        let result = {
            let _entered = span.enter();
            execute(engine.as_ref(), &region)
        };
        span.record_result(result.is_ok());
        drop(span);

        match &result {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                counters
                    .bytes_copied
                    .fetch_add(region.length as u64, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    pid = region.remote_pid,
                    len = region.length,
                    error = %e,
                    "Copy failed"
                );
            }
        }

        completion.complete(result);
    }

    info!("Copy worker stopped");
}

fn execute(engine: &dyn CopyEngine, region: &CopyRegion) -> ChannelResult<()> {
    match engine.copy(region) {
        Err(errno) => Err(ChannelError::from_errno(errno)),
        Ok(n) if n != region.length => Err(ChannelError::ShortRead {
            expected: region.length,
            actual: n,
        }),
        Ok(_) => Ok(()),
    }
}
