/*!
 * Context
 *
 * Per-process owner of the copy worker, the domain fingerprint and the
 * closing registry that all of its channels subscribe to. Channels keep the
 * context state alive; the context only reaches its channels weakly.
 */

use super::channel::Channel;
use super::fingerprint::{probe_viability, DomainFingerprint};
use super::worker::{CopyEngine, CopyRequest, CopyStats, CopyWorker, ProcessVmEngine};
use crate::core::config::ContextConfig;
use crate::core::errors::{ChannelError, ChannelResult, ContextError};
use crate::core::sync::ClosingEmitter;
use crate::transport::Connection;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub(crate) struct ContextInner {
    id: String,
    config: ContextConfig,
    fingerprint: DomainFingerprint,
    engine: Arc<dyn CopyEngine>,
    worker: CopyWorker,
    closing: ClosingEmitter,
    closed: AtomicBool,
    joined: AtomicBool,
    join_lock: Mutex<()>,
    next_channel: AtomicU64,
}

impl ContextInner {
    pub(crate) fn closing(&self) -> &ClosingEmitter {
        &self.closing
    }

    pub(crate) fn request_copy(&self, request: CopyRequest) {
        self.worker.submit(request);
    }

    fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        info!(context = %self.id, "Closing context");
        // Channels first, so nothing new reaches the worker once it stops
        self.closing.close();
        self.worker.shutdown();
    }

    fn join(&self) {
        self.close();

        let _guard = self.join_lock.lock();
        if self
            .joined
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.worker.join();
            info!(context = %self.id, "Context joined");
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    config: ContextConfig,
    engine: Option<Arc<dyn CopyEngine>>,
}

impl ContextBuilder {
    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the `process_vm_readv` engine
    pub fn with_copy_engine(mut self, engine: Arc<dyn CopyEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> Result<Context, ContextError> {
        let config = self.config;
        let id = config
            .context_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let fingerprint = DomainFingerprint::generate(&config.channel_name, &config.boot_id_path)?;
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(ProcessVmEngine) as Arc<dyn CopyEngine>);
        let worker = CopyWorker::spawn(
            format!("{}-{}", config.worker_thread_name, id),
            engine.clone(),
        )?;

        info!(context = %id, fingerprint = %fingerprint, "Context created");

        Ok(Context {
            inner: Arc::new(ContextInner {
                id,
                config,
                fingerprint,
                engine,
                worker,
                closing: ClosingEmitter::new(),
                closed: AtomicBool::new(false),
                joined: AtomicBool::new(false),
                join_lock: Mutex::new(()),
                next_channel: AtomicU64::new(0),
            }),
        })
    }
}

/// Process-wide CMA context
///
/// Dropping the context closes every channel created from it and waits for
/// the copy worker to exit.
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Context with the default configuration
    pub fn new() -> Result<Self, ContextError> {
        Self::builder().build()
    }

    pub fn from_config(config: ContextConfig) -> Result<Self, ContextError> {
        Self::builder().with_config(config).build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder {
            config: ContextConfig::default(),
            engine: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Fingerprint to advertise to peers
    pub fn domain_fingerprint(&self) -> &str {
        self.inner.fingerprint.as_str()
    }

    pub fn fingerprint(&self) -> &DomainFingerprint {
        &self.inner.fingerprint
    }

    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    /// Whether cross-memory attach works here, checked on every call
    pub fn is_viable(&self) -> bool {
        probe_viability(&self.inner.config, self.inner.engine.as_ref())
    }

    pub fn stats(&self) -> CopyStats {
        self.inner.worker.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Wrap an established control connection into a channel
    pub fn create_channel(&self, connection: Arc<dyn Connection>) -> ChannelResult<Channel> {
        if self.is_closed() {
            connection.close();
            return Err(ChannelError::ContextClosed);
        }

        let n = self.inner.next_channel.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}.c{}", self.inner.id, n);
        debug!(context = %self.inner.id, channel = %id, "Creating channel");

        Ok(Channel::create(id, self.inner.clone(), connection))
    }

    /// Close every channel and stop accepting copies; idempotent
    pub fn close(&self) {
        self.inner.close();
    }

    /// Close, then wait for the copy worker to exit; idempotent
    pub fn join(&self) {
        self.inner.join();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("fingerprint", &self.inner.fingerprint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.inner.join();
    }
}
