/*!
 * Closing Registry
 *
 * Non-owning broadcast of a one-shot "please close" signal. Subscribers are
 * held weakly, so the emitter never keeps them alive; a subscriber that has
 * already been dropped is simply skipped.
 */

use ahash::HashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Something that can be asked to close by an emitter
pub trait ClosingListener: Send + Sync {
    /// Called at most once, outside of the registry lock
    fn on_close(self: Arc<Self>);
}

struct Registry {
    next_token: u64,
    listeners: HashMap<u64, Weak<dyn ClosingListener>>,
    closed: bool,
}

/// Broadcast point owned by a context
pub struct ClosingEmitter {
    registry: Arc<Mutex<Registry>>,
}

impl Default for ClosingEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClosingEmitter {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_token: 0,
                listeners: HashMap::default(),
                closed: false,
            })),
        }
    }

    /// Register a listener
    ///
    /// Returns `None` when the emitter has already fired; the caller then
    /// has to close itself since no signal will ever arrive.
    pub fn subscribe(&self, listener: Weak<dyn ClosingListener>) -> Option<ClosingReceiver> {
        let mut registry = self.registry.lock();
        if registry.closed {
            return None;
        }

        let token = registry.next_token;
        registry.next_token += 1;
        registry.listeners.insert(token, listener);

        Some(ClosingReceiver {
            token,
            registry: Arc::downgrade(&self.registry),
        })
    }

    /// Signal every live listener; later calls do nothing
    pub fn close(&self) {
        let listeners: Vec<Arc<dyn ClosingListener>> = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return;
            }
            registry.closed = true;
            registry
                .listeners
                .drain()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };

        debug!(listeners = listeners.len(), "Broadcasting close");

        for listener in listeners {
            listener.on_close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    /// Number of registered listeners, dead or alive
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

/// Subscription handle; dropping it unregisters the listener
pub struct ClosingReceiver {
    token: u64,
    registry: Weak<Mutex<Registry>>,
}

impl std::fmt::Debug for ClosingReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosingReceiver")
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for ClosingReceiver {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().listeners.remove(&self.token);
        }
    }
}
