/*!
 * Deferred Executor
 *
 * Single-flight FIFO task loop. Whichever thread enqueues into an idle
 * executor becomes its owner and drains the queue until empty; every other
 * thread (including the owner, when it enqueues from inside a task) only
 * appends. At most one thread runs tasks at any instant and tasks run in
 * submission order.
 */

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::thread::{self, ThreadId};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct LoopState {
    owner: Option<ThreadId>,
    tasks: VecDeque<Task>,
}

/// Per-object single-flight task queue
pub struct DeferredExecutor {
    state: Mutex<LoopState>,
}

impl Default for DeferredExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredExecutor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState {
                owner: None,
                tasks: VecDeque::new(),
            }),
        }
    }

    /// Whether the calling thread currently owns the loop
    pub fn in_loop(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Number of tasks waiting to run
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Enqueue a task, draining the queue if nobody else is
    ///
    /// The lock is never held while a task runs, so tasks may enqueue more
    /// work (which runs after them) without deadlocking.
    pub fn defer<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.state.lock();
            state.tasks.push_back(Box::new(task));
            if state.owner.is_some() {
                return;
            }
            state.owner = Some(thread::current().id());
        }

        let mut ownership = Ownership {
            executor: self,
            armed: true,
        };
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        state.owner = None;
                        ownership.disarm();
                        return;
                    }
                }
            };
            next();
        }
    }
}

/// Releases loop ownership if a task unwinds
struct Ownership<'a> {
    executor: &'a DeferredExecutor,
    armed: bool,
}

impl Ownership<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Ownership<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.executor.state.lock();
        if state.owner == Some(thread::current().id()) {
            state.owner = None;
        }
    }
}
