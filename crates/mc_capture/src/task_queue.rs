use std::mem;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::host::HostWaker;

/// Deferred action executed on the worker thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct QueueState {
    pending: Vec<Task>,
    waker: Option<Arc<dyn HostWaker>>,
    closed: bool,
}

/// FIFO of actions that run on one owner thread.
///
/// Other threads append under a short lock and wake the owner's event loop; the owner drains the
/// whole list at once and runs it outside the lock.
pub struct TaskQueue {
    owner: OnceLock<ThreadId>,
    state: Mutex<QueueState>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            owner: OnceLock::new(),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Make the current thread the queue's owner. Only the first call has an effect.
    pub fn bind_owner(&self) {
        let _ = self.owner.set(thread::current().id());
    }

    #[inline]
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.get().copied()
    }

    #[inline]
    pub fn is_owner_thread(&self) -> bool {
        self.owner() == Some(thread::current().id())
    }

    /// Install the waker used to signal the owner. Tasks queued earlier stay pending until the
    /// owner calls [`TaskQueue::run_pending`].
    pub fn attach_waker(&self, waker: Arc<dyn HostWaker>) {
        let mut state = self.state.lock();
        if !state.closed {
            state.waker = Some(waker);
        }
    }

    /// Queue `task`, or run it right away when called on the owner thread.
    pub fn push(&self, task: impl FnOnce() + Send + 'static) {
        if self.is_owner_thread() {
            task();
            return;
        }

        let waker = {
            let mut state = self.state.lock();
            if state.closed {
                None
            } else {
                state.pending.push(Box::new(task));
                state.waker.clone()
            }
        };

        // Wake outside the lock; a dead window just leaves the task to be dropped on close.
        if let Some(waker) = waker
            && !waker.wake()
        {
            tracing::trace!("task queued after host window went away");
        }
    }

    /// Run everything queued so far, in order. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let tasks = mem::take(&mut self.state.lock().pending);
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Stop accepting work and drop everything still pending.
    pub fn close(&self) {
        let dropped = {
            let mut state = self.state.lock();
            state.closed = true;
            state.waker = None;
            mem::take(&mut state.pending)
        };
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "dropping tasks queued after shutdown");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}
