use std::cell::RefCell;
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

/// State that only one thread may ever touch.
///
/// The owner is fixed by the first successful [`ThreadBound::bind`]. Every other thread sees
/// `None` from [`ThreadBound::with`], so the value needs no lock.
pub(crate) struct ThreadBound<T> {
    owner: OnceLock<ThreadId>,
    value: RefCell<T>,
}

// SAFETY: the RefCell is only borrowed after `is_owner` confirms the calling thread, so at most
// one thread ever observes `value` by reference. Dropping may happen elsewhere, hence `T: Send`.
unsafe impl<T: Send> Sync for ThreadBound<T> {}

impl<T> ThreadBound<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            owner: OnceLock::new(),
            value: RefCell::new(value),
        }
    }

    /// Claim the value for the current thread. Returns `false` if another thread owns it.
    pub(crate) fn bind(&self) -> bool {
        let current = thread::current().id();
        *self.owner.get_or_init(|| current) == current
    }

    #[inline]
    pub(crate) fn owner(&self) -> Option<ThreadId> {
        self.owner.get().copied()
    }

    #[inline]
    pub(crate) fn is_owner(&self) -> bool {
        self.owner() == Some(thread::current().id())
    }

    /// Run `f` against the value if called on the owner thread and not already borrowed.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        if !self.is_owner() {
            return None;
        }
        let mut guard = self.value.try_borrow_mut().ok()?;
        Some(f(&mut guard))
    }
}
