use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::RwLock;

use crate::device::RenderDevice;
use crate::error::{CaptureError, CaptureResult};
use crate::hook::HookRouter;
use crate::worker::CaptureWorker;

/// Maps worker threads to their workers so intercepted calls find their session.
pub trait WorkerDirectory: Send + Sync {
    fn register(&self, thread: ThreadId, worker: Arc<CaptureWorker>) -> CaptureResult<()>;

    /// Remove and return the worker registered for `thread`.
    fn unregister(&self, thread: ThreadId) -> Option<Arc<CaptureWorker>>;

    fn lookup(&self, thread: ThreadId) -> Option<Arc<CaptureWorker>>;

    /// Remove every entry.
    fn drain(&self) -> Vec<Arc<CaptureWorker>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-mostly thread map: lookups happen on every present, writes only on create/destroy.
#[derive(Default)]
pub struct ThreadDirectory {
    workers: RwLock<HashMap<ThreadId, Arc<CaptureWorker>>>,
}

impl ThreadDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerDirectory for ThreadDirectory {
    fn register(&self, thread: ThreadId, worker: Arc<CaptureWorker>) -> CaptureResult<()> {
        let mut workers = self.workers.write();
        if workers.contains_key(&thread) {
            return Err(CaptureError::DuplicateRegistration(thread));
        }
        workers.insert(thread, worker);
        Ok(())
    }

    fn unregister(&self, thread: ThreadId) -> Option<Arc<CaptureWorker>> {
        self.workers.write().remove(&thread)
    }

    fn lookup(&self, thread: ThreadId) -> Option<Arc<CaptureWorker>> {
        self.workers.read().get(&thread).cloned()
    }

    fn drain(&self) -> Vec<Arc<CaptureWorker>> {
        self.workers.write().drain().map(|(_, worker)| worker).collect()
    }

    fn len(&self) -> usize {
        self.workers.read().len()
    }
}

/// Sends intercepted calls to the worker that owns the calling thread; calls from other threads
/// pass through untouched.
pub struct DirectoryRouter {
    directory: Arc<dyn WorkerDirectory>,
}

impl DirectoryRouter {
    pub fn new(directory: Arc<dyn WorkerDirectory>) -> Self {
        Self { directory }
    }

    fn current_worker(&self) -> Option<Arc<CaptureWorker>> {
        self.directory.lookup(thread::current().id())
    }
}

impl HookRouter for DirectoryRouter {
    fn on_present(&self, device: &dyn RenderDevice) {
        let Some(worker) = self.current_worker() else {
            return;
        };
        if let Err(e) = worker.on_present(device) {
            tracing::trace!(error = %e, "frame snapshot skipped");
        }
    }

    fn on_reset(&self) {
        if let Some(worker) = self.current_worker() {
            worker.invalidate_device();
        }
    }
}
