use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::directory::{DirectoryRouter, ThreadDirectory, WorkerDirectory};
use crate::error::{CaptureError, CaptureResult};
use crate::hook::HookBackend;
use crate::host::HostFactory;
use crate::settings::CaptureSettings;
use crate::worker::CaptureWorker;

/// Process-wide capture service.
///
/// Owns the device interception and every worker it creates. Intercepted calls are routed by the
/// calling thread's id to the worker running on that thread.
pub struct HookRegistry {
    backend: Box<dyn HookBackend>,
    directory: Arc<dyn WorkerDirectory>,
    hosts: Arc<dyn HostFactory>,
    settings: CaptureSettings,
    /// Serializes `init` and `uninit`; never taken by the worker-facing calls.
    transition: Mutex<()>,
    installed: AtomicBool,
}

impl HookRegistry {
    pub fn new(
        backend: impl HookBackend + 'static,
        hosts: Arc<dyn HostFactory>,
        settings: CaptureSettings,
    ) -> Self {
        Self::with_directory(backend, hosts, settings, Arc::new(ThreadDirectory::new()))
    }

    pub fn with_directory(
        backend: impl HookBackend + 'static,
        hosts: Arc<dyn HostFactory>,
        settings: CaptureSettings,
        directory: Arc<dyn WorkerDirectory>,
    ) -> Self {
        Self {
            backend: Box::new(backend),
            directory,
            hosts,
            settings,
            transition: Mutex::new(()),
            installed: AtomicBool::new(false),
        }
    }

    /// Install the interception. Calling it again after success does nothing.
    pub fn init(&self) -> CaptureResult<()> {
        let _transition = self.transition.lock();
        if self.installed.load(Ordering::Acquire) {
            return Ok(());
        }

        let router = Arc::new(DirectoryRouter::new(Arc::clone(&self.directory)));
        self.backend.install(router)?;
        self.installed.store(true, Ordering::Release);
        tracing::info!("capture hooks installed");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Stop every worker, then remove the interception. Safe without a prior `init`.
    pub fn uninit(&self) {
        let _transition = self.transition.lock();
        let was_installed = self.installed.swap(false, Ordering::AcqRel);

        let workers = self.directory.drain();
        if !workers.is_empty() {
            tracing::debug!(count = workers.len(), "stopping capture workers");
        }
        for worker in workers {
            worker.stop();
        }

        if was_installed {
            self.backend.uninstall();
            tracing::info!("capture hooks removed");
        }
    }

    /// Start a new worker and register it under its thread.
    pub fn create_magnifier(&self) -> CaptureResult<Arc<CaptureWorker>> {
        if !self.is_initialized() {
            return Err(CaptureError::NotInitialized);
        }

        let worker = CaptureWorker::new(Arc::clone(&self.hosts), self.settings.clone());
        let thread = worker.start()?;

        if let Err(e) = self.directory.register(thread, Arc::clone(&worker)) {
            debug_assert!(false, "capture worker registered twice for {thread:?}");
            tracing::error!(error = %e, "capture worker registration failed");
            worker.stop();
            return Err(e);
        }

        // An `uninit` that ran since the check above already drained the directory.
        if !self.is_initialized() {
            self.destroy_magnifier(&worker);
            return Err(CaptureError::NotInitialized);
        }
        Ok(worker)
    }

    /// Unregister `worker` and stop it.
    pub fn destroy_magnifier(&self, worker: &Arc<CaptureWorker>) {
        if let Some(thread) = worker.thread_id() {
            match self.directory.unregister(thread) {
                Some(registered) if !Arc::ptr_eq(&registered, worker) => {
                    tracing::warn!(?thread, "thread was registered to another worker");
                    let _ = self.directory.register(thread, registered);
                }
                _ => {}
            }
        }
        worker.stop();
    }

    pub fn worker_count(&self) -> usize {
        self.directory.len()
    }

    pub fn directory(&self) -> &Arc<dyn WorkerDirectory> {
        &self.directory
    }
}

impl Drop for HookRegistry {
    fn drop(&mut self) {
        self.uninit();
    }
}
