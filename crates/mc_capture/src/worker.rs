use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::device::{DeviceBinding, MappedSurface, RenderDevice};
use crate::error::{CaptureError, CaptureResult};
use crate::frame::{BufferPool, Frame};
use crate::host::{CaptureHost, HostEvent, HostFactory, HostOptions};
use crate::mailbox::{FrameMailbox, VideoPoll};
use crate::settings::{CaptureSettings, clamp_fps, tick_interval};
use crate::task_queue::TaskQueue;
use crate::thread_bound::ThreadBound;
use crate::types::{
    CaptureRegion, DeviceId, ExcludeList, FrameShape, SurfaceDesc, SurfaceFormat, WindowHandle,
};

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

struct Lifecycle {
    state: WorkerState,
    thread: Option<JoinHandle<()>>,
    thread_id: Option<ThreadId>,
}

/// What the compositor is pointed at. Only the worker thread reads or writes it.
#[derive(Debug, Default)]
struct ViewState {
    region: CaptureRegion,
    exclude: ExcludeList,
    exclude_dirty: bool,
    fps: u32,
    fps_dirty: bool,
    close_requested: bool,
}

/// Host updates collected from [`ViewState`] so they can be applied without borrowing it.
struct ViewChanges {
    exclude: Option<ExcludeList>,
    fps: Option<u32>,
    close: bool,
}

/// One capture session: a dedicated thread with its compositor host, a task queue into that
/// thread, and a latest-wins frame mailbox out of it.
pub struct CaptureWorker {
    settings: CaptureSettings,
    hosts: Arc<dyn HostFactory>,
    lifecycle: Mutex<Lifecycle>,
    stopped: Condvar,
    tasks: TaskQueue,
    mailbox: FrameMailbox,
    pool: Arc<BufferPool>,
    view: ThreadBound<ViewState>,
    device: ThreadBound<Option<DeviceBinding>>,
    frames_published: AtomicU64,
}

impl CaptureWorker {
    pub fn new(hosts: Arc<dyn HostFactory>, settings: CaptureSettings) -> Arc<Self> {
        let view = ViewState {
            fps: settings.effective_fps(),
            ..ViewState::default()
        };
        Arc::new(Self {
            mailbox: FrameMailbox::new(settings.liveness_timeout()),
            settings,
            hosts,
            lifecycle: Mutex::new(Lifecycle {
                state: WorkerState::Created,
                thread: None,
                thread_id: None,
            }),
            stopped: Condvar::new(),
            tasks: TaskQueue::new(),
            pool: BufferPool::new(),
            view: ThreadBound::new(view),
            device: ThreadBound::new(None),
            frames_published: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.lock().state
    }

    /// Id of the worker thread, once started.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.lifecycle.lock().thread_id
    }

    #[inline]
    pub fn is_worker_thread(&self) -> bool {
        self.tasks.is_owner_thread()
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Spawn the worker thread and wait until its host window is up.
    ///
    /// Returns the worker thread's id; hook callbacks arriving on that thread are routed here.
    pub fn start(self: &Arc<Self>) -> CaptureResult<ThreadId> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<CaptureResult<()>>(1);

        let thread_id = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != WorkerState::Created {
                tracing::error!(state = ?lifecycle.state, "capture worker started twice");
                return Err(CaptureError::AlreadyStarted);
            }

            let worker = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(self.settings.thread_name.clone())
                .spawn(move || worker.run(ready_tx));
            let handle = match handle {
                Ok(handle) => handle,
                Err(e) => {
                    lifecycle.state = WorkerState::Stopped;
                    self.tasks.close();
                    return Err(e.into());
                }
            };

            let thread_id = handle.thread().id();
            lifecycle.state = WorkerState::Starting;
            lifecycle.thread = Some(handle);
            lifecycle.thread_id = Some(thread_id);
            thread_id
        };

        let outcome = match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(CaptureError::WorkerExited),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(?thread_id, "capture worker started");
                Ok(thread_id)
            }
            Err(e) => {
                tracing::error!(error = %e, "capture worker failed to start");
                let handle = self.lifecycle.lock().thread.take();
                if let Some(handle) = handle {
                    let _ = handle.join();
                }
                self.lifecycle.lock().state = WorkerState::Stopped;
                Err(e)
            }
        }
    }

    /// Destroy the host window and wait for the worker thread to exit. No-op unless running.
    ///
    /// A stop racing another one waits until the thread is gone. Must not be called from the
    /// worker thread itself.
    pub fn stop(self: &Arc<Self>) {
        if self.is_worker_thread() {
            debug_assert!(false, "CaptureWorker::stop called on its own worker thread");
            tracing::error!("capture worker cannot stop itself from its own thread");
            return;
        }

        let handle = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                WorkerState::Starting | WorkerState::Running => {
                    lifecycle.state = WorkerState::Stopping;
                    lifecycle.thread.take()
                }
                WorkerState::Created => {
                    // Never started: release whatever was queued so the tasks' references drop.
                    lifecycle.state = WorkerState::Stopped;
                    drop(lifecycle);
                    self.tasks.close();
                    return;
                }
                WorkerState::Stopping => {
                    while lifecycle.state != WorkerState::Stopped {
                        self.stopped.wait(&mut lifecycle);
                    }
                    return;
                }
                WorkerState::Stopped => return,
            }
        };

        let worker = Arc::clone(self);
        self.tasks.push(move || {
            worker.view.with(|view| view.close_requested = true);
        });

        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!("capture worker thread panicked");
        }

        self.lifecycle.lock().state = WorkerState::Stopped;
        self.stopped.notify_all();
        tracing::info!("capture worker stopped");
    }

    pub fn set_capture_region(self: &Arc<Self>, region: CaptureRegion) {
        let worker = Arc::clone(self);
        self.tasks.push(move || {
            worker.view.with(|view| view.region = region);
        });
    }

    pub fn set_exclude_windows(self: &Arc<Self>, windows: impl IntoIterator<Item = WindowHandle>) {
        let exclude = ExcludeList::new(windows);
        let worker = Arc::clone(self);
        self.tasks.push(move || {
            worker.view.with(|view| {
                view.exclude = exclude;
                view.exclude_dirty = true;
            });
        });
    }

    /// Change the tick rate; values under 10 fps are raised to 10.
    pub fn set_fps(self: &Arc<Self>, fps: u32) {
        let fps = clamp_fps(fps);
        let worker = Arc::clone(self);
        self.tasks.push(move || {
            worker.view.with(|view| {
                if view.fps != fps {
                    view.fps = fps;
                    view.fps_dirty = true;
                }
            });
        });
    }

    /// Take the pending frame, if any, plus the liveness flag.
    pub fn pop_video(&self) -> VideoPoll {
        self.mailbox.pop()
    }

    /// Snapshot `device`'s render target. Called from inside the device's present call.
    pub fn on_present(&self, device: &dyn RenderDevice) -> CaptureResult<()> {
        self.device
            .with(|slot| self.snapshot(slot, device))
            .unwrap_or(Err(CaptureError::WrongThread))
    }

    /// Drop the device binding and its staging surface. Returns `true` if one existed.
    pub fn invalidate_device(&self) -> bool {
        let released = self
            .device
            .with(|slot| slot.take().is_some())
            .unwrap_or(false);
        if released {
            tracing::debug!("device binding released");
        }
        released
    }

    fn run(self: Arc<Self>, ready: mpsc::SyncSender<CaptureResult<()>>) {
        self.tasks.bind_owner();
        self.view.bind();
        self.device.bind();

        let fps = self.view.with(|view| view.fps).unwrap_or_else(|| self.settings.effective_fps());
        let options = HostOptions {
            tick_interval: tick_interval(fps),
        };

        let (mut host, waker) = match self.hosts.create(&options) {
            Ok(pair) => pair,
            Err(e) => {
                self.tasks.close();
                let _ = ready.send(Err(e));
                return;
            }
        };

        self.tasks.attach_waker(waker);
        self.mailbox.reset_clock(Instant::now());
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == WorkerState::Starting {
                lifecycle.state = WorkerState::Running;
            }
        }
        let _ = ready.send(Ok(()));

        // Work queued before the window existed.
        self.pump(host.as_mut());

        loop {
            match host.next_event() {
                HostEvent::Tick => {
                    self.apply_view(host.as_mut());
                    self.tick(host.as_mut());
                }
                HostEvent::Wake => self.pump(host.as_mut()),
                HostEvent::Closed => break,
            }
        }

        self.tasks.close();
        self.invalidate_device();
        drop(host);
        tracing::debug!("capture worker loop exited");
    }

    fn pump(&self, host: &mut dyn CaptureHost) {
        self.tasks.run_pending();
        self.apply_view(host);
    }

    fn apply_view(&self, host: &mut dyn CaptureHost) {
        let changes = self.view.with(|view| ViewChanges {
            exclude: std::mem::take(&mut view.exclude_dirty).then(|| view.exclude.clone()),
            fps: std::mem::take(&mut view.fps_dirty).then_some(view.fps),
            close: std::mem::take(&mut view.close_requested),
        });
        let Some(changes) = changes else {
            return;
        };

        if let Some(exclude) = changes.exclude
            && !exclude.is_empty()
            && let Err(e) = host.set_exclude_list(&exclude)
        {
            tracing::warn!(error = %e, "failed to apply exclusion list");
        }

        if let Some(fps) = changes.fps
            && let Err(e) = host.set_tick_interval(tick_interval(fps))
        {
            tracing::warn!(error = %e, fps, "failed to change tick interval");
        }

        if changes.close {
            host.close();
        }
    }

    fn tick(&self, host: &mut dyn CaptureHost) {
        let Some(region) = self.view.with(|view| view.region) else {
            return;
        };
        if region.is_empty() {
            tracing::trace!(?region, "empty capture region, tick skipped");
            return;
        }
        if let Err(e) = host.render_region(region) {
            tracing::trace!(error = %e, "compositor tick skipped");
        }
    }

    fn snapshot(
        &self,
        slot: &mut Option<DeviceBinding>,
        device: &dyn RenderDevice,
    ) -> CaptureResult<()> {
        let identity = device.identity();
        let desc = device.describe_back_buffer()?;

        if let Some(binding) = slot.as_ref()
            && !binding.matches(identity, &desc)
        {
            tracing::debug!(?desc, "device or back buffer changed, rebinding");
            *slot = None;
        }
        if slot.is_none() {
            *slot = Some(self.bind_device(device, identity, desc)?);
        }
        let Some(binding) = slot.as_mut() else {
            return Err(CaptureError::Device("device binding unavailable".into()));
        };

        let shape = binding.shape();
        let mut buffer = self.pool.take(shape);
        let mut copied = Ok(());
        let read = binding
            .staging_mut()
            .read_back(&mut |mapped: MappedSurface<'_>| {
                copied = mapped.copy_into(shape, &mut buffer);
            });

        if let Err(e) = read.and(copied) {
            self.pool.give_back(shape, buffer);
            return Err(e);
        }

        let frame = Frame::new(shape, buffer, Instant::now(), Arc::downgrade(&self.pool));
        self.mailbox.publish(frame);
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn bind_device(
        &self,
        device: &dyn RenderDevice,
        identity: DeviceId,
        desc: SurfaceDesc,
    ) -> CaptureResult<DeviceBinding> {
        if desc.format != SurfaceFormat::Bgra8 {
            return Err(CaptureError::UnsupportedFormat(desc.format));
        }
        if desc.is_empty() {
            return Err(CaptureError::Device("back buffer has no area".into()));
        }

        let staging = device.create_staging(&desc)?;
        self.pool.reshape(FrameShape::from(desc));
        tracing::debug!(
            width = desc.width,
            height = desc.height,
            device = identity.raw(),
            "bound render device"
        );
        Ok(DeviceBinding::new(identity, desc, staging))
    }
}
