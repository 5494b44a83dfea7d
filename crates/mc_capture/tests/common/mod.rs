//! Fake platform seams shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use mc_capture::{
    CaptureError, CaptureHost, CaptureRegion, CaptureResult, DeviceId, ExcludeList, HookBackend,
    HookRouter, HostEvent, HostFactory, HostOptions, HostWaker, MappedSurface, RenderDevice,
    StagingSurface, SurfaceDesc, SurfaceFormat, WindowHandle,
};
use parking_lot::Mutex;

pub const WAIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or `WAIT` runs out.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Created { tick_interval: Duration },
    TickInterval(Duration),
    Exclude(Vec<WindowHandle>),
    Render(CaptureRegion),
    Close,
    Dropped,
}

type RenderHook = Arc<dyn Fn(CaptureRegion) + Send + Sync>;

#[derive(Default)]
struct FactoryShared {
    calls: Mutex<Vec<(usize, HostCall)>>,
    hosts: Mutex<Vec<mpsc::Sender<HostEvent>>>,
    on_render: Mutex<Option<RenderHook>>,
    fail: AtomicBool,
}

/// Host factory whose hosts are driven by channel events injected from the test.
#[derive(Clone, Default)]
pub struct FakeHostFactory {
    shared: Arc<FactoryShared>,
}

impl FakeHostFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let factory = Self::default();
        factory.shared.fail.store(true, Ordering::SeqCst);
        factory
    }

    /// Runs on the worker thread whenever a host renders a region.
    pub fn set_on_render(&self, hook: impl Fn(CaptureRegion) + Send + Sync + 'static) {
        *self.shared.on_render.lock() = Some(Arc::new(hook));
    }

    /// Fire the tick timer of host number `index` (creation order).
    pub fn tick(&self, index: usize) {
        if let Some(tx) = self.shared.hosts.lock().get(index) {
            let _ = tx.send(HostEvent::Tick);
        }
    }

    pub fn host_count(&self) -> usize {
        self.shared.hosts.lock().len()
    }

    pub fn calls(&self, index: usize) -> Vec<HostCall> {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|(host, _)| *host == index)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn renders(&self, index: usize) -> Vec<CaptureRegion> {
        self.calls(index)
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Render(region) => Some(region),
                _ => None,
            })
            .collect()
    }

    pub fn has_call(&self, index: usize, wanted: &HostCall) -> bool {
        self.calls(index).iter().any(|call| call == wanted)
    }
}

impl HostFactory for FakeHostFactory {
    fn create(
        &self,
        options: &HostOptions,
    ) -> CaptureResult<(Box<dyn CaptureHost>, Arc<dyn HostWaker>)> {
        if self.shared.fail.load(Ordering::SeqCst) {
            return Err(CaptureError::Host("fake host refused".into()));
        }

        let (tx, rx) = mpsc::channel();
        let index = {
            let mut hosts = self.shared.hosts.lock();
            hosts.push(tx.clone());
            hosts.len() - 1
        };
        let host = FakeHost {
            index,
            events: rx,
            shared: Arc::clone(&self.shared),
            closed: false,
        };
        host.record(HostCall::Created {
            tick_interval: options.tick_interval,
        });
        Ok((Box::new(host), Arc::new(FakeWaker { tx })))
    }
}

struct FakeHost {
    index: usize,
    events: mpsc::Receiver<HostEvent>,
    shared: Arc<FactoryShared>,
    closed: bool,
}

impl FakeHost {
    fn record(&self, call: HostCall) {
        self.shared.calls.lock().push((self.index, call));
    }
}

impl CaptureHost for FakeHost {
    fn next_event(&mut self) -> HostEvent {
        if self.closed {
            return HostEvent::Closed;
        }
        self.events.recv().unwrap_or(HostEvent::Closed)
    }

    fn set_tick_interval(&mut self, interval: Duration) -> CaptureResult<()> {
        self.record(HostCall::TickInterval(interval));
        Ok(())
    }

    fn set_exclude_list(&mut self, windows: &ExcludeList) -> CaptureResult<()> {
        self.record(HostCall::Exclude(windows.as_slice().to_vec()));
        Ok(())
    }

    fn render_region(&mut self, region: CaptureRegion) -> CaptureResult<()> {
        self.record(HostCall::Render(region));
        let hook = self.shared.on_render.lock().clone();
        if let Some(hook) = hook {
            hook(region);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.record(HostCall::Close);
    }
}

impl Drop for FakeHost {
    fn drop(&mut self) {
        self.record(HostCall::Dropped);
    }
}

struct FakeWaker {
    tx: mpsc::Sender<HostEvent>,
}

impl HostWaker for FakeWaker {
    fn wake(&self) -> bool {
        self.tx.send(HostEvent::Wake).is_ok()
    }
}

/// Render device with a configurable back buffer and padded staging rows.
pub struct FakeDevice {
    id: usize,
    desc: Mutex<SurfaceDesc>,
    pitch_padding: usize,
    fill: Arc<AtomicU8>,
    stagings_created: AtomicUsize,
}

impl FakeDevice {
    pub fn new(id: usize, width: u32, height: u32) -> Self {
        Self {
            id,
            desc: Mutex::new(SurfaceDesc::new(width, height, SurfaceFormat::Bgra8)),
            pitch_padding: 16,
            fill: Arc::new(AtomicU8::new(0x7F)),
            stagings_created: AtomicUsize::new(0),
        }
    }

    pub fn set_desc(&self, desc: SurfaceDesc) {
        *self.desc.lock() = desc;
    }

    pub fn set_fill(&self, value: u8) {
        self.fill.store(value, Ordering::SeqCst);
    }

    pub fn stagings_created(&self) -> usize {
        self.stagings_created.load(Ordering::SeqCst)
    }
}

impl RenderDevice for FakeDevice {
    fn identity(&self) -> DeviceId {
        DeviceId::from_raw(self.id)
    }

    fn describe_back_buffer(&self) -> CaptureResult<SurfaceDesc> {
        Ok(*self.desc.lock())
    }

    fn create_staging(&self, desc: &SurfaceDesc) -> CaptureResult<Box<dyn StagingSurface>> {
        self.stagings_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStaging {
            desc: *desc,
            pitch: desc.width as usize * 4 + self.pitch_padding,
            fill: Arc::clone(&self.fill),
        }))
    }
}

struct FakeStaging {
    desc: SurfaceDesc,
    pitch: usize,
    fill: Arc<AtomicU8>,
}

impl StagingSurface for FakeStaging {
    fn desc(&self) -> SurfaceDesc {
        self.desc
    }

    fn read_back(&mut self, sink: &mut dyn FnMut(MappedSurface<'_>)) -> CaptureResult<()> {
        let row_len = self.desc.width as usize * 4;
        let mut bytes = vec![0xEEu8; self.pitch * self.desc.height as usize];
        let value = self.fill.load(Ordering::SeqCst);
        for row in bytes.chunks_exact_mut(self.pitch) {
            row[..row_len].fill(value);
        }
        sink(MappedSurface {
            bytes: &bytes,
            pitch: self.pitch,
        });
        Ok(())
    }
}

#[derive(Default)]
struct BackendState {
    router: Mutex<Option<Arc<dyn HookRouter>>>,
    installs: AtomicUsize,
    uninstalls: AtomicUsize,
    fail: AtomicBool,
}

/// Hook backend that only remembers the router it was given.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<BackendState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::SeqCst);
    }

    pub fn router(&self) -> Option<Arc<dyn HookRouter>> {
        self.state.router.lock().clone()
    }

    pub fn installs(&self) -> usize {
        self.state.installs.load(Ordering::SeqCst)
    }

    pub fn uninstalls(&self) -> usize {
        self.state.uninstalls.load(Ordering::SeqCst)
    }
}

impl HookBackend for FakeBackend {
    fn install(&self, router: Arc<dyn HookRouter>) -> CaptureResult<()> {
        if self.state.fail.load(Ordering::SeqCst) {
            return Err(CaptureError::Hook("fake backend refused".into()));
        }
        *self.state.router.lock() = Some(router);
        self.state.installs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn uninstall(&self) {
        *self.state.router.lock() = None;
        self.state.uninstalls.fetch_add(1, Ordering::SeqCst);
    }
}
