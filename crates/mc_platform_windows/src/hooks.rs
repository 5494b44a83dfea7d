//! Direct3D 9 present/reset interception.
//!
//! The entry points are found by creating a throwaway D3D9Ex device and reading its vtable. The
//! matching slots are then redirected to the functions below, which hand the call to the
//! installed [`HookRouter`] and always forward to the original with the same arguments.

use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use mc_capture::{
    CaptureError, CaptureResult, EntryPoint, HookBackend, HookRouter, HookSet, HookTarget,
    Interceptor,
};
use parking_lot::{Mutex, RwLock};
use windows::Win32::Foundation::E_FAIL;
use windows::Win32::Graphics::Direct3D9::{
    D3D_SDK_VERSION, D3DADAPTER_DEFAULT, D3DCREATE_HARDWARE_VERTEXPROCESSING,
    D3DCREATE_NOWINDOWCHANGES, D3DDEVTYPE_HAL, D3DDISPLAYMODEEX, D3DFMT_A8R8G8B8,
    D3DPRESENT_INTERVAL_IMMEDIATE, D3DPRESENT_PARAMETERS, D3DSWAPEFFECT_FLIP, Direct3DCreate9Ex,
    IDirect3DDevice9Ex,
};
use windows::Win32::Graphics::Gdi::RGNDATA;
use windows::core::{BOOL, HRESULT, Interface, w};

use crate::d3d9::D3d9Device;
use crate::error::IntoCaptureResult;
use crate::interceptor::VtableInterceptor;
use crate::resources::{ManagedModule, ManagedWindow, RegisteredClass};
use crate::win_api;
use crate::win32::{
    CS_HREDRAW, CS_VREDRAW, HWND, LPARAM, LRESULT, RECT, WINDOW_EX_STYLE, WPARAM, WS_POPUP,
};

const RUNTIME_MODULE: &str = "d3d9.dll";
const PROBE_CLASS: &str = "McCaptureD3d9Probe";

const PRESENT_EX_SLOT: usize = 121;
const RESET_SLOT: usize = 16;
const RESET_EX_SLOT: usize = 132;

type PresentExFn = unsafe extern "system" fn(
    *mut c_void,
    *const RECT,
    *const RECT,
    HWND,
    *const RGNDATA,
    u32,
) -> HRESULT;
type ResetFn = unsafe extern "system" fn(*mut c_void, *mut D3DPRESENT_PARAMETERS) -> HRESULT;
type ResetExFn = unsafe extern "system" fn(
    *mut c_void,
    *mut D3DPRESENT_PARAMETERS,
    *mut D3DDISPLAYMODEEX,
) -> HRESULT;

static ROUTER: RwLock<Option<Arc<dyn HookRouter>>> = parking_lot::const_rwlock(None);
static INSTALLED: AtomicBool = AtomicBool::new(false);

// Originals are written before any slot is patched and never cleared, so a call that raced an
// uninstall still has somewhere to go.
static REAL_PRESENT_EX: AtomicUsize = AtomicUsize::new(0);
static REAL_RESET: AtomicUsize = AtomicUsize::new(0);
static REAL_RESET_EX: AtomicUsize = AtomicUsize::new(0);

fn original_cell(entry: EntryPoint) -> &'static AtomicUsize {
    match entry {
        EntryPoint::PresentEx => &REAL_PRESENT_EX,
        EntryPoint::Reset => &REAL_RESET,
        EntryPoint::ResetEx => &REAL_RESET_EX,
    }
}

fn replacement(entry: EntryPoint) -> usize {
    match entry {
        EntryPoint::PresentEx => present_ex_hook as PresentExFn as usize,
        EntryPoint::Reset => reset_hook as ResetFn as usize,
        EntryPoint::ResetEx => reset_ex_hook as ResetExFn as usize,
    }
}

fn with_router(f: impl FnOnce(&dyn HookRouter)) {
    let Some(router) = ROUTER.read().clone() else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| f(router.as_ref()))).is_err() {
        tracing::error!("panic while routing an intercepted device call");
    }
}

unsafe extern "system" fn present_ex_hook(
    this: *mut c_void,
    source: *const RECT,
    dest: *const RECT,
    window: HWND,
    dirty: *const RGNDATA,
    flags: u32,
) -> HRESULT {
    with_router(|router| {
        // SAFETY: `this` is the device the present was issued on.
        if let Some(device) = unsafe { D3d9Device::from_this(&this) } {
            router.on_present(&device);
        }
    });

    let real = REAL_PRESENT_EX.load(Ordering::Acquire);
    if real == 0 {
        return E_FAIL;
    }
    // SAFETY: read from this slot before it was patched.
    let real = unsafe { std::mem::transmute::<usize, PresentExFn>(real) };
    unsafe { real(this, source, dest, window, dirty, flags) }
}

unsafe extern "system" fn reset_hook(
    this: *mut c_void,
    params: *mut D3DPRESENT_PARAMETERS,
) -> HRESULT {
    with_router(|router| router.on_reset());

    let real = REAL_RESET.load(Ordering::Acquire);
    if real == 0 {
        return E_FAIL;
    }
    // SAFETY: read from this slot before it was patched.
    let real = unsafe { std::mem::transmute::<usize, ResetFn>(real) };
    unsafe { real(this, params) }
}

unsafe extern "system" fn reset_ex_hook(
    this: *mut c_void,
    params: *mut D3DPRESENT_PARAMETERS,
    mode: *mut D3DDISPLAYMODEEX,
) -> HRESULT {
    with_router(|router| router.on_reset());

    let real = REAL_RESET_EX.load(Ordering::Acquire);
    if real == 0 {
        return E_FAIL;
    }
    // SAFETY: read from this slot before it was patched.
    let real = unsafe { std::mem::transmute::<usize, ResetExFn>(real) };
    unsafe { real(this, params, mode) }
}

unsafe extern "system" fn probe_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    win_api::def_window_proc(hwnd, msg, wparam, lparam)
}

/// One device vtable slot: its address and the function it currently holds.
#[derive(Debug, Clone, Copy)]
struct ProbedSlot {
    entry: EntryPoint,
    location: usize,
    current: usize,
}

/// Create a 2x2 windowed D3D9Ex device on a hidden 1x1 window and read the slots of interest.
fn probe_slots() -> CaptureResult<[ProbedSlot; 3]> {
    let class = RegisteredClass::register(PROBE_CLASS, probe_window_proc, CS_HREDRAW | CS_VREDRAW)?;
    let hwnd = win_api::create_window(
        WINDOW_EX_STYLE(0),
        class.name(),
        w!("d3d9 probe"),
        WS_POPUP,
        RECT {
            left: 0,
            top: 0,
            right: 1,
            bottom: 1,
        },
        None,
        class.instance(),
        None,
    )
    .into_hook_result()?;
    let _window = ManagedWindow::new(hwnd);

    let d3d = unsafe { Direct3DCreate9Ex(D3D_SDK_VERSION) }.into_hook_result()?;

    let mut params = D3DPRESENT_PARAMETERS {
        Windowed: BOOL::from(true),
        SwapEffect: D3DSWAPEFFECT_FLIP,
        BackBufferFormat: D3DFMT_A8R8G8B8,
        BackBufferWidth: 2,
        BackBufferHeight: 2,
        BackBufferCount: 1,
        hDeviceWindow: hwnd,
        PresentationInterval: D3DPRESENT_INTERVAL_IMMEDIATE as u32,
        ..Default::default()
    };
    let mut device: Option<IDirect3DDevice9Ex> = None;
    unsafe {
        d3d.CreateDeviceEx(
            D3DADAPTER_DEFAULT,
            D3DDEVTYPE_HAL,
            hwnd,
            (D3DCREATE_HARDWARE_VERTEXPROCESSING | D3DCREATE_NOWINDOWCHANGES) as u32,
            &mut params,
            std::ptr::null_mut(),
            &mut device,
        )
    }
    .into_hook_result()?;
    let device = device.ok_or_else(|| CaptureError::Hook("CreateDeviceEx returned null".into()))?;

    // SAFETY: a COM object starts with its vtable pointer, and the D3D9Ex device vtable is longer
    // than the highest slot read here.
    let vtable = unsafe { *(device.as_raw() as *const *const usize) };
    let slot = |entry: EntryPoint, index: usize| {
        let location = unsafe { vtable.add(index) };
        ProbedSlot {
            entry,
            location: location as usize,
            current: unsafe { *location },
        }
    };

    Ok([
        slot(EntryPoint::PresentEx, PRESENT_EX_SLOT),
        slot(EntryPoint::Reset, RESET_SLOT),
        slot(EntryPoint::ResetEx, RESET_EX_SLOT),
    ])
}

struct Installed {
    hooks: HookSet,
    module: ManagedModule,
}

/// Process-wide D3D9 present/reset interception.
///
/// Only one backend can be installed per process at a time.
pub struct D3d9HookBackend {
    interceptor: Box<dyn Interceptor>,
    state: Mutex<Option<Installed>>,
}

impl Default for D3d9HookBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl D3d9HookBackend {
    pub fn new() -> Self {
        Self::with_interceptor(VtableInterceptor)
    }

    pub fn with_interceptor(interceptor: impl Interceptor + 'static) -> Self {
        Self {
            interceptor: Box::new(interceptor),
            state: Mutex::new(None),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.state.lock().is_some()
    }

    fn install_hooks(&self, router: Arc<dyn HookRouter>) -> CaptureResult<Installed> {
        // Pins the runtime so the patched vtable outlives every device.
        let module = ManagedModule::load(RUNTIME_MODULE)?;
        let slots = probe_slots()?;

        for slot in &slots {
            if slot.current == replacement(slot.entry) {
                return Err(CaptureError::Hook(format!(
                    "{} is already redirected",
                    slot.entry.name()
                )));
            }
            original_cell(slot.entry).store(slot.current, Ordering::Release);
        }

        *ROUTER.write() = Some(router);

        let targets = slots.map(|slot| HookTarget {
            entry: slot.entry,
            location: slot.location,
            replacement: replacement(slot.entry),
        });
        // SAFETY: each location is a slot of the runtime's device vtable, kept alive by `module`,
        // and each replacement has that slot's signature.
        let hooks = unsafe { HookSet::attach_all(self.interceptor.as_ref(), &targets) }?;

        tracing::debug!(module = ?module.handle(), hooks = hooks.len(), "d3d9 entry points hooked");
        Ok(Installed { hooks, module })
    }
}

impl HookBackend for D3d9HookBackend {
    fn install(&self, router: Arc<dyn HookRouter>) -> CaptureResult<()> {
        let mut state = self.state.lock();
        if state.is_some() {
            *ROUTER.write() = Some(router);
            return Ok(());
        }

        if INSTALLED.swap(true, Ordering::AcqRel) {
            return Err(CaptureError::Hook(
                "d3d9 hooks are already installed in this process".into(),
            ));
        }

        match self.install_hooks(router) {
            Ok(installed) => {
                *state = Some(installed);
                Ok(())
            }
            Err(e) => {
                *ROUTER.write() = None;
                INSTALLED.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn uninstall(&self) {
        let Some(Installed { hooks, module }) = self.state.lock().take() else {
            return;
        };

        // SAFETY: the slots belong to the vtable of the still-loaded `module`.
        if let Err(e) = unsafe { hooks.detach_all(self.interceptor.as_ref()) } {
            tracing::error!(error = %e, "failed to restore d3d9 entry points");
        }
        *ROUTER.write() = None;
        INSTALLED.store(false, Ordering::Release);
        drop(module);
    }
}

impl Drop for D3d9HookBackend {
    fn drop(&mut self) {
        self.uninstall();
    }
}
