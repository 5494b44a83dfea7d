//! RAII wrappers for the Win32 resources the capture backend owns.

use windows::Win32::Foundation::{FreeLibrary, HMODULE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::LoadLibraryW;
use windows::Win32::UI::WindowsAndMessaging::WNDCLASS_STYLES;
use windows::core::PCWSTR;

use mc_capture::{CaptureError, CaptureResult};

use crate::error::IntoCaptureResult;
use crate::win_api;

/// A loaded DLL, freed on drop.
#[derive(Debug)]
pub struct ManagedModule(HMODULE);

impl ManagedModule {
    pub fn load(name: &str) -> CaptureResult<Self> {
        let wide = win_api::to_wide_chars(name);
        let module = unsafe { LoadLibraryW(PCWSTR(wide.as_ptr())) }.into_hook_result()?;
        Ok(Self(module))
    }

    pub fn handle(&self) -> HMODULE {
        self.0
    }
}

impl Drop for ManagedModule {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            // SAFETY: the handle came from LoadLibraryW and is released exactly once.
            unsafe {
                let _ = FreeLibrary(self.0);
            }
        }
    }
}

/// A top-level window destroyed on drop unless already gone.
#[derive(Debug)]
pub struct ManagedWindow(Option<HWND>);

impl ManagedWindow {
    pub fn new(hwnd: HWND) -> Self {
        Self(Some(hwnd))
    }

    pub fn handle(&self) -> Option<HWND> {
        self.0
    }

    /// Destroy now. Later calls and the drop do nothing.
    pub fn destroy(&mut self) {
        if let Some(hwnd) = self.0.take()
            && win_api::is_window(hwnd)
        {
            let _ = win_api::destroy_window(hwnd);
        }
    }
}

impl Drop for ManagedWindow {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Window class registered for the lifetime of the guard.
pub struct RegisteredClass {
    instance: HMODULE,
    name: Vec<u16>,
}

impl RegisteredClass {
    pub fn register(
        name: &str,
        window_proc: unsafe extern "system" fn(HWND, u32, WPARAM, LPARAM) -> LRESULT,
        class_style: WNDCLASS_STYLES,
    ) -> CaptureResult<Self> {
        let instance = win_api::get_module_handle().into_host_result()?;
        let name = win_api::to_wide_chars(name);
        win_api::register_class(instance, PCWSTR(name.as_ptr()), window_proc, class_style)
            .into_host_result()?;
        Ok(Self { instance, name })
    }

    pub fn name(&self) -> PCWSTR {
        PCWSTR(self.name.as_ptr())
    }

    pub fn instance(&self) -> HMODULE {
        self.instance
    }
}

impl Drop for RegisteredClass {
    fn drop(&mut self) {
        // Fails while other windows of the class are alive; the last owner gets it.
        let _ = win_api::unregister_class(self.instance, self.name());
    }
}

/// Magnification API initialized on the current thread.
#[derive(Debug)]
pub struct MagnificationSession(());

impl MagnificationSession {
    pub fn initialize() -> CaptureResult<Self> {
        if win_api::mag_initialize() {
            Ok(Self(()))
        } else {
            Err(CaptureError::Compositor("MagInitialize failed".into()))
        }
    }
}

impl Drop for MagnificationSession {
    fn drop(&mut self) {
        if !win_api::mag_uninitialize() {
            tracing::warn!("MagUninitialize failed");
        }
    }
}
