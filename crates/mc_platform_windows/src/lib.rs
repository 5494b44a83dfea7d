#![cfg(target_os = "windows")]

pub mod d3d9;
pub mod error;
pub mod hooks;
pub mod interceptor;
pub mod magnifier;
pub mod resources;
pub mod win32;
pub mod win_api;

pub use d3d9::{D3d9Device, D3d9Staging};
pub use error::IntoCaptureResult;
pub use hooks::D3d9HookBackend;
pub use interceptor::VtableInterceptor;
pub use magnifier::{MagnifierHost, MagnifierHostFactory};

use std::ffi::c_void;

use mc_capture::WindowHandle;
use windows::Win32::Foundation::HWND;

#[inline]
pub fn window_handle(hwnd: HWND) -> WindowHandle {
    WindowHandle::from_raw(hwnd.0 as usize)
}

#[inline]
pub fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.raw() as *mut c_void)
}
