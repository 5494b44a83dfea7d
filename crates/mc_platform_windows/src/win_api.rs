use std::{ffi::OsStr, ffi::c_void, iter::once, os::windows::ffi::OsStrExt};

use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Gdi::{HBRUSH, UpdateWindow};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::HiDpi::{
    DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE, SetThreadDpiAwarenessContext,
};
use windows::Win32::UI::Magnification::{
    MAGCOLOREFFECT, MW_FILTERMODE_EXCLUDE, MagInitialize, MagSetColorEffect,
    MagSetWindowFilterList, MagSetWindowSource, MagUninitialize,
};
use windows::Win32::UI::WindowsAndMessaging::*;
use windows::core::PCWSTR;

/// Per-monitor DPI awareness for the calling thread. Returns `false` if the OS refused.
#[inline]
pub fn set_thread_per_monitor_dpi_aware() -> bool {
    let previous = unsafe { SetThreadDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE) };
    !previous.0.is_null()
}

#[inline]
pub fn get_module_handle() -> windows::core::Result<HMODULE> {
    unsafe { GetModuleHandleW(None) }
}

#[inline]
pub fn load_cursor_arrow() -> windows::core::Result<HCURSOR> {
    unsafe { LoadCursorW(None, IDC_ARROW) }
}

#[inline]
pub fn def_window_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

/// Register a window class. An already registered class counts as success.
pub fn register_class(
    instance: HMODULE,
    class_name: PCWSTR,
    window_proc: unsafe extern "system" fn(HWND, u32, WPARAM, LPARAM) -> LRESULT,
    class_style: WNDCLASS_STYLES,
) -> windows::core::Result<()> {
    let window_class = WNDCLASSW {
        lpfnWndProc: Some(window_proc),
        hInstance: instance.into(),
        lpszClassName: class_name,
        hbrBackground: HBRUSH(std::ptr::null_mut()),
        hCursor: load_cursor_arrow()?,
        style: class_style,
        ..Default::default()
    };

    if unsafe { RegisterClassW(&window_class) } != 0 {
        return Ok(());
    }
    let error = unsafe { GetLastError() };
    if error == ERROR_CLASS_ALREADY_EXISTS {
        Ok(())
    } else {
        Err(error.to_hresult().into())
    }
}

#[inline]
pub fn unregister_class(instance: HMODULE, class_name: PCWSTR) -> windows::core::Result<()> {
    unsafe { UnregisterClassW(class_name, Some(instance.into())) }
}

#[allow(clippy::too_many_arguments)]
#[inline]
pub fn create_window(
    ex_style: WINDOW_EX_STYLE,
    class_name: PCWSTR,
    title: PCWSTR,
    style: WINDOW_STYLE,
    rect: RECT,
    parent: Option<HWND>,
    instance: HMODULE,
    create_params: Option<*const c_void>,
) -> windows::core::Result<HWND> {
    unsafe {
        CreateWindowExW(
            ex_style,
            class_name,
            title,
            style,
            rect.left,
            rect.top,
            rect.right - rect.left,
            rect.bottom - rect.top,
            parent,
            None,
            Some(instance.into()),
            create_params,
        )
    }
}

#[inline]
pub fn destroy_window(hwnd: HWND) -> windows::core::Result<()> {
    unsafe { DestroyWindow(hwnd) }
}

#[inline]
pub fn is_window(hwnd: HWND) -> bool {
    unsafe { IsWindow(Some(hwnd)).as_bool() }
}

#[inline]
pub fn show_window(hwnd: HWND) {
    unsafe {
        let _ = ShowWindow(hwnd, SW_SHOW);
        let _ = UpdateWindow(hwnd);
    }
}

/// Layered-window opacity, 0 (invisible) to 255 (opaque).
#[inline]
pub fn set_layered_alpha(hwnd: HWND, alpha: u8) -> windows::core::Result<()> {
    unsafe { SetLayeredWindowAttributes(hwnd, COLORREF(0), alpha, LWA_ALPHA) }
}

#[inline]
pub fn set_window_pos(
    hwnd: HWND,
    hwnd_insert_after: Option<HWND>,
    rect: RECT,
    flags: SET_WINDOW_POS_FLAGS,
) -> windows::core::Result<()> {
    unsafe {
        SetWindowPos(
            hwnd,
            hwnd_insert_after,
            rect.left,
            rect.top,
            rect.right - rect.left,
            rect.bottom - rect.top,
            flags,
        )
    }
}

#[inline]
pub fn get_client_rect(hwnd: HWND) -> windows::core::Result<RECT> {
    let mut rect = RECT::default();
    unsafe {
        GetClientRect(hwnd, &mut rect)?;
    }
    Ok(rect)
}

/// Start (or restart with a new period) a window timer.
#[inline]
pub fn start_timer(hwnd: HWND, timer_id: usize, interval_ms: u32) -> bool {
    unsafe { SetTimer(Some(hwnd), timer_id, interval_ms, None) != 0 }
}

#[inline]
pub fn stop_timer(hwnd: HWND, timer_id: usize) -> windows::core::Result<()> {
    unsafe { KillTimer(Some(hwnd), timer_id) }
}

#[inline]
pub fn post_message(
    hwnd: HWND,
    msg: u32,
    wparam: usize,
    lparam: isize,
) -> windows::core::Result<()> {
    unsafe { PostMessageW(Some(hwnd), msg, WPARAM(wparam), LPARAM(lparam)) }
}

/// Block for the next message of the calling thread.
///
/// Returns `false` on `WM_QUIT` or when the queue is unusable.
#[inline]
pub fn get_message(msg: &mut MSG) -> bool {
    let result = unsafe { GetMessageW(msg, None, 0, 0) };
    result.0 > 0
}

#[inline]
pub fn dispatch_message(msg: &MSG) {
    unsafe {
        let _ = TranslateMessage(msg);
        DispatchMessageW(msg);
    }
}

#[inline]
pub fn quit_message_loop(exit_code: i32) {
    unsafe {
        PostQuitMessage(exit_code);
    }
}

#[inline]
pub fn mag_initialize() -> bool {
    unsafe { MagInitialize().as_bool() }
}

#[inline]
pub fn mag_uninitialize() -> bool {
    unsafe { MagUninitialize().as_bool() }
}

/// Point a magnifier control at a screen rectangle.
#[inline]
pub fn mag_set_window_source(magnifier: HWND, source: RECT) -> bool {
    unsafe { MagSetWindowSource(magnifier, source).as_bool() }
}

/// Hide `windows` from a magnifier control's output.
#[inline]
pub fn mag_exclude_windows(magnifier: HWND, windows: &mut [HWND]) -> bool {
    unsafe {
        MagSetWindowFilterList(
            magnifier,
            MW_FILTERMODE_EXCLUDE,
            windows.len() as i32,
            windows.as_mut_ptr(),
        )
        .as_bool()
    }
}

#[inline]
pub fn mag_set_color_effect(magnifier: HWND, effect: &mut MAGCOLOREFFECT) -> bool {
    unsafe { MagSetColorEffect(magnifier, effect).as_bool() }
}

/// Convert a Rust string to a NUL-terminated UTF-16 buffer for Win32 APIs.
#[inline]
pub fn to_wide_chars(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(once(0)).collect()
}
