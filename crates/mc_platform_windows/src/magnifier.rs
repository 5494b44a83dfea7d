use std::sync::Arc;
use std::time::Duration;

use mc_capture::{
    CaptureError, CaptureHost, CaptureRegion, CaptureResult, ExcludeList, HostEvent, HostFactory,
    HostOptions, HostWaker, WindowHandle,
};
use windows::Win32::UI::Magnification::MAGCOLOREFFECT;
use windows::core::w;

use crate::error::IntoCaptureResult;
use crate::resources::{MagnificationSession, ManagedWindow, RegisteredClass};
use crate::win_api;
use crate::win32::{
    CS_HREDRAW, CS_VREDRAW, HWND, LPARAM, LRESULT, MSG, RECT, SWP_NOACTIVATE, SWP_NOZORDER,
    WINDOW_EX_STYLE, WINDOW_STYLE, WM_APP, WM_DESTROY, WM_TIMER, WPARAM, WS_CHILD,
    WS_CLIPCHILDREN, WS_EX_LAYERED, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_POPUP, WS_VISIBLE,
};

const HOST_CLASS: &str = "McCaptureMagnifierHost";
const TICK_TIMER_ID: usize = 1000;
const TASK_MESSAGE: u32 = WM_APP + 1;

/// `MS_SHOWMAGNIFIEDCURSOR`
const MS_SHOWMAGNIFIEDCURSOR: WINDOW_STYLE = WINDOW_STYLE(0x0001);

const INVERT_COLORS: MAGCOLOREFFECT = MAGCOLOREFFECT {
    transform: [
        -1.0, 0.0, 0.0, 0.0, 0.0, //
        0.0, -1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, -1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, 0.0, //
        1.0, 1.0, 1.0, 0.0, 1.0,
    ],
};

/// Creates magnifier hosts on the calling (worker) thread.
#[derive(Debug, Clone, Copy)]
pub struct MagnifierHostFactory {
    debug_window: bool,
}

impl Default for MagnifierHostFactory {
    fn default() -> Self {
        Self {
            debug_window: cfg!(feature = "debug-window"),
        }
    }
}

impl MagnifierHostFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opaque, color-inverted host window instead of an invisible one.
    pub fn with_debug_window(mut self, debug_window: bool) -> Self {
        self.debug_window = debug_window;
        self
    }
}

impl HostFactory for MagnifierHostFactory {
    fn create(
        &self,
        options: &HostOptions,
    ) -> CaptureResult<(Box<dyn CaptureHost>, Arc<dyn HostWaker>)> {
        if !win_api::set_thread_per_monitor_dpi_aware() {
            tracing::debug!("per-monitor DPI awareness not applied to capture thread");
        }

        let session = MagnificationSession::initialize()?;
        let class = RegisteredClass::register(HOST_CLASS, host_window_proc, CS_HREDRAW | CS_VREDRAW)?;

        let host = win_api::create_window(
            WS_EX_TOPMOST | WS_EX_LAYERED | WS_EX_TOOLWINDOW,
            class.name(),
            w!("Magnifier Capture Host"),
            WS_POPUP | WS_CLIPCHILDREN,
            RECT::default(),
            None,
            class.instance(),
            None,
        )
        .into_host_result()?;
        let window = ManagedWindow::new(host);

        let alpha = if self.debug_window { 255 } else { 0 };
        win_api::set_layered_alpha(host, alpha).into_host_result()?;

        let client = win_api::get_client_rect(host).into_host_result()?;
        let child = win_api::create_window(
            WINDOW_EX_STYLE(0),
            w!("Magnifier"),
            w!("MagnifierWindow"),
            WS_CHILD | MS_SHOWMAGNIFIEDCURSOR | WS_VISIBLE,
            client,
            Some(host),
            class.instance(),
            None,
        )
        .map_err(|e| CaptureError::Compositor(format!("magnifier control: {e:?}")))?;

        if self.debug_window {
            let mut effect = INVERT_COLORS;
            if !win_api::mag_set_color_effect(child, &mut effect) {
                tracing::warn!("failed to apply debug color effect");
            }
        }

        if !win_api::start_timer(host, TICK_TIMER_ID, timer_interval_ms(options.tick_interval)) {
            return Err(CaptureError::Host("SetTimer failed".into()));
        }
        win_api::show_window(host);

        tracing::debug!(
            debug_window = self.debug_window,
            interval_ms = timer_interval_ms(options.tick_interval),
            "magnifier host created"
        );

        let waker = Arc::new(MagnifierWaker {
            window: crate::window_handle(host),
        });
        let host = MagnifierHost {
            child,
            window,
            _session: session,
            _class: class,
        };
        Ok((Box::new(host), waker))
    }
}

/// Hidden top-level window with an embedded magnifier control.
///
/// Drop order matters: the window goes first, then magnification is uninitialized, then the
/// class is released.
pub struct MagnifierHost {
    child: HWND,
    window: ManagedWindow,
    _session: MagnificationSession,
    _class: RegisteredClass,
}

impl MagnifierHost {
    fn host(&self) -> CaptureResult<HWND> {
        self.window
            .handle()
            .ok_or_else(|| CaptureError::Host("host window already destroyed".into()))
    }
}

impl CaptureHost for MagnifierHost {
    fn next_event(&mut self) -> HostEvent {
        let Some(host) = self.window.handle() else {
            return HostEvent::Closed;
        };

        let mut msg = MSG::default();
        loop {
            if !win_api::get_message(&mut msg) {
                return HostEvent::Closed;
            }

            if msg.hwnd == host {
                match msg.message {
                    WM_TIMER if msg.wParam.0 == TICK_TIMER_ID => return HostEvent::Tick,
                    TASK_MESSAGE => return HostEvent::Wake,
                    _ => {}
                }
            }

            win_api::dispatch_message(&msg);
        }
    }

    fn set_tick_interval(&mut self, interval: Duration) -> CaptureResult<()> {
        let host = self.host()?;
        if win_api::start_timer(host, TICK_TIMER_ID, timer_interval_ms(interval)) {
            Ok(())
        } else {
            Err(CaptureError::Host("SetTimer failed".into()))
        }
    }

    fn set_exclude_list(&mut self, windows: &ExcludeList) -> CaptureResult<()> {
        let mut handles: Vec<HWND> = windows.as_slice().iter().map(|&w| crate::hwnd(w)).collect();
        if win_api::mag_exclude_windows(self.child, &mut handles) {
            Ok(())
        } else {
            Err(CaptureError::Compositor("MagSetWindowFilterList failed".into()))
        }
    }

    fn render_region(&mut self, region: CaptureRegion) -> CaptureResult<()> {
        let host = self.host()?;
        let source = RECT {
            left: region.left,
            top: region.top,
            right: region.right,
            bottom: region.bottom,
        };

        win_api::set_window_pos(host, None, source, SWP_NOZORDER | SWP_NOACTIVATE)
            .into_host_result()?;
        let client = win_api::get_client_rect(host).into_host_result()?;
        win_api::set_window_pos(self.child, None, client, SWP_NOZORDER | SWP_NOACTIVATE)
            .into_host_result()?;

        if win_api::mag_set_window_source(self.child, source) {
            Ok(())
        } else {
            Err(CaptureError::Compositor("MagSetWindowSource failed".into()))
        }
    }

    fn close(&mut self) {
        if let Some(host) = self.window.handle() {
            let _ = win_api::stop_timer(host, TICK_TIMER_ID);
        }
        self.window.destroy();
        tracing::debug!("magnifier host destroyed");
    }
}

/// Posts the task message to a host window from any thread.
struct MagnifierWaker {
    window: WindowHandle,
}

impl HostWaker for MagnifierWaker {
    fn wake(&self) -> bool {
        let hwnd = crate::hwnd(self.window);
        win_api::is_window(hwnd) && win_api::post_message(hwnd, TASK_MESSAGE, 0, 0).is_ok()
    }
}

fn timer_interval_ms(interval: Duration) -> u32 {
    u32::try_from(interval.as_millis()).unwrap_or(u32::MAX).max(1)
}

unsafe extern "system" fn host_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_DESTROY => {
            win_api::quit_message_loop(0);
            LRESULT(0)
        }
        _ => win_api::def_window_proc(hwnd, msg, wparam, lparam),
    }
}
