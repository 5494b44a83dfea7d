use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

use mc_capture::{CaptureResult, HookTarget, HookToken, Interceptor};
use windows::Win32::System::Memory::{PAGE_PROTECTION_FLAGS, PAGE_READWRITE, VirtualProtect};

use crate::error::IntoCaptureResult;

/// Rewrites function-pointer cells in place, typically COM vtable slots.
///
/// Every object sharing the vtable is redirected, so replacements must forward calls they do not
/// care about.
#[derive(Debug, Default, Clone, Copy)]
pub struct VtableInterceptor;

impl VtableInterceptor {
    /// Store `value` into the cell at `location`, returning the previous value.
    ///
    /// # Safety
    ///
    /// `location` must be a live, pointer-aligned cell.
    unsafe fn exchange(location: usize, value: usize) -> CaptureResult<usize> {
        let cell = location as *mut usize;
        let size = size_of::<usize>();

        let mut previous = PAGE_PROTECTION_FLAGS(0);
        unsafe { VirtualProtect(cell as *const c_void, size, PAGE_READWRITE, &mut previous) }
            .into_hook_result()?;

        // SAFETY: aligned and writable per the caller and the protection change above. Render
        // threads may read the slot concurrently, so the write must be a single atomic store.
        let original = unsafe { AtomicUsize::from_ptr(cell) }.swap(value, Ordering::SeqCst);

        let mut ignored = PAGE_PROTECTION_FLAGS(0);
        if let Err(e) = unsafe { VirtualProtect(cell as *const c_void, size, previous, &mut ignored) } {
            tracing::warn!(error = ?e, "failed to restore page protection");
        }
        Ok(original)
    }
}

impl Interceptor for VtableInterceptor {
    unsafe fn attach(&self, target: &HookTarget) -> CaptureResult<HookToken> {
        let original = unsafe { Self::exchange(target.location, target.replacement) }?;
        tracing::debug!(
            entry = target.entry.name(),
            slot = format_args!("{:#x}", target.location),
            "entry point redirected"
        );
        Ok(HookToken::new(target.entry, target.location, original))
    }

    unsafe fn detach(&self, token: &HookToken) -> CaptureResult<()> {
        unsafe { Self::exchange(token.location(), token.original()) }?;
        tracing::debug!(entry = token.entry().name(), "entry point restored");
        Ok(())
    }
}
