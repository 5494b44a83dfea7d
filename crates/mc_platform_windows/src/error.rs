use mc_capture::{CaptureError, CaptureResult};

/// Converts `windows::core::Result` into the capture error class of the calling layer.
pub trait IntoCaptureResult<T> {
    /// Window, message loop and magnification failures.
    fn into_host_result(self) -> CaptureResult<T>;

    /// Direct3D device and surface failures.
    fn into_device_result(self) -> CaptureResult<T>;

    /// Module loading, probing and patching failures.
    fn into_hook_result(self) -> CaptureResult<T>;
}

impl<T> IntoCaptureResult<T> for windows::core::Result<T> {
    fn into_host_result(self) -> CaptureResult<T> {
        self.map_err(|e| CaptureError::Host(format!("{e:?}")))
    }

    fn into_device_result(self) -> CaptureResult<T> {
        self.map_err(|e| CaptureError::Device(format!("{e:?}")))
    }

    fn into_hook_result(self) -> CaptureResult<T> {
        self.map_err(|e| CaptureError::Hook(format!("{e:?}")))
    }
}
