use std::ffi::c_void;

use mc_capture::{
    CaptureError, CaptureResult, DeviceId, MappedSurface, RenderDevice, StagingSurface,
    SurfaceDesc, SurfaceFormat,
};
use windows::Win32::Graphics::Direct3D9::{
    D3DFMT_A8R8G8B8, D3DFMT_X8R8G8B8, D3DFORMAT, D3DLOCK_READONLY, D3DLOCKED_RECT, D3DPOOL_SYSTEMMEM,
    D3DPRESENT_PARAMETERS, D3DSURFACE_DESC, IDirect3DDevice9Ex, IDirect3DSurface9,
};
use windows::core::Interface;

use crate::error::IntoCaptureResult;

pub(crate) fn surface_format(format: D3DFORMAT) -> SurfaceFormat {
    if format == D3DFMT_A8R8G8B8 || format == D3DFMT_X8R8G8B8 {
        SurfaceFormat::Bgra8
    } else {
        SurfaceFormat::Other(format.0)
    }
}

/// A D3D9Ex device borrowed for the duration of an intercepted call.
pub struct D3d9Device<'a> {
    device: &'a IDirect3DDevice9Ex,
}

impl<'a> D3d9Device<'a> {
    pub fn new(device: &'a IDirect3DDevice9Ex) -> Self {
        Self { device }
    }

    /// Borrow the device behind a raw `this` pointer.
    ///
    /// # Safety
    ///
    /// `this` must be null or a live `IDirect3DDevice9Ex` for the lifetime of the borrow.
    pub unsafe fn from_this(this: &'a *mut c_void) -> Option<Self> {
        unsafe { IDirect3DDevice9Ex::from_raw_borrowed(this) }.map(Self::new)
    }

    fn swap_chain_params(&self) -> windows::core::Result<D3DPRESENT_PARAMETERS> {
        let swap_chain = unsafe { self.device.GetSwapChain(0) }?;
        let mut params = D3DPRESENT_PARAMETERS::default();
        unsafe { swap_chain.GetPresentParameters(&mut params) }?;
        Ok(params)
    }

    fn render_target_desc(&self) -> windows::core::Result<D3DSURFACE_DESC> {
        let target = unsafe { self.device.GetRenderTarget(0) }?;
        let mut desc = D3DSURFACE_DESC::default();
        unsafe { target.GetDesc(&mut desc) }?;
        Ok(desc)
    }
}

impl RenderDevice for D3d9Device<'_> {
    fn identity(&self) -> DeviceId {
        DeviceId::from_raw(self.device.as_raw() as usize)
    }

    fn describe_back_buffer(&self) -> CaptureResult<SurfaceDesc> {
        match self.swap_chain_params() {
            Ok(params) if params.BackBufferWidth > 0 && params.BackBufferHeight > 0 => {
                Ok(SurfaceDesc::new(
                    params.BackBufferWidth,
                    params.BackBufferHeight,
                    surface_format(params.BackBufferFormat),
                ))
            }
            _ => {
                let desc = self.render_target_desc().into_device_result()?;
                Ok(SurfaceDesc::new(desc.Width, desc.Height, surface_format(desc.Format)))
            }
        }
    }

    fn create_staging(&self, desc: &SurfaceDesc) -> CaptureResult<Box<dyn StagingSurface>> {
        // The copy needs the render target's exact format; A8R8G8B8 and X8R8G8B8 differ.
        let format = self.render_target_desc().into_device_result()?.Format;

        let mut surface: Option<IDirect3DSurface9> = None;
        unsafe {
            self.device.CreateOffscreenPlainSurface(
                desc.width,
                desc.height,
                format,
                D3DPOOL_SYSTEMMEM,
                &mut surface,
                std::ptr::null_mut(),
            )
        }
        .into_device_result()?;
        let surface = surface
            .ok_or_else(|| CaptureError::Device("CreateOffscreenPlainSurface returned null".into()))?;

        Ok(Box::new(D3d9Staging {
            device: self.device.clone(),
            surface,
            desc: *desc,
        }))
    }
}

/// System-memory copy target for one device's render target.
pub struct D3d9Staging {
    device: IDirect3DDevice9Ex,
    surface: IDirect3DSurface9,
    desc: SurfaceDesc,
}

// SAFETY: a staging surface is created, used and released on the capture thread that owns the
// device binding; it is never shared. The bound is only required to store it in that thread's
// state.
unsafe impl Send for D3d9Staging {}

/// Unlocks the surface when the mapped rows go out of scope.
struct LockGuard<'a>(&'a IDirect3DSurface9);

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = unsafe { self.0.UnlockRect() };
    }
}

impl StagingSurface for D3d9Staging {
    fn desc(&self) -> SurfaceDesc {
        self.desc
    }

    fn read_back(&mut self, sink: &mut dyn FnMut(MappedSurface<'_>)) -> CaptureResult<()> {
        let target = unsafe { self.device.GetRenderTarget(0) }.into_device_result()?;
        unsafe { self.device.GetRenderTargetData(&target, &self.surface) }.into_device_result()?;

        let mut locked = D3DLOCKED_RECT::default();
        unsafe {
            self.surface
                .LockRect(&mut locked, std::ptr::null(), D3DLOCK_READONLY as u32)
        }
        .into_device_result()?;
        let _guard = LockGuard(&self.surface);

        let pitch = usize::try_from(locked.Pitch).unwrap_or(0);
        let row_len = self.desc.width as usize * 4;
        let rows = self.desc.height as usize;
        if locked.pBits.is_null() || pitch < row_len || rows == 0 {
            return Err(CaptureError::Device("locked staging surface is unusable".into()));
        }

        // SAFETY: the surface stays locked until `_guard` drops, and a locked surface of this
        // size spans `pitch` bytes for every row but the last, which holds at least `row_len`.
        let bytes = unsafe {
            std::slice::from_raw_parts(locked.pBits as *const u8, (rows - 1) * pitch + row_len)
        };
        sink(MappedSurface { bytes, pitch });
        Ok(())
    }
}
