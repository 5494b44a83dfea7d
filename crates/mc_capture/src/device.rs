use crate::error::{CaptureError, CaptureResult};
use crate::types::{DeviceId, FrameShape, SurfaceDesc};

/// CPU view of a locked staging surface.
#[derive(Debug, Clone, Copy)]
pub struct MappedSurface<'a> {
    pub bytes: &'a [u8],
    /// Bytes between the starts of consecutive rows; may exceed the packed row size.
    pub pitch: usize,
}

impl MappedSurface<'_> {
    /// Copy rows into a packed buffer of `shape`, honoring the source pitch.
    pub fn copy_into(&self, shape: FrameShape, dst: &mut [u8]) -> CaptureResult<()> {
        let row_len = shape.width as usize * FrameShape::BYTES_PER_PIXEL;
        let rows = shape.height as usize;
        if row_len == 0 || rows == 0 {
            return Ok(());
        }
        if self.pitch < row_len || dst.len() < shape.byte_len() {
            return Err(CaptureError::Device(format!(
                "surface pitch {} too small for {}x{}",
                self.pitch, shape.width, shape.height
            )));
        }
        if self.bytes.len() < (rows - 1) * self.pitch + row_len {
            return Err(CaptureError::Device("mapped surface shorter than expected".into()));
        }

        for (y, dst_row) in dst.chunks_exact_mut(shape.stride).take(rows).enumerate() {
            let src = &self.bytes[y * self.pitch..y * self.pitch + row_len];
            dst_row[..row_len].copy_from_slice(src);
        }
        Ok(())
    }
}

/// System-memory surface that receives render-target copies.
///
/// Lives on, and is released on, the thread that created it.
pub trait StagingSurface: Send {
    fn desc(&self) -> SurfaceDesc;

    /// Copy the device's current render target into this surface, lock it read-only and hand
    /// the mapped rows to `sink`.
    fn read_back(&mut self, sink: &mut dyn FnMut(MappedSurface<'_>)) -> CaptureResult<()>;
}

/// A native graphics device observed from inside its present call.
pub trait RenderDevice {
    fn identity(&self) -> DeviceId;

    /// Size and format of the back buffer, from the swap chain's presentation parameters or,
    /// failing that, from the current render target.
    fn describe_back_buffer(&self) -> CaptureResult<SurfaceDesc>;

    fn create_staging(&self, desc: &SurfaceDesc) -> CaptureResult<Box<dyn StagingSurface>>;
}

/// A device the worker is allowed to snapshot, with its staging surface.
pub struct DeviceBinding {
    device: DeviceId,
    desc: SurfaceDesc,
    staging: Box<dyn StagingSurface>,
}

impl DeviceBinding {
    pub fn new(device: DeviceId, desc: SurfaceDesc, staging: Box<dyn StagingSurface>) -> Self {
        Self {
            device,
            desc,
            staging,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn desc(&self) -> SurfaceDesc {
        self.desc
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::from(self.desc)
    }

    /// Still valid for this device and back buffer?
    pub fn matches(&self, device: DeviceId, desc: &SurfaceDesc) -> bool {
        self.device == device && self.desc == *desc
    }

    pub fn staging_mut(&mut self) -> &mut dyn StagingSurface {
        self.staging.as_mut()
    }
}
