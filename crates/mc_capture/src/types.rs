use serde::{Deserialize, Serialize};

/// Screen rectangle in virtual-desktop coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl CaptureRegion {
    pub const EMPTY: CaptureRegion = CaptureRegion {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build a region from an origin and a size.
    pub fn from_origin_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    /// Horizontal extent, saturating at the `i32` range.
    #[inline]
    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    /// Vertical extent, saturating at the `i32` range.
    #[inline]
    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    /// A region with no positive area never reaches the compositor.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
}

/// Opaque window identifier.
///
/// Keeps platform window handles (e.g. Win32 `HWND`) out of the neutral crate. Backends convert
/// to and from raw handles as needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(usize);

impl WindowHandle {
    pub const INVALID: WindowHandle = WindowHandle(0);

    #[inline]
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> usize {
        self.0
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Windows that must never appear in composited output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeList {
    windows: Vec<WindowHandle>,
}

impl ExcludeList {
    /// Invalid handles and duplicates are dropped; first-seen order is kept.
    pub fn new(handles: impl IntoIterator<Item = WindowHandle>) -> Self {
        let mut windows: Vec<WindowHandle> = Vec::new();
        for handle in handles {
            if handle.is_valid() && !windows.contains(&handle) {
                windows.push(handle);
            }
        }
        Self { windows }
    }

    pub fn as_slice(&self) -> &[WindowHandle] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains(&self, handle: WindowHandle) -> bool {
        self.windows.contains(&handle)
    }
}

/// Pixel layout of a device surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// 32-bit, bytes ordered B, G, R, A.
    Bgra8,
    /// Any other native format code.
    Other(u32),
}

impl SurfaceFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            SurfaceFormat::Bgra8 => Some(4),
            SurfaceFormat::Other(_) => None,
        }
    }
}

/// Size and format of a render target or back buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
}

impl SurfaceDesc {
    pub fn new(width: u32, height: u32, format: SurfaceFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Identity of a native graphics device (its interface pointer on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(usize);

impl DeviceId {
    #[inline]
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> usize {
        self.0
    }
}

/// Buffer geometry of a BGRA frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes.
    pub stride: usize,
}

impl FrameShape {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Tightly packed BGRA shape.
    pub fn packed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stride: width as usize * Self::BYTES_PER_PIXEL,
        }
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.stride * self.height as usize
    }
}

impl From<SurfaceDesc> for FrameShape {
    fn from(desc: SurfaceDesc) -> Self {
        FrameShape::packed(desc.width, desc.height)
    }
}
