use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use crate::types::{FrameShape, SurfaceFormat};

#[derive(Debug, Default)]
struct PoolState {
    shape: Option<FrameShape>,
    idle: Option<Vec<u8>>,
}

/// Single-entry recycle bin for frame buffers.
///
/// Buffers come back from whichever thread drops the [`Frame`], so the slot carries its own lock.
/// A buffer is only kept while its shape matches the current capture shape.
#[derive(Debug, Default)]
pub struct BufferPool {
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Switch to a new capture shape; an idle buffer of another shape is discarded.
    pub fn reshape(&self, shape: FrameShape) {
        let stale = {
            let mut state = self.state.lock();
            if state.shape == Some(shape) {
                None
            } else {
                state.shape = Some(shape);
                state.idle.take()
            }
        };
        drop(stale);
    }

    pub fn shape(&self) -> Option<FrameShape> {
        self.state.lock().shape
    }

    /// Take the idle buffer if it fits `shape` exactly, else allocate a zeroed one.
    pub fn take(&self, shape: FrameShape) -> Vec<u8> {
        let reused = {
            let mut state = self.state.lock();
            if state.shape == Some(shape) {
                state.idle.take()
            } else {
                None
            }
        };
        match reused {
            Some(buf) if buf.len() == shape.byte_len() => buf,
            _ => vec![0; shape.byte_len()],
        }
    }

    /// Offer a buffer back. Kept only if the slot is free and the shape is still current.
    pub fn give_back(&self, shape: FrameShape, buffer: Vec<u8>) {
        let rejected = {
            let mut state = self.state.lock();
            if state.shape == Some(shape)
                && state.idle.is_none()
                && buffer.len() == shape.byte_len()
            {
                state.idle = Some(buffer);
                None
            } else {
                Some(buffer)
            }
        };
        drop(rejected);
    }

    pub fn idle_count(&self) -> usize {
        usize::from(self.state.lock().idle.is_some())
    }
}

/// One captured BGRA image.
///
/// Dropping a frame hands its buffer back to the pool it came from.
pub struct Frame {
    shape: FrameShape,
    data: Vec<u8>,
    timestamp: Instant,
    pool: Weak<BufferPool>,
}

impl Frame {
    /// `data` must hold exactly `shape.byte_len()` bytes.
    pub(crate) fn new(
        shape: FrameShape,
        data: Vec<u8>,
        timestamp: Instant,
        pool: Weak<BufferPool>,
    ) -> Self {
        debug_assert_eq!(data.len(), shape.byte_len());
        Self {
            shape,
            data,
            timestamp,
            pool,
        }
    }

    /// Frame with no recycling pool, for consumers and tests that build frames by hand.
    pub fn detached(shape: FrameShape, data: Vec<u8>, timestamp: Instant) -> Option<Self> {
        (data.len() == shape.byte_len()).then(|| Self::new(shape, data, timestamp, Weak::new()))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.shape.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.shape.height
    }

    /// Row stride in bytes.
    #[inline]
    pub fn stride(&self) -> usize {
        self.shape.stride
    }

    #[inline]
    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    #[inline]
    pub fn format(&self) -> SurfaceFormat {
        SurfaceFormat::Bgra8
    }

    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// One row of pixels, without padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.shape.height {
            return None;
        }
        let start = y as usize * self.shape.stride;
        let len = self.shape.width as usize * FrameShape::BYTES_PER_PIXEL;
        self.data.get(start..start + len)
    }

    /// Keep the pixel buffer; it will not be recycled.
    pub fn into_data(mut self) -> Vec<u8> {
        self.pool = Weak::new();
        std::mem::take(&mut self.data)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.give_back(self.shape, std::mem::take(&mut self.data));
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.shape.width)
            .field("height", &self.shape.height)
            .field("stride", &self.shape.stride)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_from(pool: &Arc<BufferPool>, shape: FrameShape) -> Frame {
        Frame::new(shape, pool.take(shape), Instant::now(), Arc::downgrade(pool))
    }

    #[test]
    fn test_dropped_frame_recycles_buffer() {
        let pool = BufferPool::new();
        let shape = FrameShape::packed(4, 4);
        pool.reshape(shape);

        let frame = frame_from(&pool, shape);
        let ptr = frame.data().as_ptr();
        drop(frame);
        assert_eq!(pool.idle_count(), 1);

        let again = frame_from(&pool, shape);
        assert_eq!(again.data().as_ptr(), ptr);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_pool_holds_at_most_one() {
        let pool = BufferPool::new();
        let shape = FrameShape::packed(8, 2);
        pool.reshape(shape);

        let frames: Vec<Frame> = (0..10).map(|_| frame_from(&pool, shape)).collect();
        drop(frames);
        assert_eq!(pool.idle_count(), 1);

        for _ in 0..10 {
            drop(frame_from(&pool, shape));
            assert!(pool.idle_count() <= 1);
        }
    }

    #[test]
    fn test_stale_shape_is_discarded() {
        let pool = BufferPool::new();
        let small = FrameShape::packed(2, 2);
        let large = FrameShape::packed(4, 4);
        pool.reshape(small);

        let frame = frame_from(&pool, small);
        pool.reshape(large);
        drop(frame);
        assert_eq!(pool.idle_count(), 0);

        drop(frame_from(&pool, large));
        assert_eq!(pool.idle_count(), 1);
        pool.reshape(small);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_equal_length_reshape_discards_idle() {
        let pool = BufferPool::new();
        let wide = FrameShape::packed(4, 2);
        let tall = FrameShape::packed(2, 4);
        assert_eq!(wide.byte_len(), tall.byte_len());
        pool.reshape(wide);

        drop(frame_from(&pool, wide));
        assert_eq!(pool.idle_count(), 1);

        pool.reshape(tall);
        assert_eq!(pool.idle_count(), 0);

        pool.reshape(tall);
        drop(frame_from(&pool, tall));
        pool.reshape(tall);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_into_data_skips_pool() {
        let pool = BufferPool::new();
        let shape = FrameShape::packed(2, 2);
        pool.reshape(shape);

        let data = frame_from(&pool, shape).into_data();
        assert_eq!(data.len(), shape.byte_len());
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_row_access() {
        let shape = FrameShape::packed(2, 2);
        let data: Vec<u8> = (0..16).collect();
        let frame = Frame::detached(shape, data, Instant::now()).unwrap();
        assert_eq!(frame.row(1), Some(&[8, 9, 10, 11, 12, 13, 14, 15][..]));
        assert_eq!(frame.row(2), None);
        assert!(Frame::detached(shape, vec![0; 3], Instant::now()).is_none());
    }
}
