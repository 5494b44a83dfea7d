use std::sync::Arc;
use std::time::Duration;

use crate::error::CaptureResult;
use crate::types::{CaptureRegion, ExcludeList};

/// Wake source reported by a host's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// The tick timer fired.
    Tick,
    /// A task was queued from another thread.
    Wake,
    /// The host window is gone; the loop must end.
    Closed,
}

/// Options a host is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostOptions {
    pub tick_interval: Duration,
}

/// Thread-side half of a capture host: the compositor window and its event loop.
///
/// Created on, used on, and dropped on the worker thread. Implementations own the platform event
/// loop; the worker drives it through [`CaptureHost::next_event`].
pub trait CaptureHost {
    /// Block until the next timer tick, task wake, or close.
    fn next_event(&mut self) -> HostEvent;

    /// Replace the tick timer period.
    fn set_tick_interval(&mut self, interval: Duration) -> CaptureResult<()>;

    /// Hide these windows from composited output.
    fn set_exclude_list(&mut self, windows: &ExcludeList) -> CaptureResult<()>;

    /// Move the host over `region` and re-source the compositor from it.
    ///
    /// Never called with an empty region.
    fn render_region(&mut self, region: CaptureRegion) -> CaptureResult<()>;

    /// Destroy the host window; the following [`CaptureHost::next_event`] calls return
    /// [`HostEvent::Closed`].
    fn close(&mut self);
}

/// Cross-thread handle that wakes a host's event loop.
pub trait HostWaker: Send + Sync {
    /// Returns `false` when the host window no longer exists.
    fn wake(&self) -> bool;
}

/// Builds capture hosts on the worker thread.
pub trait HostFactory: Send + Sync + 'static {
    fn create(
        &self,
        options: &HostOptions,
    ) -> CaptureResult<(Box<dyn CaptureHost>, Arc<dyn HostWaker>)>;
}
