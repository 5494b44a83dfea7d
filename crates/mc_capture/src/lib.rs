//! Platform-neutral capture core.
//!
//! A [`CaptureWorker`] owns one thread that drives a compositor host and snapshots graphics
//! devices presenting on that thread. Frames leave through a latest-wins mailbox polled with
//! [`CaptureWorker::pop_video`]. The [`HookRegistry`] installs device interception through a
//! platform [`HookBackend`] and routes intercepted calls to the worker owning the calling thread.

pub mod defaults;
pub mod device;
pub mod directory;
pub mod error;
pub mod frame;
pub mod hook;
pub mod host;
pub mod mailbox;
pub mod registry;
pub mod settings;
pub mod task_queue;
mod thread_bound;
pub mod types;
pub mod worker;

pub use device::{DeviceBinding, MappedSurface, RenderDevice, StagingSurface};
pub use directory::{DirectoryRouter, ThreadDirectory, WorkerDirectory};
pub use error::{CaptureError, CaptureResult};
pub use frame::{BufferPool, Frame};
pub use hook::{EntryPoint, HookBackend, HookRouter, HookSet, HookTarget, HookToken, Interceptor};
pub use host::{CaptureHost, HostEvent, HostFactory, HostOptions, HostWaker};
pub use mailbox::{FrameMailbox, VideoPoll};
pub use registry::HookRegistry;
pub use settings::CaptureSettings;
pub use task_queue::{Task, TaskQueue};
pub use types::{
    CaptureRegion, DeviceId, ExcludeList, FrameShape, SurfaceDesc, SurfaceFormat, WindowHandle,
};
pub use worker::{CaptureWorker, WorkerState};
