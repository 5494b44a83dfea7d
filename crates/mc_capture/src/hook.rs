use std::sync::Arc;

use crate::device::RenderDevice;
use crate::error::CaptureResult;

/// Device entry points the capture path intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    PresentEx,
    Reset,
    ResetEx,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 3] = [EntryPoint::PresentEx, EntryPoint::Reset, EntryPoint::ResetEx];

    pub fn name(self) -> &'static str {
        match self {
            EntryPoint::PresentEx => "PresentEx",
            EntryPoint::Reset => "Reset",
            EntryPoint::ResetEx => "ResetEx",
        }
    }
}

/// Where to redirect one entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookTarget {
    pub entry: EntryPoint,
    /// Address of the function-pointer cell to rewrite (a vtable slot).
    pub location: usize,
    /// Address of the replacement function.
    pub replacement: usize,
}

/// Proof of one active redirection, holding the pointer it displaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookToken {
    entry: EntryPoint,
    location: usize,
    original: usize,
}

impl HookToken {
    pub fn new(entry: EntryPoint, location: usize, original: usize) -> Self {
        Self {
            entry,
            location,
            original,
        }
    }

    pub fn entry(&self) -> EntryPoint {
        self.entry
    }

    pub fn location(&self) -> usize {
        self.location
    }

    /// Address the entry point held before it was redirected.
    pub fn original(&self) -> usize {
        self.original
    }
}

/// Redirects function-pointer cells and puts them back.
pub trait Interceptor: Send + Sync {
    /// # Safety
    ///
    /// `target.location` must address a live, pointer-aligned function-pointer cell, and
    /// `target.replacement` must be a function with the same signature and calling convention.
    unsafe fn attach(&self, target: &HookTarget) -> CaptureResult<HookToken>;

    /// # Safety
    ///
    /// `token` must come from [`Interceptor::attach`] on this interceptor and the cell must still
    /// be live.
    unsafe fn detach(&self, token: &HookToken) -> CaptureResult<()>;
}

/// Every redirection installed as one unit.
#[derive(Debug, Default)]
pub struct HookSet {
    tokens: Vec<HookToken>,
}

impl HookSet {
    /// Attach every target, or none: on failure the ones already attached are rolled back.
    ///
    /// # Safety
    ///
    /// See [`Interceptor::attach`].
    pub unsafe fn attach_all(
        interceptor: &dyn Interceptor,
        targets: &[HookTarget],
    ) -> CaptureResult<Self> {
        let mut tokens = Vec::with_capacity(targets.len());
        for target in targets {
            // SAFETY: forwarded from the caller.
            match unsafe { interceptor.attach(target) } {
                Ok(token) => tokens.push(token),
                Err(e) => {
                    tracing::warn!(entry = target.entry.name(), error = %e, "hook attach failed");
                    for token in tokens.iter().rev() {
                        // SAFETY: the token was just produced by this interceptor.
                        if let Err(err) = unsafe { interceptor.detach(token) } {
                            tracing::error!(entry = token.entry.name(), error = %err, "hook rollback failed");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self { tokens })
    }

    pub fn original(&self, entry: EntryPoint) -> Option<usize> {
        self.tokens
            .iter()
            .find(|token| token.entry == entry)
            .map(HookToken::original)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Restore every cell, newest first. Keeps going past failures and reports the first one.
    ///
    /// # Safety
    ///
    /// See [`Interceptor::detach`].
    pub unsafe fn detach_all(self, interceptor: &dyn Interceptor) -> CaptureResult<()> {
        let mut first_error = None;
        for token in self.tokens.iter().rev() {
            // SAFETY: forwarded from the caller.
            if let Err(e) = unsafe { interceptor.detach(token) } {
                tracing::error!(entry = token.entry.name(), error = %e, "hook detach failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Receives intercepted device calls on whatever thread made them.
pub trait HookRouter: Send + Sync {
    /// A present is about to happen on `device`.
    fn on_present(&self, device: &dyn RenderDevice);

    /// The device is about to reset; cached resources tied to it must go.
    fn on_reset(&self);
}

/// Installs the process-wide interception and forwards calls to a router.
pub trait HookBackend: Send + Sync {
    fn install(&self, router: Arc<dyn HookRouter>) -> CaptureResult<()>;

    /// Restore the original entry points. Safe to call when nothing is installed.
    fn uninstall(&self);
}
