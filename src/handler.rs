//! Process-wide installation of the interrupt signal handler.
//!
//! The kernel only ever sees [`trampoline`]. It forwards to whatever
//! [`InterruptHandler`] the [`HandlerRegistry`] currently holds, which is a
//! no-op in production. Tests swap in an observable handler through
//! [`HandlerRegistry::override_handler`]; the kernel-side disposition is never
//! touched again after the first install.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use spin::Once;

use crate::error::{Error, Result};
use crate::platform::{Backend, SignalBackend};
use crate::INTERRUPT_SIGNAL;

/// Called in signal context. Must not allocate, lock, or log.
pub type InterruptHandler = fn(libc::c_int);

pub struct HandlerRegistry {
    // Null means the no-op handler.
    current: AtomicPtr<()>,
    invocations: AtomicUsize,
    installed: Once<Result<(), Errno>>,
}

static REGISTRY: HandlerRegistry = HandlerRegistry::new();

pub fn registry() -> &'static HandlerRegistry {
    &REGISTRY
}

/// Installs the interrupt handler once per process. Later calls return the cached outcome.
pub fn ensure_installed() -> Result<()> {
    REGISTRY.ensure_installed()
}

extern "C" fn trampoline(sig: libc::c_int, _info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
    REGISTRY.invocations.fetch_add(1, Ordering::Relaxed);
    let handler = REGISTRY.current.load(Ordering::Acquire);
    if !handler.is_null() {
        // Only ever stored from an `InterruptHandler` in `swap`.
        let handler = unsafe { std::mem::transmute::<*mut (), InterruptHandler>(handler) };
        handler(sig);
    }
}

impl HandlerRegistry {
    const fn new() -> Self {
        HandlerRegistry {
            current: AtomicPtr::new(ptr::null_mut()),
            invocations: AtomicUsize::new(0),
            installed: Once::new(),
        }
    }

    pub fn ensure_installed(&self) -> Result<()> {
        let res = self.installed.call_once(|| {
            let res = unsafe { Backend::install_handler(INTERRUPT_SIGNAL, trampoline) };
            match res {
                Ok(()) => tracing::debug!(
                    signal = signal_name(INTERRUPT_SIGNAL),
                    "installed interrupt handler"
                ),
                Err(errno) => tracing::error!(
                    signal = signal_name(INTERRUPT_SIGNAL),
                    %errno,
                    "failed to install interrupt handler"
                ),
            }
            res
        });
        (*res).map_err(|source| Error::HandlerInstall {
            signal: INTERRUPT_SIGNAL,
            source,
        })
    }

    /// Number of times the kernel entered the handler, across all threads.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    fn swap(&self, handler: Option<InterruptHandler>) -> Option<InterruptHandler> {
        let new = handler.map_or(ptr::null_mut(), |h| h as *mut ());
        let old = self.current.swap(new, Ordering::AcqRel);
        if old.is_null() {
            None
        } else {
            Some(unsafe { std::mem::transmute::<*mut (), InterruptHandler>(old) })
        }
    }

    /// Routes the interrupt signal to `handler` until the guard is dropped,
    /// then restores whatever was there before.
    pub fn override_handler(&'static self, handler: InterruptHandler) -> HandlerOverride {
        let previous = self.swap(Some(handler));
        HandlerOverride {
            registry: self,
            previous,
        }
    }
}

#[must_use = "the previous handler is restored when this guard is dropped"]
pub struct HandlerOverride {
    registry: &'static HandlerRegistry,
    previous: Option<InterruptHandler>,
}

impl Drop for HandlerOverride {
    fn drop(&mut self) {
        self.registry.swap(self.previous.take());
    }
}

pub(crate) fn signal_name(signal: Signal) -> &'static str {
    signal_hook::low_level::signal_name(signal as libc::c_int).unwrap_or("unknown signal")
}
