//! Per-OS signal primitives.
//!
//! Each target family gets its own backend module with its own idea of a
//! thread id and its own signal-action record. Exactly one is compiled in and
//! exported as [`Backend`].

use std::fmt;
use std::os::fd::BorrowedFd;

use nix::sys::signal::Signal;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use self::linux::Linux as Backend;

#[cfg(any(target_os = "macos", target_os = "ios"))]
mod apple;
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub use self::apple::Apple as Backend;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
mod pthread;
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
pub use self::pthread::Pthread as Backend;

/// Entry point handed to the kernel, in `SA_SIGINFO` form.
pub type SignalTrampoline = extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void);

pub trait SignalBackend {
    /// Kernel-level name of an OS thread. Only meaningful for the call it was sampled for.
    type ThreadId: Copy + Eq + Send + Sync + fmt::Debug + 'static;

    fn current_thread_id() -> Self::ThreadId;

    /// Delivers `signal` to exactly `tid`. Callers ignore failure: the target may already be gone.
    fn send_signal(tid: Self::ThreadId, signal: Signal) -> nix::Result<()>;

    /// Best effort; errors are swallowed.
    fn set_nonblocking(fd: BorrowedFd<'_>);

    /// Installs `handler` for `signal` on the alternate stack, without `SA_RESTART`.
    ///
    /// # Safety
    ///
    /// `handler` runs in signal context and must be async-signal-safe.
    unsafe fn install_handler(signal: Signal, handler: SignalTrampoline) -> nix::Result<()>;
}

pub type ThreadId = <Backend as SignalBackend>::ThreadId;

pub fn current_thread_id() -> ThreadId {
    Backend::current_thread_id()
}

pub fn send_signal(tid: ThreadId, signal: Signal) -> nix::Result<()> {
    Backend::send_signal(tid, signal)
}

pub fn set_nonblocking(fd: BorrowedFd<'_>) {
    Backend::set_nonblocking(fd)
}
