use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr;

use nix::errno::Errno;
use nix::sys::signal::Signal;

use super::{SignalBackend, SignalTrampoline};

pub struct Apple;

/// Darwin has no public thread-directed kill by kernel id, so the `pthread_t`
/// is the handle and `kernel` (`thread_selfid`) is carried along for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tid {
    pthread: libc::pthread_t,
    kernel: u64,
}

impl SignalBackend for Apple {
    type ThreadId = Tid;

    fn current_thread_id() -> Tid {
        let mut kernel = 0u64;
        unsafe {
            let pthread = libc::pthread_self();
            libc::pthread_threadid_np(pthread, &mut kernel);
            Tid { pthread, kernel }
        }
    }

    fn send_signal(tid: Tid, signal: Signal) -> nix::Result<()> {
        // pthread_kill returns the error number instead of setting errno.
        match unsafe { libc::pthread_kill(tid.pthread, signal as libc::c_int) } {
            0 => Ok(()),
            errno => Err(Errno::from_raw(errno)),
        }
    }

    fn set_nonblocking(fd: BorrowedFd<'_>) {
        let fd = fd.as_raw_fd();
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags != -1 {
                let _ = libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
            }
        }
    }

    unsafe fn install_handler(signal: Signal, handler: SignalTrampoline) -> nix::Result<()> {
        // Darwin's record is { handler, mask: u32, flags }; the libc trampoline
        // (sa_tramp) is filled in by the sigaction wrapper.
        let mut sa: libc::sigaction = mem::zeroed();
        sa.sa_sigaction = handler as libc::sighandler_t;
        sa.sa_mask = !0;
        sa.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
        let res = libc::sigaction(signal as libc::c_int, &sa, ptr::null_mut());
        Errno::result(res).map(drop)
    }
}
