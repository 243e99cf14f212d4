//! Fallback for the BSDs and other POSIX targets: `pthread_kill` on a `pthread_t`.

use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr;

use nix::errno::Errno;
use nix::sys::signal::Signal;

use super::{SignalBackend, SignalTrampoline};

pub struct Pthread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tid(libc::pthread_t);

// pthread_t is a pointer on some of these targets; it is only ever passed back to pthread_kill.
unsafe impl Send for Tid {}
unsafe impl Sync for Tid {}

impl SignalBackend for Pthread {
    type ThreadId = Tid;

    fn current_thread_id() -> Tid {
        Tid(unsafe { libc::pthread_self() })
    }

    fn send_signal(tid: Tid, signal: Signal) -> nix::Result<()> {
        match unsafe { libc::pthread_kill(tid.0, signal as libc::c_int) } {
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
        let mut sa: libc::sigaction = mem::zeroed();
        sa.sa_sigaction = handler as libc::sighandler_t;
        sa.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
        libc::sigfillset(&mut sa.sa_mask);
        let res = libc::sigaction(signal as libc::c_int, &sa, ptr::null_mut());
        Errno::result(res).map(drop)
    }
}
