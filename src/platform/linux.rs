use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr;

use nix::errno::Errno;
use nix::sys::signal::Signal;

use super::{SignalBackend, SignalTrampoline};

pub struct Linux;

/// Kernel task id, as returned by `gettid(2)`. Not a `pthread_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tid(libc::pid_t);

impl SignalBackend for Linux {
    type ThreadId = Tid;

    fn current_thread_id() -> Tid {
        // gettid cannot fail.
        Tid(unsafe { libc::syscall(libc::SYS_gettid) } as libc::pid_t)
    }

    fn send_signal(tid: Tid, signal: Signal) -> nix::Result<()> {
        // tgkill rather than tkill, so a recycled tid in another process is never hit.
        let res = unsafe {
            libc::syscall(
                libc::SYS_tgkill,
                libc::getpid(),
                tid.0,
                signal as libc::c_int,
            )
        };
        Errno::result(res).map(drop)
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
        // sa_restorer stays null, libc fills in __restore_rt before calling rt_sigaction.
        // No SA_RESTART: the interrupted call must come back with EINTR.
        let mut sa: libc::sigaction = mem::zeroed();
        sa.sa_sigaction = handler as libc::sighandler_t;
        sa.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
        libc::sigfillset(&mut sa.sa_mask);
        let res = libc::sigaction(signal as libc::c_int, &sa, ptr::null_mut());
        Errno::result(res).map(drop)
    }
}
