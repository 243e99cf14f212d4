use nix::errno::Errno;

use crate::token::CancelToken;

/// What a raw syscall attempt means for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOutcome<T = usize> {
    Success(T),
    /// EAGAIN: only seen on non-blocking descriptors. Retried.
    WouldBlock,
    /// EINTR while the token is still pending: some other signal. Retried.
    Interrupted,
    /// EINTR with the token done.
    Canceled,
    Fatal(Errno),
}

impl<T> SyscallOutcome<T> {
    pub fn classify(res: nix::Result<T>, token: &CancelToken) -> Self {
        match res {
            Ok(n) => SyscallOutcome::Success(n),
            Err(Errno::EAGAIN) => SyscallOutcome::WouldBlock,
            #[allow(unreachable_patterns)]
            Err(Errno::EWOULDBLOCK) => SyscallOutcome::WouldBlock,
            Err(Errno::EINTR) if token.is_done() => SyscallOutcome::Canceled,
            Err(Errno::EINTR) => SyscallOutcome::Interrupted,
            Err(errno) => SyscallOutcome::Fatal(errno),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SyscallOutcome::WouldBlock | SyscallOutcome::Interrupted)
    }
}
