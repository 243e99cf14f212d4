//! Cancellable read, write and seek on a [`File`].
//!
//! Every operation runs inside one [`InterruptScope`] and loops on the raw
//! syscall until it succeeds, fails for real, or the token is done:
//!
//! - `EAGAIN` is retried at once (non-blocking descriptors only).
//! - `EINTR` with the token still pending is a stray signal and is retried.
//! - `EINTR` with the token done, or a done token seen between attempts,
//!   ends the call with [`Error::Canceled`].
//! - Anything else is returned as is.
//!
//! Some calls cannot be interrupted at all: linux restarts regular disk I/O
//! regardless of `SA_RESTART`, and darwin restarts a pipe write that has
//! already moved bytes. Cancellation is advisory. Callers that need a latency
//! bound should put the descriptor in non-blocking mode, so the wait happens
//! in the retry loop instead of the kernel.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::thread;

use nix::errno::Errno;

use crate::error::{Error, PartialWrite};
use crate::file::File;
use crate::outcome::SyscallOutcome;
use crate::scope::InterruptScope;
use crate::token::CancelToken;

/// Runs `call` under an interrupt scope until it produces a result.
pub(crate) fn cancellable<T>(
    token: &CancelToken,
    op: &'static str,
    path: &Path,
    mut call: impl FnMut() -> nix::Result<T>,
) -> io::Result<T> {
    let _scope = InterruptScope::begin(token)?;
    loop {
        if token.is_done() {
            return Err(canceled(op, path));
        }
        match SyscallOutcome::classify(call(), token) {
            SyscallOutcome::Success(value) => return Ok(value),
            SyscallOutcome::WouldBlock => thread::yield_now(),
            SyscallOutcome::Interrupted => {
                tracing::trace!(op, path = %path.display(), "spurious interrupt, retrying")
            }
            SyscallOutcome::Canceled => return Err(canceled(op, path)),
            SyscallOutcome::Fatal(errno) => return Err(errno.into()),
        }
    }
}

fn canceled(op: &'static str, path: &Path) -> io::Error {
    tracing::debug!(op, path = %path.display(), "canceled");
    Error::canceled(op, path).into()
}

fn byte_count(res: libc::ssize_t) -> nix::Result<usize> {
    Errno::result(res).map(|n| n as usize)
}

fn to_off_t(offset: u64) -> io::Result<libc::off_t> {
    libc::off_t::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))
}

/// A [`File`] bound to a [`CancelToken`]. Borrows both.
#[derive(Debug, Clone, Copy)]
pub struct FileIo<'a> {
    file: &'a File,
    token: &'a CancelToken,
}

impl<'a> FileIo<'a> {
    pub(crate) fn new(file: &'a File, token: &'a CancelToken) -> Self {
        FileIo { file, token }
    }

    pub fn file(&self) -> &'a File {
        self.file
    }

    pub fn token(&self) -> &'a CancelToken {
        self.token
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Reads into `buf`. `Ok(0)` means end of file; "no data yet" keeps waiting.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let fd = self.fd();
        cancellable(self.token, "read", self.file.name(), || {
            byte_count(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })
        })
    }

    /// Writes all of `buf` unless the token ends the call first.
    ///
    /// On failure, [`PartialWrite::written`] says how much of the front of
    /// `buf` was accepted by the kernel.
    pub fn write_full(&self, buf: &[u8]) -> Result<usize, PartialWrite> {
        if buf.is_empty() {
            return Ok(0);
        }
        let path = self.file.name();
        let fail = |written: usize, error: io::Error| PartialWrite { written, error };
        let _scope = InterruptScope::begin(self.token).map_err(|e| fail(0, e.into()))?;

        let fd = self.fd();
        let mut written = 0;
        while written < buf.len() {
            if self.token.is_done() {
                return Err(fail(written, canceled("write", path)));
            }
            let rest = &buf[written..];
            let res = byte_count(unsafe { libc::write(fd, rest.as_ptr().cast(), rest.len()) });
            match SyscallOutcome::classify(res, self.token) {
                SyscallOutcome::Success(0) => break,
                SyscallOutcome::Success(n) => written += n,
                SyscallOutcome::WouldBlock => thread::yield_now(),
                SyscallOutcome::Interrupted => {
                    tracing::trace!(path = %path.display(), written, "spurious interrupt, retrying")
                }
                SyscallOutcome::Canceled => {
                    return Err(fail(written, canceled("write", path)))
                }
                SyscallOutcome::Fatal(errno) => return Err(fail(written, errno.into())),
            }
        }
        Ok(written)
    }

    pub fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        let (off, whence) = match pos {
            SeekFrom::Start(n) => (to_off_t(n)?, libc::SEEK_SET),
            SeekFrom::End(n) => (n as libc::off_t, libc::SEEK_END),
            SeekFrom::Current(n) => (n as libc::off_t, libc::SEEK_CUR),
        };
        let fd = self.fd();
        let pos = cancellable(self.token, "seek", self.file.name(), || {
            Errno::result(unsafe { libc::lseek(fd, off, whence) })
        })?;
        Ok(pos as u64)
    }

    /// Positional read; does not move the file offset. `Ok(0)` means `offset` is at or past
    /// the end of the file.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let off = to_off_t(offset)?;
        let fd = self.fd();
        cancellable(self.token, "read", self.file.name(), || {
            byte_count(unsafe { libc::pread(fd, buf.as_mut_ptr().cast(), buf.len(), off) })
        })
    }

    /// Positional write of a single chunk.
    pub fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let off = to_off_t(offset)?;
        let fd = self.fd();
        cancellable(self.token, "write", self.file.name(), || {
            byte_count(unsafe { libc::pwrite(fd, buf.as_ptr().cast(), buf.len(), off) })
        })
    }
}

impl Read for FileIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FileIo::read(self, buf)
    }
}

impl Write for FileIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_full(buf) {
            Ok(n) => Ok(n),
            // Report the progress; the next call sees the same token and fails.
            Err(partial) if partial.written > 0 => Ok(partial.written),
            Err(partial) => Err(partial.error),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FileIo<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        FileIo::seek(self, pos)
    }
}

impl FileExt for FileIo<'_> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileIo::read_at(self, buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        FileIo::write_at(self, buf, offset)
    }
}
