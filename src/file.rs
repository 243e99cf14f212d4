use std::ffi::CString;
use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use crate::error::Error;
use crate::io::{cancellable, FileIo};
use crate::limit::limiter;
use crate::platform;
use crate::scope::InterruptScope;
use crate::token::CancelToken;

/// One descriptor handed out by the limiter. Released exactly once, on drop.
struct Permit(());

impl Permit {
    fn acquire(token: &CancelToken) -> io::Result<Self> {
        limiter().acquire(token)?;
        Ok(Permit(()))
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        limiter().release();
    }
}

/// An open descriptor. Dropping the `File` closes it; so does [`File::close`].
pub struct File {
    fd: OwnedFd,
    name: PathBuf,
    _permit: Permit,
}

impl File {
    /// Binds this file to `token`. The descriptor is shared; call `io` again to rebind.
    pub fn io<'a>(&'a self, token: &'a CancelToken) -> FileIo<'a> {
        FileIo::new(self, token)
    }

    /// The path given to open, or `|0`/`|1` for the ends of a pipe.
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Equivalent to `O_NONBLOCK`. Errors are ignored.
    pub fn set_nonblocking(&self) {
        platform::set_nonblocking(self.fd.as_fd());
    }

    /// Closes the descriptor. It is released even if this returns an error.
    ///
    /// `close` is never retried: after `EINTR` the descriptor is already gone.
    pub fn close(self, token: &CancelToken) -> io::Result<()> {
        let File { fd, name, _permit } = self;
        let scope = match InterruptScope::begin(token) {
            Ok(scope) => scope,
            Err(err) => {
                drop(fd);
                return Err(err.into());
            }
        };
        let res = Errno::result(unsafe { libc::close(fd.into_raw_fd()) });
        drop(scope);
        tracing::debug!(path = %name.display(), ?res, "close");
        match res {
            Ok(_) => Ok(()),
            Err(Errno::EINTR) if token.is_done() => Err(Error::canceled("close", name).into()),
            Err(Errno::EINTR) => Ok(()),
            Err(errno) => Err(errno.into()),
        }
    }
}

impl AsFd for File {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for File {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("fd", &self.fd.as_raw_fd())
            .field("name", &self.name)
            .finish()
    }
}

/// Opens `path` read-only.
pub fn open(token: &CancelToken, path: impl AsRef<Path>) -> io::Result<File> {
    open_with_flags(token, path, OFlag::O_RDONLY, Mode::empty())
}

/// Opens `path` read-write, creating or truncating it.
pub fn create(token: &CancelToken, path: impl AsRef<Path>) -> io::Result<File> {
    open_with_flags(
        token,
        path,
        OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_TRUNC,
        Mode::from_bits_truncate(0o666),
    )
}

/// The generalized open. `O_CLOEXEC` is always added.
///
/// Runs under an interrupt scope, so an open that blocks (a FIFO with no peer)
/// can be canceled.
pub fn open_with_flags(
    token: &CancelToken,
    path: impl AsRef<Path>,
    flags: OFlag,
    mode: Mode,
) -> io::Result<File> {
    let path = path.as_ref();
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a nul byte"))?;
    let permit = Permit::acquire(token)?;
    let flags = (flags | OFlag::O_CLOEXEC).bits();

    let fd = cancellable(token, "open", path, || {
        Errno::result(unsafe { libc::open(c_path.as_ptr(), flags, mode.bits() as libc::c_uint) })
    })?;
    tracing::debug!(path = %path.display(), fd, "open");

    Ok(File {
        fd: unsafe { OwnedFd::from_raw_fd(fd) },
        name: path.to_path_buf(),
        _permit: permit,
    })
}

/// Returns the read and write ends of a new pipe, both in blocking mode.
///
/// Creating a pipe does not block, so `token` is only passed to the limiter.
pub fn pipe(token: &CancelToken) -> io::Result<(File, File)> {
    let read_permit = Permit::acquire(token)?;
    let write_permit = Permit::acquire(token)?;

    let mut fds = [0; 2];
    Errno::result(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    let [reader, writer] = fds.map(|fd| unsafe { OwnedFd::from_raw_fd(fd) });
    for fd in [&reader, &writer] {
        Errno::result(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })?;
    }

    Ok((
        File {
            fd: reader,
            name: PathBuf::from("|0"),
            _permit: read_permit,
        },
        File {
            fd: writer,
            name: PathBuf::from("|1"),
            _permit: write_permit,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn pipe_round_trip() {
        let token = CancelToken::new();
        let (r, w) = pipe(&token).unwrap();
        assert_eq!(r.name(), Path::new("|0"));
        assert_eq!(w.name(), Path::new("|1"));

        w.io(&token).write_all(b"ping").unwrap();
        let mut buf = [0; 4];
        r.io(&token).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        w.close(&token).unwrap();
        let mut rest = Vec::new();
        r.io(&token).read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn open_missing_is_fatal_not_canceled() {
        let token = CancelToken::new();
        let err = open(&token, "/nonexistent/cancelio/file").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
        assert!(!crate::is_canceled(&err));
    }

    #[test]
    fn open_with_done_token_is_canceled() {
        let token = CancelToken::new();
        token.cancel();
        let err = open(&token, "/dev/null").unwrap_err();
        assert!(crate::is_canceled(&err));
    }

    #[test]
    fn nul_in_path_is_rejected() {
        let token = CancelToken::new();
        let err = open(&token, "bad\0path").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn pipe_ends_are_cloexec() {
        let token = CancelToken::new();
        let (r, w) = pipe(&token).unwrap();
        for file in [&r, &w] {
            let flags = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETFD) };
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }
}
