use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::signal::Signal;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation was stopped because its token is done.
    #[error("{op} {}: operation canceled", path.display())]
    Canceled { op: &'static str, path: PathBuf },
    /// The interrupt handler could not be installed; cancellation cannot work.
    #[error("failed to install {signal} handler: {source}")]
    HandlerInstall { signal: Signal, source: Errno },
    /// An interrupt scope was opened while another one is active on this thread.
    #[error("interrupt scope already active on this thread")]
    NestedScope,
    #[error("failed to start interrupt watcher: {0}")]
    Watcher(#[source] io::Error),
}

impl Error {
    pub fn canceled(op: &'static str, path: impl Into<PathBuf>) -> Self {
        Error::Canceled {
            op,
            path: path.into(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled { .. })
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Watcher(source) => source,
            // Not ErrorKind::Interrupted: std's read_to_end and write_all retry that kind.
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// Returns true if `error` carries the cancellation error of this crate.
pub fn is_canceled(error: &io::Error) -> bool {
    error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<Error>())
        .is_some_and(Error::is_canceled)
}

/// A write that stopped early. `written` bytes of the buffer reached the kernel.
#[derive(Debug, thiserror::Error)]
#[error("write stopped after {written} bytes: {error}")]
pub struct PartialWrite {
    pub written: usize,
    #[source]
    pub error: io::Error,
}

impl PartialWrite {
    pub fn is_canceled(&self) -> bool {
        is_canceled(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_survives_io_conversion() {
        let err: io::Error = Error::canceled("read", "/tmp/x").into();
        assert!(is_canceled(&err));
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(err.to_string(), "read /tmp/x: operation canceled");
    }

    #[test]
    fn fatal_is_not_canceled() {
        let err = io::Error::from(Errno::EBADF);
        assert!(!is_canceled(&err));
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[test]
    fn watcher_error_passes_through() {
        let err: io::Error = Error::Watcher(io::Error::from(Errno::EAGAIN)).into();
        assert_eq!(err.raw_os_error(), Some(libc::EAGAIN));
    }
}
