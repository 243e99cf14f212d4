//! Cancellable blocking file I/O for POSIX.
//!
//! A [`File`] is opened with [`open`], [`create`], [`open_with_flags`] or
//! [`pipe`], and bound to a [`CancelToken`] with [`File::io`]:
//!
//! ```no_run
//! use std::io::Read;
//! use std::time::Duration;
//!
//! let token = cancelio::CancelToken::with_timeout(Duration::from_secs(1));
//! let file = cancelio::open(&token, "/etc/hosts")?;
//! let mut data = Vec::new();
//! file.io(&token).read_to_end(&mut data)?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! A blocked syscall is unblocked by sending [`INTERRUPT_SIGNAL`] (`SIGUSR1`)
//! to the thread running it once the token is done. Programs using this crate
//! must not use that signal for anything else. Call [`init`] early in `main`
//! so a failure to install the handler stops startup instead of surfacing on
//! the first cancellable call.
//!
//! Cancellation is advisory; see [`io`] for calls the kernel will not give up.

use nix::sys::signal::Signal;

pub mod config;
pub mod error;
pub mod file;
pub mod handler;
pub mod io;
pub mod limit;
pub mod outcome;
pub mod platform;
pub mod scope;
pub mod token;

pub use crate::config::{config, Config};
pub use crate::error::{is_canceled, Error, PartialWrite, Result};
pub use crate::file::{create, open, open_with_flags, pipe, File};
pub use crate::io::FileIo;
pub use crate::outcome::SyscallOutcome;
pub use crate::scope::InterruptScope;
pub use crate::token::{CancelReason, CancelToken};

/// Reserved for interrupting blocked calls.
pub const INTERRUPT_SIGNAL: Signal = Signal::SIGUSR1;

/// Process-wide setup: installs the interrupt handler and detects [`Config`].
///
/// Idempotent. Every cancellable call also installs the handler on demand.
pub fn init() -> Result<&'static Config> {
    handler::ensure_installed()?;
    Ok(config())
}
