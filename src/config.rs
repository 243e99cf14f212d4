use nix::sys::resource::{getrlimit, Resource};
use nix::sys::signal::Signal;
use spin::Once;

use crate::INTERRUPT_SIGNAL;

/// Used when RLIMIT_NOFILE cannot be read or is unlimited.
const FALLBACK_OPEN_LIMIT: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Reserved for interrupting blocked calls. Fixed at build time.
    pub interrupt_signal: Signal,
    /// Suggested cap on descriptors opened through this crate: 90% of the soft
    /// RLIMIT_NOFILE at startup. Advisory; see [`crate::limit`].
    pub open_limit: usize,
}

impl Config {
    pub fn detect() -> Self {
        let soft = match getrlimit(Resource::RLIMIT_NOFILE) {
            Ok((soft, _hard)) if soft != libc::RLIM_INFINITY => soft as u64,
            Ok(_) => FALLBACK_OPEN_LIMIT,
            Err(errno) => {
                tracing::warn!(%errno, "getrlimit(RLIMIT_NOFILE) failed");
                FALLBACK_OPEN_LIMIT
            }
        };
        Config {
            interrupt_signal: INTERRUPT_SIGNAL,
            open_limit: open_limit_for(soft),
        }
    }
}

fn open_limit_for(soft: u64) -> usize {
    let limit = soft - soft / 10;
    usize::try_from(limit).unwrap_or(usize::MAX)
}

/// Process-wide configuration, detected on first use.
pub fn config() -> &'static Config {
    static CONFIG: Once<Config> = Once::new();
    CONFIG.call_once(Config::detect)
}
