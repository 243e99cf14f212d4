//! Hook for bounding the number of descriptors opened through this crate.
//!
//! Every [`File`](crate::File) acquires one permit before its open syscall and
//! gives it back exactly once, on close or drop. The default limiter never
//! refuses. [`config().open_limit`](crate::config) is the suggested bound for
//! a limiter that wants one.

use std::io;

use spin::Once;

use crate::token::CancelToken;

pub trait DescriptorLimiter: Send + Sync + 'static {
    /// Called before a descriptor is opened. May block, honoring `token`.
    fn acquire(&self, token: &CancelToken) -> io::Result<()>;

    /// Called once for every successful `acquire` whose descriptor is gone,
    /// including opens that failed.
    fn release(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl DescriptorLimiter for Unlimited {
    fn acquire(&self, _token: &CancelToken) -> io::Result<()> {
        Ok(())
    }

    fn release(&self) {}
}

static LIMITER: Once<Box<dyn DescriptorLimiter>> = Once::new();

/// Installs the process limiter. Only the first call has an effect; returns
/// false if a limiter was already in place.
pub fn set_limiter(limiter: impl DescriptorLimiter) -> bool {
    let mut installed = false;
    LIMITER.call_once(|| {
        installed = true;
        Box::new(limiter) as Box<dyn DescriptorLimiter>
    });
    installed
}

pub fn limiter() -> &'static dyn DescriptorLimiter {
    LIMITER
        .call_once(|| Box::new(Unlimited) as Box<dyn DescriptorLimiter>)
        .as_ref()
}
