use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Canceled,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Canceled => write!(f, "canceled"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// One-shot cancellation handle.
///
/// A token starts pending and becomes done exactly once, either through
/// [`CancelToken::cancel`] or because its deadline passed. It never becomes
/// pending again. Clones share state.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    canceled: AtomicBool,
    // Dropping the sender disconnects every receiver, which is how waiters observe `cancel`.
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that only becomes done through `cancel`.
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (tx, rx) = channel::bounded(0);
        CancelToken {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                done: rx,
                deadline,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
        self.inner.trigger.lock().take();
    }

    pub fn is_done(&self) -> bool {
        self.reason().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        if self.inner.canceled.load(Ordering::Acquire) {
            return Some(CancelReason::Canceled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Receiver that disconnects on `cancel`. It does not observe the deadline;
    /// pair it with [`CancelToken::deadline`] when selecting.
    pub(crate) fn cancel_channel(&self) -> &Receiver<()> {
        &self.inner.done
    }

    pub(crate) fn deadline_channel(&self) -> Receiver<Instant> {
        match self.inner.deadline {
            Some(deadline) => channel::at(deadline),
            None => channel::never(),
        }
    }

    /// Blocks until the token is done.
    pub fn wait(&self) -> CancelReason {
        let deadline = self.deadline_channel();
        select! {
            recv(self.cancel_channel()) -> _ => CancelReason::Canceled,
            recv(deadline) -> _ => self.reason().unwrap_or(CancelReason::DeadlineExceeded),
        }
    }

    /// Blocks until the token is done or `timeout` elapses. Returns the reason if done.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CancelReason> {
        let deadline = self.deadline_channel();
        select! {
            recv(self.cancel_channel()) -> _ => Some(CancelReason::Canceled),
            recv(deadline) -> _ => self.reason(),
            default(timeout) => self.reason(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}
