use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};
use crossbeam::select;

use crate::error::{Error, Result};
use crate::handler;
use crate::platform::{self, ThreadId};
use crate::token::CancelToken;
use crate::INTERRUPT_SIGNAL;

thread_local! {
    static PINNED: Cell<bool> = const { Cell::new(false) };
}

static LIVE_WATCHERS: AtomicUsize = AtomicUsize::new(0);

/// True while an [`InterruptScope`] is active on the calling thread.
pub fn is_pinned() -> bool {
    PINNED.with(Cell::get)
}

/// Watcher threads that have been started and have not yet exited.
pub fn live_watchers() -> usize {
    LIVE_WATCHERS.load(Ordering::SeqCst)
}

/// Guards one cancellable syscall attempt.
///
/// While the scope is alive, a watcher thread waits for the token to become
/// done and, if it does, sends [`INTERRUPT_SIGNAL`] to the thread that opened
/// the scope so that a blocked syscall returns `EINTR`. Dropping the scope
/// stops and joins the watcher and unpins the thread, on every exit path.
///
/// The scope is `!Send`: the thread id it targets is only valid on the thread
/// that created it. Scopes do not nest.
///
/// The watcher can fire after the guarded call already returned. Whatever
/// the thread is doing at that point sees a stray `EINTR`, so callers must
/// re-check the token before treating an interruption as cancellation.
pub struct InterruptScope {
    tid: ThreadId,
    release: Sender<()>,
    watcher: Option<JoinHandle<()>>,
    _pinned: PhantomData<*const ()>,
}

impl InterruptScope {
    pub fn begin(token: &CancelToken) -> Result<Self> {
        handler::ensure_installed()?;

        if PINNED.with(|pinned| pinned.replace(true)) {
            return Err(Error::NestedScope);
        }

        let tid = platform::current_thread_id();
        // Capacity 1 so release never waits on a watcher that already left.
        let (release, released) = channel::bounded::<()>(1);
        let canceled = token.cancel_channel().clone();
        let deadline = token.deadline_channel();

        LIVE_WATCHERS.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("cancelio-watch".into())
            .spawn(move || {
                let fire = select! {
                    recv(canceled) -> _ => true,
                    recv(deadline) -> _ => true,
                    recv(released) -> _ => false,
                };
                if fire {
                    let _ = platform::send_signal(tid, INTERRUPT_SIGNAL);
                }
                LIVE_WATCHERS.fetch_sub(1, Ordering::SeqCst);
            });

        let watcher = match spawned {
            Ok(watcher) => watcher,
            Err(err) => {
                LIVE_WATCHERS.fetch_sub(1, Ordering::SeqCst);
                PINNED.with(|pinned| pinned.set(false));
                return Err(Error::Watcher(err));
            }
        };

        tracing::trace!(?tid, "interrupt scope begin");
        Ok(InterruptScope {
            tid,
            release,
            watcher: Some(watcher),
            _pinned: PhantomData,
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.tid
    }

    /// Same as dropping the scope.
    pub fn release(self) {}
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        let _ = self.release.try_send(());
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
        PINNED.with(|pinned| pinned.set(false));
        tracing::trace!(tid = ?self.tid, "interrupt scope released");
    }
}
