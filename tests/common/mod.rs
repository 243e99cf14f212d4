#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cancelio::handler::{registry, HandlerOverride};
use parking_lot::{const_mutex, Mutex, MutexGuard};

/// Upper bound for anything that is expected to finish "promptly".
pub const PROMPT: Duration = Duration::from_secs(5);

/// How long to let a thread settle into a blocking call.
pub const SETTLE: Duration = Duration::from_millis(50);

static SERIAL: Mutex<()> = const_mutex(());
static HITS: AtomicUsize = AtomicUsize::new(0);

fn count_hit(_: libc::c_int) {
    HITS.fetch_add(1, Ordering::SeqCst);
}

pub fn hits() -> usize {
    HITS.load(Ordering::SeqCst)
}

/// Tests that count handler invocations run one at a time.
pub struct Observed {
    _handler: HandlerOverride,
    _serial: MutexGuard<'static, ()>,
}

pub fn observe() -> Observed {
    let serial = SERIAL.lock();
    cancelio::init().expect("install interrupt handler");
    Observed {
        _handler: registry().override_handler(count_hit),
        _serial: serial,
    }
}
