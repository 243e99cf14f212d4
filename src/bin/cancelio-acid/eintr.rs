use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{bail, ensure};
use cancelio::handler::registry;
use cancelio::{CancelToken, InterruptScope};
use nix::errno::Errno;

static CAUGHT: AtomicUsize = AtomicUsize::new(0);

fn h(_: libc::c_int) {
    CAUGHT.fetch_add(1, Ordering::SeqCst);
}

/// A raw read inside an interrupt scope comes back with EINTR once the token is canceled.
pub fn eintr() -> anyhow::Result<()> {
    let _handler = registry().override_handler(h);

    let mut fds = [0; 2];
    unsafe {
        assert_ne!(libc::pipe(fds.as_mut_ptr()), -1);
    }
    let [reader, writer] = fds;

    let token = CancelToken::new();
    let reader_token = token.clone();
    let handle = thread::spawn(move || {
        let _scope = InterruptScope::begin(&reader_token)?;
        let res = Errno::result(unsafe { libc::read(reader, [0u8; 1].as_mut_ptr().cast(), 1) });
        Ok::<_, anyhow::Error>(res)
    });

    thread::sleep(Duration::from_millis(50));
    token.cancel();

    let res = match handle.join() {
        Ok(res) => res?,
        Err(_) => bail!("reader panicked"),
    };
    ensure!(res == Err(Errno::EINTR), "not interrupted, got {:?}", res);
    ensure!(CAUGHT.load(Ordering::SeqCst) > 0, "signal handler never called");

    unsafe {
        libc::close(reader);
        libc::close(writer);
    }

    // The same, but through the adapter: EINTR turns into a cancellation error.
    let token = CancelToken::new();
    let (r, w) = cancelio::pipe(&token)?;
    println!("pipe fds: {} {}", r.as_raw_fd(), w.as_raw_fd());
    let reader_token = token.clone();
    let handle = thread::spawn(move || r.io(&reader_token).read(&mut [0; 256]));

    thread::sleep(Duration::from_millis(50));
    token.cancel();

    let res = match handle.join() {
        Ok(res) => res,
        Err(_) => bail!("reader panicked"),
    };
    match res {
        Err(err) if cancelio::is_canceled(&err) => println!("canceled: {}", err),
        other => bail!("not canceled, got {:?}", other),
    }
    Ok(())
}
