use std::ffi::CString;
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Context, Result};
use cancelio::platform::{current_thread_id, send_signal};
use cancelio::{CancelToken, INTERRUPT_SIGNAL};
use crossbeam::channel;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

const SETTLE: Duration = Duration::from_millis(50);
const PROMPT: Duration = Duration::from_secs(5);

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("cancelio-acid-{}-{}", std::process::id(), name))
}

pub fn read_file() -> Result<()> {
    let path = scratch_path("read_file");
    let data = b"hello world\n".repeat(4096);
    std::fs::write(&path, &data)?;

    let token = CancelToken::new();
    for size in [1, 100, 4096, data.len() + 1] {
        let file = cancelio::open(&token, &path)?;
        let io = file.io(&token);
        let mut buf = vec![0; size];
        let mut got = Vec::new();
        loop {
            match io.read(&mut buf)? {
                0 => break,
                n => got.extend_from_slice(&buf[..n]),
            }
        }
        ensure!(got == data, "buffer size {}: read {} bytes", size, got.len());
        file.close(&token)?;
    }

    std::fs::remove_file(&path)?;
    Ok(())
}

pub fn cancel_read() -> Result<()> {
    let token = CancelToken::new();
    let (r, _w) = cancelio::pipe(&token)?;

    let (tx, rx) = channel::bounded(1);
    let reader_token = token.clone();
    thread::spawn(move || {
        let _ = tx.send(r.io(&reader_token).read(&mut [0; 256]));
    });

    thread::sleep(SETTLE);
    let canceled_at = Instant::now();
    token.cancel();

    let res = rx.recv_timeout(PROMPT).context("read still blocked after cancel")?;
    match res {
        Err(err) if cancelio::is_canceled(&err) => {
            println!("returned {:?} after cancel: {}", canceled_at.elapsed(), err)
        }
        other => bail!("not canceled, got {:?}", other),
    }
    Ok(())
}

pub fn spurious() -> Result<()> {
    let token = CancelToken::new();
    let (r, w) = cancelio::pipe(&token)?;

    let (tid_tx, tid_rx) = channel::bounded(1);
    let (tx, rx) = channel::bounded(1);
    let reader_token = token.clone();
    thread::spawn(move || {
        let _ = tid_tx.send(current_thread_id());
        let mut buf = [0; 8];
        let res = r.io(&reader_token).read(&mut buf).map(|n| buf[..n].to_vec());
        let _ = tx.send(res);
    });

    let tid = tid_rx.recv()?;
    thread::sleep(SETTLE);
    for _ in 0..10 {
        send_signal(tid, INTERRUPT_SIGNAL)?;
        thread::sleep(Duration::from_millis(5));
    }
    ensure!(rx.recv_timeout(SETTLE).is_err(), "stray signal ended the read");

    w.io(&token).write_full(b"ok").map_err(|partial| partial.error)?;
    let got = rx.recv_timeout(PROMPT)??;
    ensure!(got == b"ok", "read {:?}", got);
    Ok(())
}

pub fn partial_write() -> Result<()> {
    const LEN: usize = 1 << 20;

    let token = CancelToken::new();
    let (r, w) = cancelio::pipe(&token)?;
    w.set_nonblocking();

    let (tx, rx) = channel::bounded(1);
    let writer_token = token.clone();
    thread::spawn(move || {
        let _ = tx.send(w.io(&writer_token).write_full(&vec![0x5a; LEN]));
    });

    thread::sleep(SETTLE);
    token.cancel();
    let partial = match rx.recv_timeout(PROMPT)? {
        Ok(n) => bail!("wrote all {} bytes into a pipe", n),
        Err(partial) => partial,
    };
    ensure!(partial.is_canceled(), "not canceled: {}", partial.error);
    ensure!(
        partial.written > 0 && partial.written < LEN,
        "written {}",
        partial.written
    );
    println!("accepted {} of {} bytes", partial.written, LEN);

    let fresh = CancelToken::new();
    let mut got = vec![0; partial.written];
    r.io(&fresh).read_exact(&mut got)?;
    ensure!(got.iter().all(|&b| b == 0x5a));
    Ok(())
}

pub fn nonblock_read() -> Result<()> {
    let token = CancelToken::new();
    let (r, _w) = cancelio::pipe(&token)?;
    r.set_nonblocking();

    let (tx, rx) = channel::bounded(1);
    let reader_token = token.clone();
    thread::spawn(move || {
        let _ = tx.send(r.io(&reader_token).read(&mut [0; 64]));
    });

    thread::sleep(SETTLE);
    ensure!(rx.is_empty(), "non-blocking read returned without data");
    token.cancel();
    match rx.recv_timeout(PROMPT)? {
        Err(err) if cancelio::is_canceled(&err) => Ok(()),
        other => bail!("not canceled, got {:?}", other),
    }
}

/// Opening a FIFO with no writer blocks in open(2); cancellation gets it out.
pub fn open_fifo() -> Result<()> {
    let path = scratch_path("fifo");
    let c_path = CString::new(path.as_os_str().as_bytes())?;
    if unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) } == -1 {
        return Err(std::io::Error::last_os_error()).context("mkfifo");
    }

    let token = CancelToken::with_timeout(Duration::from_millis(100));
    let start = Instant::now();
    let res = cancelio::open_with_flags(&token, &path, OFlag::O_RDONLY, Mode::empty());
    std::fs::remove_file(&path)?;

    match res {
        Err(err) if cancelio::is_canceled(&err) => {
            println!("open gave up after {:?}: {}", start.elapsed(), err);
            Ok(())
        }
        other => bail!("open not canceled, got {:?}", other),
    }
}
