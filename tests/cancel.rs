use std::io::{Read, SeekFrom, Write};
use std::thread;
use std::time::{Duration, Instant};

use cancelio::platform::{self, send_signal};
use cancelio::{CancelReason, CancelToken, InterruptScope, INTERRUPT_SIGNAL};
use crossbeam::channel;
use nix::errno::Errno;

mod common;

use common::{hits, observe, PROMPT, SETTLE};

#[test]
fn read_with_pending_token_returns_file_contents() {
    let _observed = observe();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello");
    let want = b"hello world".repeat(200);
    std::fs::write(&path, &want).unwrap();

    let token = CancelToken::new();
    let file = cancelio::open(&token, &path).unwrap();
    let mut got = Vec::new();
    file.io(&token).read_to_end(&mut got).unwrap();
    assert_eq!(got, want);

    for chunk in [1, 3, 7, 4096, want.len(), 1 << 16] {
        let file = cancelio::open(&token, &path).unwrap();
        let io = file.io(&token);
        let mut got = Vec::new();
        let mut buf = vec![0; chunk];
        loop {
            let n = io.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, want, "chunk size {}", chunk);
        file.close(&token).unwrap();
    }
}

#[test]
fn cancel_unblocks_blocked_read() {
    let _observed = observe();
    let before = hits();
    let token = CancelToken::new();
    let (r, w) = cancelio::pipe(&token).unwrap();

    let (tx, rx) = channel::bounded(1);
    let reader_token = token.clone();
    let reader = thread::spawn(move || {
        let res = r.io(&reader_token).read(&mut [0; 256]);
        tx.send(res).unwrap();
    });

    thread::sleep(SETTLE);
    token.cancel();
    let res = rx.recv_timeout(PROMPT).expect("read did not return after cancel");
    let err = res.unwrap_err();
    assert!(cancelio::is_canceled(&err), "got {:?}", err);
    assert!(err.to_string().starts_with("read |0"), "got {}", err);
    assert!(hits() > before, "interrupt handler never ran");

    reader.join().unwrap();
    drop(w);
}

#[test]
fn deadline_unblocks_blocked_read() {
    let _observed = observe();
    let token = CancelToken::with_timeout(Duration::from_millis(50));
    let (r, _w) = cancelio::pipe(&token).unwrap();

    let start = Instant::now();
    let err = r.io(&token).read(&mut [0; 16]).unwrap_err();
    assert!(cancelio::is_canceled(&err));
    assert_eq!(token.reason(), Some(CancelReason::DeadlineExceeded));
    assert!(start.elapsed() < PROMPT);
}

#[test]
fn stray_signal_does_not_cancel_read() {
    let _observed = observe();
    let before = hits();
    let token = CancelToken::new();
    let (r, w) = cancelio::pipe(&token).unwrap();

    let (tid_tx, tid_rx) = channel::bounded(1);
    let (done_tx, done_rx) = channel::bounded(1);
    let reader_token = token.clone();
    let reader = thread::spawn(move || {
        tid_tx.send(platform::current_thread_id()).unwrap();
        let mut buf = [0; 16];
        let res = r.io(&reader_token).read(&mut buf).map(|n| buf[..n].to_vec());
        done_tx.send(res).unwrap();
    });

    let tid = tid_rx.recv().unwrap();
    thread::sleep(SETTLE);
    for _ in 0..5 {
        send_signal(tid, INTERRUPT_SIGNAL).unwrap();
        thread::sleep(Duration::from_millis(10));
    }
    assert!(
        done_rx.recv_timeout(SETTLE).is_err(),
        "read returned on a stray signal"
    );
    assert!(hits() > before, "stray signals never reached the handler");

    w.io(&token).write_all(b"data").unwrap();
    let got = done_rx.recv_timeout(PROMPT).unwrap().unwrap();
    assert_eq!(got, b"data");
    reader.join().unwrap();
}

#[test]
fn scope_interrupts_raw_read() {
    let _observed = observe();
    let before = hits();
    let token = CancelToken::new();
    let (r, _w) = cancelio::pipe(&token).unwrap();

    let (tx, rx) = channel::bounded(1);
    let reader_token = token.clone();
    let reader = thread::spawn(move || {
        let scope = InterruptScope::begin(&reader_token).unwrap();
        let mut buf = [0u8; 256];
        let res = Errno::result(unsafe {
            libc::read(
                std::os::fd::AsRawFd::as_raw_fd(&r),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        });
        drop(scope);
        tx.send(res).unwrap();
    });

    thread::sleep(SETTLE);
    token.cancel();
    let res = rx.recv_timeout(PROMPT).expect("raw read was not interrupted");
    assert_eq!(res, Err(Errno::EINTR));
    assert!(hits() > before);
    reader.join().unwrap();
}

#[test]
fn partial_write_reports_accepted_bytes() {
    let _observed = observe();
    const LEN: usize = 1 << 20;
    let token = CancelToken::new();
    let (r, w) = cancelio::pipe(&token).unwrap();
    w.set_nonblocking();

    let (tx, rx) = channel::bounded(1);
    let writer_token = token.clone();
    let writer = thread::spawn(move || {
        let buf = vec![7u8; LEN];
        let res = w.io(&writer_token).write_full(&buf);
        tx.send(res).unwrap();
        w
    });

    thread::sleep(SETTLE);
    token.cancel();
    let partial = rx
        .recv_timeout(PROMPT)
        .expect("write did not return after cancel")
        .unwrap_err();
    assert!(partial.is_canceled(), "got {:?}", partial.error);
    assert!(partial.written > 0 && partial.written < LEN);
    let w = writer.join().unwrap();

    // Exactly the reported bytes are in the pipe.
    let fresh = CancelToken::new();
    let mut drained = vec![0; partial.written];
    r.io(&fresh).read_exact(&mut drained).unwrap();
    assert!(drained.iter().all(|&b| b == 7));
    w.close(&fresh).unwrap();
    assert_eq!(r.io(&fresh).read(&mut [0; 16]).unwrap(), 0);
}

// darwin restarts a pipe write that already moved bytes, so this only holds on linux.
#[cfg(target_os = "linux")]
#[test]
fn cancel_unblocks_blocked_write() {
    let _observed = observe();
    let token = CancelToken::new();
    let (r, w) = cancelio::pipe(&token).unwrap();

    let (tx, rx) = channel::bounded(1);
    let writer_token = token.clone();
    let writer = thread::spawn(move || {
        let res = w.io(&writer_token).write_full(&vec![1u8; 1 << 17]);
        tx.send(res).unwrap();
    });

    let n = r.io(&token).read(&mut [0; 1024]).unwrap();
    assert!(n > 0);
    thread::sleep(SETTLE);
    token.cancel();
    let partial = rx.recv_timeout(PROMPT).unwrap().unwrap_err();
    assert!(partial.is_canceled());
    assert!(partial.written < 1 << 17);
    writer.join().unwrap();
}

#[test]
fn nonblocking_read_stops_on_cancel() {
    let _observed = observe();
    let token = CancelToken::new();
    let (r, _w) = cancelio::pipe(&token).unwrap();
    r.set_nonblocking();

    let (tx, rx) = channel::bounded(1);
    let reader_token = token.clone();
    let reader = thread::spawn(move || {
        let res = r.io(&reader_token).read(&mut [0; 64]);
        tx.send(res).unwrap();
    });

    thread::sleep(SETTLE);
    assert!(rx.try_recv().is_err(), "read returned without data");
    token.cancel();
    let err = rx.recv_timeout(PROMPT).unwrap().unwrap_err();
    assert!(cancelio::is_canceled(&err));
    reader.join().unwrap();
}

#[test]
fn file_operations_round_trip() {
    let _observed = observe();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data");
    let token = CancelToken::new();

    let file = cancelio::create(&token, &path).unwrap();
    let mut io = file.io(&token);
    assert_eq!(io.write_full(b"0123456789").unwrap(), 10);
    assert_eq!(io.seek(SeekFrom::Start(2)).unwrap(), 2);
    let mut buf = [0; 3];
    io.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"234");
    assert_eq!(io.seek(SeekFrom::Current(0)).unwrap(), 5);

    assert_eq!(io.write_at(b"ab", 8).unwrap(), 2);
    let mut buf = [0; 4];
    assert_eq!(io.read_at(&mut buf, 6).unwrap(), 4);
    assert_eq!(&buf, b"67ab");
    assert_eq!(io.read_at(&mut buf, 100).unwrap(), 0);
    // Positional calls leave the offset alone.
    assert_eq!(io.seek(SeekFrom::Current(0)).unwrap(), 5);
    assert_eq!(io.seek(SeekFrom::End(-1)).unwrap(), 9);
    io.flush().unwrap();

    // A second binding shares the descriptor and its offset.
    let other = CancelToken::new();
    let mut rest = Vec::new();
    file.io(&other).read_to_end(&mut rest).unwrap();
    assert_eq!(rest, b"b");

    file.close(&token).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"01234567ab");
}

#[test]
fn done_token_fails_before_touching_descriptor() {
    let _observed = observe();
    let token = CancelToken::new();
    let (r, w) = cancelio::pipe(&token).unwrap();
    w.io(&token).write_all(b"queued").unwrap();

    let canceled = CancelToken::new();
    canceled.cancel();
    let err = r.io(&canceled).read(&mut [0; 16]).unwrap_err();
    assert!(cancelio::is_canceled(&err));
    let partial = w.io(&canceled).write_full(b"more").unwrap_err();
    assert_eq!(partial.written, 0);
    assert!(partial.is_canceled());

    // The data is still there for a pending token.
    let mut buf = [0; 6];
    r.io(&token).read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"queued");
}
