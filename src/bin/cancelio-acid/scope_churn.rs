use std::thread;
use std::time::Duration;

use anyhow::{bail, ensure, Result};
use cancelio::scope::{is_pinned, live_watchers};
use cancelio::{CancelToken, InterruptScope};

/// Many threads opening and releasing scopes back to back, some with canceled
/// tokens so their watchers signal the owner. Nothing may stay pinned or running.
pub fn scope_churn() -> Result<()> {
    let canceled = CancelToken::new();
    canceled.cancel();

    let mut threads = Vec::new();
    for i in 0..10 {
        let canceled = canceled.clone();
        threads.push(thread::spawn(move || -> Result<()> {
            let pending = CancelToken::new();
            for j in 0..100 {
                let token = if (i + j) % 3 == 0 { &canceled } else { &pending };
                let scope = InterruptScope::begin(token)?;
                if j % 10 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
                drop(scope);
                ensure!(!is_pinned(), "thread {} still pinned after scope {}", i, j);
            }
            Ok(())
        }));
    }

    for thread in threads {
        match thread.join() {
            Ok(res) => res?,
            Err(_) => bail!("churn thread panicked"),
        }
    }

    ensure!(
        live_watchers() == 0,
        "{} watchers outlived their scopes",
        live_watchers()
    );
    println!("no watchers left");
    Ok(())
}
