//! Acid tests for cancellable I/O. Run with test names as arguments, or
//! without arguments to list them.

use std::collections::BTreeMap;
use std::env;
use std::process;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod cancel;
mod eintr;
mod scope_bench;
mod scope_churn;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = cancelio::init() {
        eprintln!("cancelio-acid: {}", err);
        process::exit(1);
    }

    let mut tests: BTreeMap<&'static str, fn() -> Result<()>> = BTreeMap::new();
    tests.insert("eintr", eintr::eintr);
    tests.insert("read_file", cancel::read_file);
    tests.insert("cancel_read", cancel::cancel_read);
    tests.insert("spurious", cancel::spurious);
    tests.insert("partial_write", cancel::partial_write);
    tests.insert("nonblock_read", cancel::nonblock_read);
    tests.insert("open_fifo", cancel::open_fifo);
    tests.insert("scope_churn", scope_churn::scope_churn);
    tests.insert("scope_bench", scope_bench::bench);

    let mut ran_test = false;
    for name in env::args().skip(1) {
        ran_test = true;

        match tests.get(name.as_str()) {
            Some(test) => {
                println!("# {} #", name);
                match test() {
                    Ok(()) => println!("{}: PASSED", name),
                    Err(err) => {
                        println!("{}: FAILED: {:?}", name, err);
                        process::exit(1);
                    }
                }
            }
            None => {
                eprintln!("{}: not found", name);
                process::exit(1);
            }
        }
    }

    if !ran_test {
        for name in tests.keys() {
            println!("{}", name);
        }
    }
}
