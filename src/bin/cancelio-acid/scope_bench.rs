use cancelio::{CancelToken, InterruptScope};

const ITERATIONS: u64 = 1 << 12;

#[cfg(target_arch = "x86_64")]
pub fn bench() -> anyhow::Result<()> {
    // TODO: Also time a full cancellable read on an O_NONBLOCK pipe that already has data.
    let token = CancelToken::new();
    unsafe {
        let before = x86::time::rdtscp();
        for _ in 0..ITERATIONS {
            InterruptScope::begin(&token)?.release();
        }
        let after = x86::time::rdtscp();

        let time = (after - before) as f64 / ITERATIONS as f64;

        println!("CYCLES_PER_SCOPE: {time}");
    }
    Ok(())
}

#[cfg(not(target_arch = "x86_64"))]
pub fn bench() -> anyhow::Result<()> {
    let token = CancelToken::new();
    let now = std::time::Instant::now();
    for _ in 0..ITERATIONS {
        InterruptScope::begin(&token)?.release();
    }
    println!("TIME_PER_SCOPE: {:?}", now.elapsed() / ITERATIONS as u32);
    Ok(())
}
