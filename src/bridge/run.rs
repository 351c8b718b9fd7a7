//! Fixed-rate driver for applications without their own loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::MissionControl;

/// Tick `bridge` at `tick_rate_hz` until `shutdown_flag` is set.
///
/// Ticks are scheduled against a fixed timeline; if a tick overruns, the
/// timeline restarts from now instead of bursting to catch up. Returns the
/// number of ticks run.
pub fn run_loop(bridge: &mut MissionControl, tick_rate_hz: u32, shutdown_flag: &AtomicBool) -> u64 {
    let period = Duration::from_secs_f64(1.0 / f64::from(tick_rate_hz.max(1)));
    log::info!(
        "[Bridge] Session loop starting at {} Hz on {}",
        tick_rate_hz.max(1),
        bridge.local_endpoint()
    );

    let mut ticks = 0_u64;
    let mut next = Instant::now();

    while !shutdown_flag.load(Ordering::SeqCst) {
        bridge.tick();
        ticks += 1;

        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            log::debug!("[Bridge] Tick {} overran by {:?}", ticks, now - next);
            next = now;
        }
    }

    log::info!("[Bridge] Session loop exiting after {} ticks", ticks);
    ticks
}
