//! Service Lifecycle: init/start/shutdown for the long-running daemon.
//!
//! `run` performs one immediate cycle, then ticks on `interval` until a
//! shutdown flag is raised — flipping that flag from a `ctrlc` handler is
//! the CLI's job, so this crate carries no signal-handling code of its own.
//! Each cycle runs under a watcher thread that, if shutdown is requested
//! while the cycle is still in flight, gives it [`DRAIN_GRACE`] to finish
//! before raising the engine's cancellation token — at which point its
//! in-flight subprocesses are terminated and any task still running
//! surfaces as a [`sync_types::SyncError::Cancelled`] failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sync_types::CycleSummary;

use crate::engine::Engine;
use crate::reporter::Reporter;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DRAIN_GRACE: Duration = Duration::from_secs(30);

/// Run the reconciliation loop until `shutdown` is set. Never returns an
/// error: a single cycle's failure is reported and reconciliation
/// continues at the next tick.
pub fn run(mut engine: Engine, interval: Duration, shutdown: Arc<AtomicBool>, reporter: &mut dyn Reporter) {
    reporter.info("starting GitOps sync daemon");
    run_cycle_with_drain(&mut engine, &shutdown, reporter);

    let mut next_due = Instant::now() + interval;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            reporter.info("shutdown complete");
            return;
        }

        if Instant::now() >= next_due {
            run_cycle_with_drain(&mut engine, &shutdown, reporter);
            next_due = Instant::now() + interval;
        }

        thread::sleep(POLL_INTERVAL.min(interval));
    }
}

/// Run one tick, with a watcher thread that cancels it if shutdown is
/// requested and the cycle is still running past [`DRAIN_GRACE`].
fn run_cycle_with_drain(
    engine: &mut Engine,
    shutdown: &Arc<AtomicBool>,
    reporter: &mut dyn Reporter,
) -> Option<CycleSummary> {
    let cancel = engine.cancel_handle();
    let shutdown = Arc::clone(shutdown);
    let cycle_done = Arc::new(AtomicBool::new(false));
    let cycle_done_watch = Arc::clone(&cycle_done);

    let watcher = thread::spawn(move || {
        loop {
            if cycle_done_watch.load(Ordering::SeqCst) {
                return;
            }
            if shutdown.load(Ordering::SeqCst) {
                let deadline = Instant::now() + DRAIN_GRACE;
                while Instant::now() < deadline {
                    if cycle_done_watch.load(Ordering::SeqCst) {
                        return;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                cancel.store(true, Ordering::SeqCst);
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
    });

    let result = engine.tick(reporter);
    cycle_done.store(true, Ordering::SeqCst);
    let _ = watcher.join();
    result
}
