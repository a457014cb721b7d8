//! The demo's worker pool: one OS thread per worker id, each running a
//! pop-execute-park loop.
//!
//! Grounded on `search/thread.rs`'s `Thread`/`idle_loop` shape (a spawned
//! thread draining a shared queue, parking when it finds nothing) and
//! `search/parallel/worker.rs`'s `catch_unwind`-wrapped task execution.

use std::panic;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use heteroprio_core::Heteroprio;

use crate::ArchKind;

/// Run `worker_ids` against `sched` until `total_tasks` have been executed
/// or `shutdown` is set. Returns the number of tasks actually executed.
pub fn run_pool(
    sched: Arc<Heteroprio>,
    worker_ids: Vec<(usize, ArchKind)>,
    shutdown: Arc<AtomicBool>,
    total_tasks: u64,
) -> usize {
    let executed = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = worker_ids
        .into_iter()
        .map(|(worker_id, arch)| {
            let sched = Arc::clone(&sched);
            let executed = Arc::clone(&executed);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name(format!("heteroprio-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, arch, sched, executed, shutdown, total_tasks))
                .expect("failed to spawn worker thread")
        })
        .collect();

    for h in handles {
        let _ = h.join();
    }
    executed.load(Ordering::Acquire) as usize
}

fn worker_loop(
    worker_id: usize,
    arch: ArchKind,
    sched: Arc<Heteroprio>,
    executed: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    total_tasks: u64,
) {
    let mut idle_rounds = 0u32;
    loop {
        if shutdown.load(Ordering::Relaxed) || executed.load(Ordering::Acquire) >= total_tasks {
            return;
        }
        match sched.pop(worker_id) {
            Some(task) => {
                idle_rounds = 0;
                let result = panic::catch_unwind(|| execute(&task, arch));
                if result.is_err() {
                    log::error!("worker {worker_id}: task {} panicked during execution", task.id);
                }
                executed.fetch_add(1, Ordering::AcqRel);
            }
            None => {
                idle_rounds += 1;
                let backoff = Duration::from_micros(50u64.saturating_mul(1 << idle_rounds.min(6)));
                thread::sleep(backoff);
            }
        }
    }
}

/// A stand-in compute kernel: the core's domain boundary ends at the task
/// envelope (SPEC_FULL §1), so the demo just simulates work proportional to
/// the task's declared cost.
fn execute(task: &heteroprio_core::Task, arch: ArchKind) {
    if log::log_enabled!(log::Level::Trace) {
        log::trace!("worker executing task {} on {arch:?}", task.id);
    }
    if let Some(flops) = task.estimated_flops {
        thread::sleep(Duration::from_nanos((flops as u64).min(5_000)));
    }
}
