//! Per-worker state: the local prefetch queue living inside scheduler state,
//! and the condvar-based sleep/wake slot the runtime uses to park and
//! resume the worker's OS thread.
//!
//! The wake/sleep protocol is grounded on `search/thread.rs`'s
//! `ThreadInner`/`idle_loop` (a `Mutex<State>` + `Condvar`, with a `Drop`
//! impl that flips an exit flag and joins the thread) — the shape transfers
//! directly even though the payload here is "pull from the scheduler",
//! not "run a fixed search task".

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::arch::{ArchIndex, ArchMask};
use crate::fifo::TaskFifo;

pub type WorkerId = usize;

/// Scheduler-side per-worker bookkeeping, indexed by [`WorkerId`] in the
/// scheduler's worker arena. Its `local` queue is protected by the
/// scheduler's `policy_mutex`, not by [`WorkerSlot`] — the slot only
/// arbitrates OS-thread sleep/wake, per SPEC_FULL §5's two-lock split.
#[derive(Debug)]
pub struct WorkerWrapper {
    pub arch_type: ArchMask,
    pub arch_index: ArchIndex,
    pub local: TaskFifo,
}

impl WorkerWrapper {
    pub fn new(arch_type: ArchMask, arch_index: ArchIndex) -> Self {
        Self { arch_type, arch_index, local: TaskFifo::new() }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    /// Set by `pop` when it found nothing and parked this worker; cleared
    /// by `push`/steal-victim wakeup. Mirrors the `waiters` bitmap bit for
    /// this worker but lives behind the worker's own mutex so a runtime
    /// loop can `wait` on it directly without touching `policy_mutex`.
    parked: bool,
    /// Set once during shutdown; an idle loop observing this exits instead
    /// of waiting again.
    shutdown: bool,
}

/// The runtime-owned condvar + mutex pair used to block and resume a
/// worker's OS thread (SPEC_FULL §5, "One condition-variable + mutex pair
/// per worker").
#[derive(Debug, Default)]
pub struct WorkerSlot {
    state: Mutex<SlotState>,
    condvar: Condvar,
}

impl WorkerSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block the calling thread until woken by [`WorkerSlot::wake`] or
    /// [`WorkerSlot::shutdown`]. Returns `false` if woken for shutdown.
    pub fn park(&self) -> bool {
        let mut state = self.state.lock();
        state.parked = true;
        while state.parked && !state.shutdown {
            self.condvar.wait(&mut state);
        }
        !state.shutdown
    }

    /// Wake the parked worker, if any. Idempotent: waking a worker that is
    /// not parked is a no-op, matching the `waiters` bitmap semantics where
    /// clearing a bit that was never set has no effect.
    pub fn wake(&self) {
        let mut state = self.state.lock();
        if state.parked {
            state.parked = false;
            self.condvar.notify_one();
        }
    }

    pub fn is_parked(&self) -> bool {
        self.state.lock().parked
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.condvar.notify_all();
    }
}
