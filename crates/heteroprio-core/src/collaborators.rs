//! Traits for the external collaborators the core consumes (SPEC_FULL §6).
//!
//! Device memory transfer, performance-model calibration, and the task
//! submission front-end are out of scope (SPEC_FULL §1) — these traits are
//! the seams through which a host runtime plugs those concerns in, without
//! the scheduler core depending on any concrete device or timing backend.

use std::time::Duration;

use crate::arch::ArchMask;
use crate::task::Task;

/// `worker_can_execute_task(w, task, impl)` — whether a worker of a given
/// architecture can run a specific task's chosen implementation. The
/// default, arch-bit-only check is sufficient for most callers; a host
/// runtime with per-task implementation variants supplies its own.
pub trait TaskExecutability: Send + Sync {
    fn worker_can_execute(&self, worker_arch: ArchMask, task: &Task) -> bool;
}

/// The default executability check: an arch can run a task iff its bit is
/// set in the task's `where_` mask. No implementation-variant filtering.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchOnlyExecutability;

impl TaskExecutability for ArchOnlyExecutability {
    fn worker_can_execute(&self, worker_arch: ArchMask, task: &Task) -> bool {
        task.where_ & worker_arch != 0
    }
}

/// `prefetch_task_input_on_node(task, node)` — a best-effort hint that may
/// fail silently (SPEC_FULL §6). The default implementation is a no-op.
pub trait DataPrefetchHint: Send + Sync {
    fn prefetch(&self, task: &Task, node: NodeId);
}

/// A no-op prefetch hint, used when the host runtime has no device memory
/// model to plug in (the common case for CPU-only demonstrations).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrefetchHint;

impl DataPrefetchHint for NoPrefetchHint {
    fn prefetch(&self, _task: &Task, _node: NodeId) {}
}

/// `worker_get_memory_node(w) → NodeId`.
pub type NodeId = usize;

/// `timing_now() → microseconds`, injected so the hypervisor's elapsed-time
/// accounting is testable without depending on the real wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// A [`Clock`] backed by `std::time::Instant`, relative to its own creation.
pub struct SystemClock {
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}
