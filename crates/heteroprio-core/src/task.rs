//! The task type flowing through buckets and worker local queues.
//!
//! Argument packing, device kernels and the submission front-end are
//! explicitly out of scope (SPEC_FULL §1) — a [`Task`] here is the minimal
//! envelope the scheduler core needs: where it may run, how urgently, and a
//! tag the hypervisor can key deferred post-execution work off of.

use crate::arch::ArchMask;

/// A unique task identifier, assigned by the submitter.
pub type TaskId = u64;

/// An opaque tag used by [`crate::hypervisor::Hypervisor::post_exec_hook`] to
/// resolve deferred configuration/resize requests (SPEC_FULL §4.4, scenario
/// 6). `None` means the task carries no deferred work.
pub type TaskTag = Option<u64>;

/// A schedulable unit of work.
///
/// Payload execution itself (the actual compute kernel) is an external
/// collaborator — this type only carries what the scheduler needs to place
/// and account for the task.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    /// Priority in `0..MAX_PRIO`; lower buckets are not semantically
    /// "higher priority" on their own — priority only selects which bucket
    /// a task lands in, per the per-arch `prio_mapping`.
    pub priority: usize,
    /// Architectures this task is capable of executing on.
    pub where_: ArchMask,
    /// Opaque deferred-work tag, see [`TaskTag`].
    pub tag: TaskTag,
    /// Estimated cost in FLOPs, fed to the hypervisor's `poped_task`
    /// callback once a worker actually executes the task. `None` when the
    /// caller has no performance model (the hypervisor then treats the
    /// sample as zero-cost for accounting purposes).
    pub estimated_flops: Option<f64>,
}

impl Task {
    pub fn new(id: TaskId, priority: usize, where_: ArchMask) -> Self {
        Self { id, priority, where_, tag: None, estimated_flops: None }
    }

    pub fn with_tag(mut self, tag: u64) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_flops(mut self, flops: f64) -> Self {
        self.estimated_flops = Some(flops);
        self
    }
}
