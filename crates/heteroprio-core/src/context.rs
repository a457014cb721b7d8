//! Scheduling contexts: a named, disjoint partition of workers, each with
//! its own attached [`Heteroprio`] instance (SPEC_FULL §2/§4.5).
//!
//! Grounded on the `sched_ctx_hypervisor_wrapper` in
//! `examples/original_source/sched_ctx_hypervisor/src/sched_ctx_hypervisor.c`,
//! which keeps exactly this association (context id -> attached workers ->
//! policy-specific scheduler data) for the hypervisor to read and mutate.

use std::sync::Arc;

use crate::arch::ArchMask;
use crate::scheduler::Heteroprio;
use crate::worker::WorkerId;

pub type ContextId = u32;

/// One scheduling context: the set of workers it currently owns, plus the
/// heteroprio instance those workers pop from.
pub struct SchedulingContext {
    pub id: ContextId,
    pub scheduler: Arc<Heteroprio>,
    workers: Vec<WorkerId>,
}

impl SchedulingContext {
    pub fn new(id: ContextId, scheduler: Arc<Heteroprio>) -> Self {
        Self { id, scheduler, workers: Vec::new() }
    }

    pub fn workers(&self) -> &[WorkerId] {
        &self.workers
    }

    /// Attach a worker to this context, registering it with the
    /// context's scheduler under `arch_type`.
    pub fn attach_worker(&mut self, worker_id: WorkerId, arch_type: ArchMask) {
        self.scheduler.add_worker(worker_id, arch_type);
        self.workers.push(worker_id);
    }

    /// Detach a worker, unregistering it from the scheduler. No-op if the
    /// worker was not attached to this context.
    pub fn detach_worker(&mut self, worker_id: WorkerId) {
        if let Some(pos) = self.workers.iter().position(|&w| w == worker_id) {
            self.workers.swap_remove(pos);
            self.scheduler.remove_worker(worker_id);
        }
    }

    pub fn nworkers(&self) -> usize {
        self.workers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::index_to_arch_bit;
    use crate::scheduler::DEFAULT_MAX_PRIO;

    #[test]
    fn attach_detach_roundtrip() {
        let sched = Arc::new(Heteroprio::new(DEFAULT_MAX_PRIO, 2, 4));
        let mut ctx = SchedulingContext::new(0, sched);
        ctx.attach_worker(0, index_to_arch_bit(0));
        ctx.attach_worker(1, index_to_arch_bit(0));
        assert_eq!(ctx.nworkers(), 2);
        ctx.detach_worker(0);
        assert_eq!(ctx.nworkers(), 1);
        assert_eq!(ctx.workers(), &[1]);
    }
}
