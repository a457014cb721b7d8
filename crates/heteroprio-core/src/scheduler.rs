//! The heteroprio scheduler: owns all buckets and worker wrappers for one
//! scheduling context, and mediates push, pop, prefetch, and steal.
//!
//! Grounded on `push_task_heteroprio_policy` / `pop_task_heteroprio_policy`
//! in `examples/original_source/src/sched_policies/heteroprio.c`; the
//! circular steal scan is additionally grounded on the bounded-attempt
//! circular steal in `search/parallel/work_queue.rs::get_job`.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::arch::{arch_to_index, index_to_arch_bit, ArchIndex, ArchMask, Bitmap, NB_ARCH_TYPES};
use crate::bucket::{Bucket, NO_FACTOR_BASE};
use crate::collaborators::{ArchOnlyExecutability, DataPrefetchHint, NoPrefetchHint, NodeId, TaskExecutability};
use crate::error::{ConfigError, HeteroprioError};
use crate::task::Task;
use crate::worker::{WorkerId, WorkerSlot, WorkerWrapper};

/// Default `MAX_PRIO` (SPEC_FULL §6): task priority upper bound.
pub const DEFAULT_MAX_PRIO: usize = 100;

/// Scheduler-wide state protected by the single `policy_mutex`.
struct Inner {
    buckets: Vec<Bucket>,
    nb_prio_per_arch: [usize; NB_ARCH_TYPES],
    prio_mapping: Vec<[usize; NB_ARCH_TYPES]>,
    nb_remaining_tasks_per_arch: [usize; NB_ARCH_TYPES],
    nb_prefetched_tasks_per_arch: [usize; NB_ARCH_TYPES],
    total_tasks_in_buckets: usize,
    nb_workers_per_arch: [usize; NB_ARCH_TYPES],
    workers: Vec<Option<WorkerWrapper>>,
    waiters: Bitmap,
    /// Worker ids that are "master" of a child scheduling context (SPEC_FULL
    /// §4.3 step 6): a task this worker would otherwise execute is instead
    /// routed to the named child's scheduler.
    child_schedulers: HashMap<WorkerId, Arc<Heteroprio>>,
}

impl Inner {
    fn attached_worker_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_some()).count()
    }
}

/// One scheduling context's heteroprio instance.
///
/// `max_prefetch` bounds every worker's local queue (`MAX_PREFETCH` in
/// SPEC_FULL, `>= 1`); `max_prio` bounds bucket ids (`MAX_PRIO`, default
/// [`DEFAULT_MAX_PRIO`]).
pub struct Heteroprio {
    inner: Mutex<Inner>,
    /// OS-thread park/wake slots, one per worker id, outside `policy_mutex`
    /// per SPEC_FULL §5's lock split (policy_mutex > worker-cond-mutex).
    slots: Vec<Arc<WorkerSlot>>,
    max_prio: usize,
    max_prefetch: usize,
    executability: Box<dyn TaskExecutability>,
    prefetch_hint: Box<dyn DataPrefetchHint>,
}

impl Heteroprio {
    pub fn new(max_prio: usize, max_prefetch: usize, capacity_workers: usize) -> Self {
        assert!(max_prefetch >= 1, "MAX_PREFETCH must be >= 1");
        assert!(
            capacity_workers <= Bitmap::CAPACITY,
            "this implementation caps contexts at {} workers (Bitmap capacity)",
            Bitmap::CAPACITY
        );
        let buckets = (0..max_prio).map(|_| Bucket::new()).collect();
        let workers = (0..capacity_workers).map(|_| None).collect::<Vec<_>>();
        let slots = (0..capacity_workers).map(|_| WorkerSlot::new()).collect();
        Self {
            inner: Mutex::new(Inner {
                buckets,
                nb_prio_per_arch: [0; NB_ARCH_TYPES],
                prio_mapping: vec![[0; NB_ARCH_TYPES]; max_prio],
                nb_remaining_tasks_per_arch: [0; NB_ARCH_TYPES],
                nb_prefetched_tasks_per_arch: [0; NB_ARCH_TYPES],
                total_tasks_in_buckets: 0,
                nb_workers_per_arch: [0; NB_ARCH_TYPES],
                workers,
                waiters: Bitmap::new(),
                child_schedulers: HashMap::new(),
            }),
            slots,
            max_prio,
            max_prefetch,
            executability: Box::new(ArchOnlyExecutability),
            prefetch_hint: Box::new(NoPrefetchHint),
        }
    }

    pub fn with_executability(mut self, check: impl TaskExecutability + 'static) -> Self {
        self.executability = Box::new(check);
        self
    }

    pub fn with_prefetch_hint(mut self, hint: impl DataPrefetchHint + 'static) -> Self {
        self.prefetch_hint = Box::new(hint);
        self
    }

    /// Declare `master_worker` the master of `child`: any task this worker
    /// would pop is instead routed to `child`'s scheduler (SPEC_FULL §4.3
    /// step 6). See `DESIGN.md` for the scope of this minimal form of
    /// nested scheduling contexts.
    pub fn set_child_scheduler(&self, master_worker: WorkerId, child: Arc<Heteroprio>) {
        self.inner.lock().child_schedulers.insert(master_worker, child);
    }

    pub fn clear_child_scheduler(&self, master_worker: WorkerId) {
        self.inner.lock().child_schedulers.remove(&master_worker);
    }

    /// The park/wake slot for a worker id, used by the runtime's idle loop.
    pub fn slot(&self, worker_id: WorkerId) -> Arc<WorkerSlot> {
        Arc::clone(&self.slots[worker_id])
    }

    // ---- §4.1 Bucket and mapping configuration ----

    pub fn set_nb_prios(&self, arch: ArchIndex, n: usize) -> Result<(), HeteroprioError> {
        if n > self.max_prio {
            return Err(ConfigError::TooManyPriorities { arch: arch as u32, requested: n as u32, max: self.max_prio as u32 }.into());
        }
        self.inner.lock().nb_prio_per_arch[arch] = n;
        Ok(())
    }

    pub fn set_mapping(&self, arch: ArchIndex, source_prio: usize, bucket_id: usize) -> Result<(), HeteroprioError> {
        if bucket_id >= self.max_prio {
            return Err(ConfigError::BucketOutOfRange { bucket_id, max: self.max_prio }.into());
        }
        let mut inner = self.inner.lock();
        inner.prio_mapping[source_prio][arch] = bucket_id;
        inner.buckets[bucket_id].valid_archs |= index_to_arch_bit(arch);
        Ok(())
    }

    pub fn set_faster_arch(&self, arch: ArchIndex, bucket_id: usize) -> Result<(), HeteroprioError> {
        if bucket_id >= self.max_prio {
            return Err(ConfigError::BucketOutOfRange { bucket_id, max: self.max_prio }.into());
        }
        let mut inner = self.inner.lock();
        inner.buckets[bucket_id].factor_base_arch = arch;
        inner.buckets[bucket_id].slow_factors[arch] = 0.0;
        Ok(())
    }

    pub fn set_arch_slow_factor(&self, arch: ArchIndex, bucket_id: usize, factor: f64) -> Result<(), HeteroprioError> {
        if bucket_id >= self.max_prio {
            return Err(ConfigError::BucketOutOfRange { bucket_id, max: self.max_prio }.into());
        }
        if factor < 0.0 {
            return Err(ConfigError::NegativeSlowFactor { arch: arch as u32, bucket_id, factor }.into());
        }
        self.inner.lock().buckets[bucket_id].slow_factors[arch] = factor;
        Ok(())
    }

    /// Install the default configuration (SPEC_FULL §4.1 / §10.5): every
    /// arch in `archs` gets `max_prio` priority levels with an identity
    /// `prio → bucket` mapping. Used when the caller configures nothing.
    pub fn with_default_mapping(self, archs: &[ArchIndex]) -> Self {
        for &arch in archs {
            self.set_nb_prios(arch, self.max_prio).expect("default nb_prios within MAX_PRIO");
            for prio in 0..self.max_prio {
                self.set_mapping(arch, prio, prio).expect("default mapping within MAX_PRIO");
            }
        }
        self
    }

    /// Init consistency check (SPEC_FULL §4.1 / §10.5): asserts, it does
    /// not return a recoverable error, because a failure here means the
    /// scheduler was misconfigured by its own host code before any task
    /// was ever accepted — a programming bug, not a runtime condition.
    pub fn check_consistency(&self) {
        let inner = self.inner.lock();
        let mut mapped_count_per_bucket = vec![0u32; self.max_prio];
        for arch in 0..NB_ARCH_TYPES {
            let nb_prio = inner.nb_prio_per_arch[arch];
            assert!(nb_prio <= self.max_prio, "nb_prio_per_arch[{arch}] exceeds MAX_PRIO");
            for idx_prio in 0..nb_prio {
                let bucket_id = inner.prio_mapping[idx_prio][arch];
                let bucket = &inner.buckets[bucket_id];
                assert!(
                    bucket.valid_archs & index_to_arch_bit(arch) != 0,
                    "arch {arch} maps prio {idx_prio} into bucket {bucket_id}, which does not list that arch"
                );
                assert!(bucket.slow_factors[arch] >= 0.0, "negative slow factor for arch {arch} bucket {bucket_id}");
                mapped_count_per_bucket[bucket_id] += 1;
            }
        }
        for (bucket_id, bucket) in inner.buckets.iter().enumerate() {
            let arch_bit_count = bucket.valid_archs.count_ones();
            assert_eq!(
                mapped_count_per_bucket[bucket_id], arch_bit_count,
                "bucket {bucket_id}: valid_archs has {arch_bit_count} archs set but {} archs map into it",
                mapped_count_per_bucket[bucket_id]
            );
        }
    }

    // ---- worker attach/detach ----

    pub fn add_worker(&self, worker_id: WorkerId, arch_type: ArchMask) {
        let arch_index = arch_to_index(arch_type);
        let mut inner = self.inner.lock();
        assert!(inner.workers[worker_id].is_none(), "worker {worker_id} already attached");
        inner.workers[worker_id] = Some(WorkerWrapper::new(arch_type, arch_index));
        inner.nb_workers_per_arch[arch_index] += 1;
    }

    pub fn remove_worker(&self, worker_id: WorkerId) {
        let mut inner = self.inner.lock();
        if let Some(w) = inner.workers[worker_id].take() {
            inner.nb_workers_per_arch[w.arch_index] -= 1;
        }
    }

    // ---- §4.2 Push ----

    pub fn push(&self, task: Task) -> Result<(), HeteroprioError> {
        if task.priority >= self.max_prio {
            return Err(ConfigError::PriorityOutOfRange { priority: task.priority, max: self.max_prio }.into());
        }
        let mut inner = self.inner.lock();
        let bucket_id = task.priority;
        let valid_archs = inner.buckets[bucket_id].valid_archs;
        if valid_archs == 0 {
            return Err(ConfigError::EmptyBucket { bucket_id }.into());
        }
        if (valid_archs & !task.where_) != 0 {
            return Err(ConfigError::ArchMismatch { bucket_id, valid_archs, task_where: task.where_ }.into());
        }
        let served = (0..NB_ARCH_TYPES).any(|arch| valid_archs & index_to_arch_bit(arch) != 0 && inner.nb_workers_per_arch[arch] > 0);
        if !served {
            return Err(HeteroprioError::NoEligibleWorker { required: valid_archs });
        }

        let task_id = task.id;

        // Wake-up protocol (SPEC_FULL §4.2): wake at most one eligible
        // waiter, chosen as the first match in worker-id order. Computed
        // before the task is moved into the bucket queue, since the
        // executability check needs to inspect it.
        let mut woken = None;
        for (wid, maybe_w) in inner.workers.iter().enumerate() {
            if let Some(w) = maybe_w {
                if inner.waiters.get(wid) && (valid_archs & w.arch_type != 0) && self.executability.worker_can_execute(w.arch_type, &task) {
                    woken = Some(wid);
                    break;
                }
            }
        }

        inner.buckets[bucket_id].queue.push_back(task);
        for arch in 0..NB_ARCH_TYPES {
            if valid_archs & index_to_arch_bit(arch) != 0 {
                inner.nb_remaining_tasks_per_arch[arch] += 1;
            }
        }
        inner.total_tasks_in_buckets += 1;
        trace!("push: task {task_id} -> bucket {bucket_id} (valid_archs={valid_archs:#x})");

        if let Some(wid) = woken {
            inner.waiters.unset(wid);
        }
        drop(inner);
        if let Some(wid) = woken {
            debug!("push: waking worker {wid}");
            self.slots[wid].wake();
        }
        Ok(())
    }

    // ---- §4.3 Pop and prefetch ----

    pub fn pop(&self, worker_id: WorkerId) -> Option<Task> {
        let mut inner = self.inner.lock();

        if inner.waiters.get(worker_id) {
            // A previous pop already observed emptiness for this worker and
            // no pusher has cleared it since.
            return None;
        }

        let (arch_type, arch_index) = {
            let w = inner.workers[worker_id].as_ref().expect("pop: unknown worker id");
            (w.arch_type, w.arch_index)
        };

        let local_empty = inner.workers[worker_id].as_ref().unwrap().local.is_empty();
        let prefetched = inner.nb_prefetched_tasks_per_arch[arch_index];
        if (inner.total_tasks_in_buckets == 0 || inner.nb_remaining_tasks_per_arch[arch_index] == 0)
            && local_empty
            && prefetched == 0
        {
            return None;
        }

        // Step 1/2: refill the local prefetch buffer from eligible buckets.
        let mut nb_added_tasks = 0usize;
        if inner.nb_remaining_tasks_per_arch[arch_index] != 0 {
            let local_len = inner.workers[worker_id].as_ref().unwrap().local.ntasks();
            let mut k = self.max_prefetch.saturating_sub(local_len);
            if k > inner.nb_remaining_tasks_per_arch[arch_index] {
                k = inner.nb_remaining_tasks_per_arch[arch_index];
            }
            let nworkers_ctx = inner.attached_worker_count();
            if inner.nb_remaining_tasks_per_arch[arch_index] < nworkers_ctx {
                k = if local_len == 0 { 1 } else { 0 };
            }

            let nb_prio = inner.nb_prio_per_arch[arch_index];
            let mut idx_prio = 0;
            while k > 0 && idx_prio < nb_prio {
                let bucket_id = inner.prio_mapping[idx_prio][arch_index];
                loop {
                    if k == 0 {
                        break;
                    }
                    let (valid_archs, factor_base_arch) = {
                        let b = &inner.buckets[bucket_id];
                        (b.valid_archs, b.factor_base_arch)
                    };
                    if inner.buckets[bucket_id].queue.is_empty() {
                        break;
                    }
                    let base_workers = if factor_base_arch == NO_FACTOR_BASE {
                        0
                    } else {
                        inner.nb_workers_per_arch[factor_base_arch]
                    };
                    if !inner.buckets[bucket_id].slow_factor_gate(arch_index, base_workers) {
                        break;
                    }

                    let task = inner.buckets[bucket_id].queue.pop_front().expect("checked non-empty above");
                    debug_assert!(
                        self.executability.worker_can_execute(arch_type, &task),
                        "prefetched a task this worker cannot execute"
                    );
                    self.prefetch_hint.prefetch(&task, worker_id as NodeId);
                    inner.workers[worker_id].as_mut().unwrap().local.push_back(task);

                    inner.total_tasks_in_buckets -= 1;
                    for arch in 0..NB_ARCH_TYPES {
                        if valid_archs & index_to_arch_bit(arch) != 0 {
                            inner.nb_remaining_tasks_per_arch[arch] -= 1;
                        }
                    }
                    inner.nb_prefetched_tasks_per_arch[arch_index] += 1;
                    k -= 1;
                    nb_added_tasks += 1;
                }
                idx_prio += 1;
            }
        }
        if nb_added_tasks > 0 {
            trace!("pop(worker={worker_id}): prefetched {nb_added_tasks} task(s) for arch {arch_index}");
        }

        // Step 3: serve from local queue.
        let mut obtained = {
            let w = inner.workers[worker_id].as_mut().unwrap();
            let task = w.local.pop_front();
            if task.is_some() {
                inner.nb_prefetched_tasks_per_arch[arch_index] -= 1;
            }
            task
        };

        // Step 4: steal from a peer's local queue (back of the queue).
        if obtained.is_none() && inner.nb_prefetched_tasks_per_arch[arch_index] > 0 {
            debug_assert!(self.max_prefetch != 1, "MAX_PREFETCH==1 must disable stealing");
            let n = inner.workers.len();
            for offset in 1..=n {
                let victim = (worker_id + offset) % n;
                if victim == worker_id {
                    continue;
                }
                let is_candidate = matches!(
                    &inner.workers[victim],
                    Some(v) if v.arch_index == arch_index && !v.local.is_empty()
                );
                if !is_candidate {
                    continue;
                }
                let stolen = inner.workers[victim].as_mut().unwrap().local.pop_back();
                if let Some(task) = stolen {
                    inner.nb_prefetched_tasks_per_arch[arch_index] -= 1;
                    debug!("pop(worker={worker_id}): stole task {} from worker {victim}", task.id);
                    obtained = Some(task);
                    break;
                }
                // TransientContention / empty after re-check: keep scanning.
            }
        }

        if obtained.is_none() {
            inner.waiters.set(worker_id);
            trace!("pop(worker={worker_id}): parking, nothing available");
            return None;
        }

        // Step 6: if this worker masters a child scheduling context, the
        // task is routed there instead of being handed back to the caller.
        if let Some(task) = obtained.take() {
            let child = inner.child_schedulers.get(&worker_id).cloned();
            match child {
                Some(child) => {
                    drop(inner);
                    debug!("pop(worker={worker_id}): routing task {} to child context (worker is its master)", task.id);
                    if let Err(e) = child.push(task) {
                        warn!("pop(worker={worker_id}): failed routing task to child context: {e}");
                    }
                    return None;
                }
                None => obtained = Some(task),
            }
        }

        obtained
    }

    // ---- introspection used by invariant tests and the hypervisor ----

    pub fn total_tasks_in_buckets(&self) -> usize {
        self.inner.lock().total_tasks_in_buckets
    }

    pub fn nb_remaining_tasks_per_arch(&self, arch: ArchIndex) -> usize {
        self.inner.lock().nb_remaining_tasks_per_arch[arch]
    }

    pub fn nb_prefetched_tasks_per_arch(&self, arch: ArchIndex) -> usize {
        self.inner.lock().nb_prefetched_tasks_per_arch[arch]
    }

    pub fn nb_workers_per_arch(&self, arch: ArchIndex) -> usize {
        self.inner.lock().nb_workers_per_arch[arch]
    }

    /// The architecture bit a given worker was attached under, used by the
    /// hypervisor when moving a worker across contexts.
    pub fn worker_arch_type(&self, worker_id: WorkerId) -> ArchMask {
        self.inner.lock().workers[worker_id]
            .as_ref()
            .map_or(0, |w| w.arch_type)
    }

    pub fn is_waiter(&self, worker_id: WorkerId) -> bool {
        self.inner.lock().waiters.get(worker_id)
    }

    pub fn local_len(&self, worker_id: WorkerId) -> usize {
        self.inner.lock().workers[worker_id].as_ref().map_or(0, |w| w.local.ntasks())
    }

    /// Sum of local-queue lengths across all attached workers, used by
    /// invariant 2 of SPEC_FULL §8.
    pub fn sum_local_lens(&self) -> usize {
        let inner = self.inner.lock();
        inner.workers.iter().flatten().map(|w| w.local.ntasks()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::index_to_arch_bit;

    const ARCH_CPU: ArchIndex = 0;
    const ARCH_GPU: ArchIndex = 1;

    fn single_arch_scheduler(max_prefetch: usize, nworkers: usize) -> Heteroprio {
        let sched = Heteroprio::new(DEFAULT_MAX_PRIO, max_prefetch, nworkers);
        sched.set_nb_prios(ARCH_CPU, 1).unwrap();
        sched.set_mapping(ARCH_CPU, 0, 0).unwrap();
        for w in 0..nworkers {
            sched.add_worker(w, index_to_arch_bit(ARCH_CPU));
        }
        sched
    }

    #[test]
    fn scenario_1_single_arch_drain() {
        let sched = single_arch_scheduler(2, 2);
        for i in 0..6 {
            sched.push(Task::new(i, 0, index_to_arch_bit(ARCH_CPU))).unwrap();
        }
        let mut got = Vec::new();
        let mut executed_by = [0usize; 2];
        loop {
            let mut progressed = false;
            for w in 0..2 {
                if let Some(t) = sched.pop(w) {
                    got.push(t.id);
                    executed_by[w] += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3, 4, 5]);
        assert!(executed_by[0] >= 1 && executed_by[1] >= 1);
        assert_eq!(sched.total_tasks_in_buckets(), 0);
    }

    #[test]
    fn scenario_2_affinity_veto() {
        let sched = Heteroprio::new(DEFAULT_MAX_PRIO, 4, 2);
        sched.set_nb_prios(ARCH_CPU, 1).unwrap();
        sched.set_nb_prios(ARCH_GPU, 1).unwrap();
        sched.set_mapping(ARCH_CPU, 0, 0).unwrap();
        sched.set_mapping(ARCH_GPU, 0, 0).unwrap();
        sched.set_faster_arch(ARCH_CPU, 0).unwrap();
        sched.set_arch_slow_factor(ARCH_GPU, 0, 2.0).unwrap();
        sched.add_worker(0, index_to_arch_bit(ARCH_CPU));
        sched.add_worker(1, index_to_arch_bit(ARCH_GPU));

        let where_both = index_to_arch_bit(ARCH_CPU) | index_to_arch_bit(ARCH_GPU);
        for i in 0..3 {
            sched.push(Task::new(i, 0, where_both)).unwrap();
        }
        // gate: 3 / 1 >= 2.0 -> allowed
        assert!(sched.pop(1).is_some());

        sched.push(Task::new(3, 0, where_both)).unwrap();
        // after GPU's pop, bucket depth is back down; still expect the gate
        // to allow another pull while slow_factor stays at 2.0
        assert!(sched.pop(1).is_some());

        sched.set_arch_slow_factor(ARCH_GPU, 0, 5.0).unwrap();
        sched.push(Task::new(4, 0, where_both)).unwrap();
        // depth 1 / 1 workers = 1.0 < 5.0 -> denied
        assert!(sched.pop(1).is_none());
    }

    #[test]
    fn scenario_3_steal() {
        let sched = single_arch_scheduler(4, 2);
        for i in 0..4 {
            sched.push(Task::new(i, 0, index_to_arch_bit(ARCH_CPU))).unwrap();
        }
        let first = sched.pop(0);
        assert!(first.is_some());
        assert_eq!(sched.nb_prefetched_tasks_per_arch(ARCH_CPU), 3);

        let second = sched.pop(1);
        assert!(second.is_some());
        assert_eq!(sched.nb_prefetched_tasks_per_arch(ARCH_CPU), 2);
    }

    #[test]
    fn scenario_4_wakeup_exactness() {
        let sched = single_arch_scheduler(2, 3);
        // all three workers observe emptiness and park
        for w in 0..3 {
            assert!(sched.pop(w).is_none());
            assert!(sched.is_waiter(w));
        }
        sched.push(Task::new(0, 0, index_to_arch_bit(ARCH_CPU))).unwrap();
        let waiting: Vec<bool> = (0..3).map(|w| sched.is_waiter(w)).collect();
        assert_eq!(waiting.iter().filter(|&&w| w).count(), 2, "exactly one waiter cleared");
    }

    #[test]
    fn max_prefetch_one_disables_stealing() {
        let sched = single_arch_scheduler(1, 2);
        sched.push(Task::new(0, 0, index_to_arch_bit(ARCH_CPU))).unwrap();
        sched.push(Task::new(1, 0, index_to_arch_bit(ARCH_CPU))).unwrap();
        let t0 = sched.pop(0);
        assert!(t0.is_some());
        // worker 0's local is now empty (capacity 1, already consumed); it
        // cannot hold a stealable second task, so worker 1 pulls its own
        // fresh prefetch rather than stealing.
        let t1 = sched.pop(1);
        assert!(t1.is_some());
        assert_ne!(t0.unwrap().id, t1.unwrap().id);
    }

    #[test]
    fn priority_out_of_range_rejected() {
        let sched = single_arch_scheduler(2, 1);
        let err = sched.push(Task::new(0, DEFAULT_MAX_PRIO, index_to_arch_bit(ARCH_CPU)));
        assert!(err.is_err());
    }

    #[test]
    fn push_arch_mismatch_rejected() {
        let sched = single_arch_scheduler(2, 1);
        // bucket 0 only serves ARCH_CPU; submit a task that cannot run there
        let err = sched.push(Task::new(0, 0, index_to_arch_bit(ARCH_GPU)));
        assert!(matches!(err, Err(HeteroprioError::Config(ConfigError::ArchMismatch { .. }))));
    }

    #[test]
    fn push_rejects_bucket_no_attached_worker_can_serve() {
        let sched = Heteroprio::new(DEFAULT_MAX_PRIO, 2, 1);
        sched.set_nb_prios(ARCH_CPU, 1).unwrap();
        sched.set_mapping(ARCH_CPU, 0, 0).unwrap();
        // no worker ever attached under ARCH_CPU
        let err = sched.push(Task::new(0, 0, index_to_arch_bit(ARCH_CPU)));
        assert!(matches!(err, Err(HeteroprioError::NoEligibleWorker { .. })));
    }

    #[test]
    fn child_scheduler_routing() {
        let parent = Heteroprio::new(DEFAULT_MAX_PRIO, 2, 2);
        parent.set_nb_prios(ARCH_CPU, 1).unwrap();
        parent.set_mapping(ARCH_CPU, 0, 0).unwrap();
        parent.add_worker(0, index_to_arch_bit(ARCH_CPU));

        let child = Arc::new(single_arch_scheduler(2, 1));
        parent.set_child_scheduler(0, Arc::clone(&child));

        parent.push(Task::new(7, 0, index_to_arch_bit(ARCH_CPU))).unwrap();
        assert!(parent.pop(0).is_none(), "worker 0 is the child's master, task is routed away");
        assert_eq!(parent.total_tasks_in_buckets(), 0);
        assert_eq!(child.total_tasks_in_buckets(), 1);
        assert_eq!(child.pop(0).unwrap().id, 7);

        parent.clear_child_scheduler(0);
        parent.push(Task::new(8, 0, index_to_arch_bit(ARCH_CPU))).unwrap();
        assert_eq!(parent.pop(0).unwrap().id, 8, "routing stops once the child is cleared");
    }

    #[test]
    fn check_consistency_passes_on_default_mapping() {
        let sched = Heteroprio::new(4, 2, 1).with_default_mapping(&[ARCH_CPU]);
        sched.check_consistency();
    }

    #[test]
    fn empty_worker_collection_pop_returns_none_without_waiting() {
        let sched = Heteroprio::new(DEFAULT_MAX_PRIO, 2, 0);
        // no workers attached at all: nothing to pop from, and there is no
        // worker id to even record a waiter against.
        assert_eq!(sched.total_tasks_in_buckets(), 0);
    }

    #[test]
    fn invariant_counters_consistent_after_mixed_ops() {
        let sched = single_arch_scheduler(3, 2);
        for i in 0..5 {
            sched.push(Task::new(i, 0, index_to_arch_bit(ARCH_CPU))).unwrap();
        }
        sched.pop(0);
        assert_eq!(sched.sum_local_lens(), sched.nb_prefetched_tasks_per_arch(ARCH_CPU));
        assert_eq!(
            sched.total_tasks_in_buckets() + sched.sum_local_lens(),
            5 - /* already returned by pop */ 1
        );
    }
}
