//! The process-wide hypervisor: observes task/worker events across
//! scheduling contexts and dynamically resizes them (SPEC_FULL §4.4-§4.9).
//!
//! Grounded on `sched_ctx_hypervisor.c` in `examples/original_source/`:
//! `hypervisor_init`/`shutdown`, the five observation callbacks, and the
//! `act_hypervisor_mutex` serializing cross-context membership changes.

pub mod policy;
pub mod resize;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::arch::ArchMask;
use crate::collaborators::{Clock, SystemClock};
use crate::context::{ContextId, SchedulingContext};
use crate::worker::WorkerId;

pub use policy::Policy;

/// Per-worker hypervisor configuration (SPEC_FULL §6 "Hypervisor config").
#[derive(Debug, Clone, Copy)]
pub struct WorkerHypervisorConfig {
    pub priority: i32,
    pub max_idle: Duration,
    pub fixed: bool,
}

impl Default for WorkerHypervisorConfig {
    fn default() -> Self {
        Self { priority: 0, max_idle: Duration::from_secs(1), fixed: false }
    }
}

/// Per-context resize configuration (SPEC_FULL §3 "Context Wrapper" /
/// §6 "Hypervisor config").
#[derive(Debug, Clone)]
pub struct HypervisorConfig {
    pub min_nworkers: usize,
    pub max_nworkers: usize,
    pub granularity: usize,
    pub new_workers_max_idle: Duration,
    pub min_tasks: u64,
    per_worker: HashMap<WorkerId, WorkerHypervisorConfig>,
}

impl HypervisorConfig {
    pub fn new(min_nworkers: usize, max_nworkers: usize, granularity: usize) -> Self {
        Self {
            min_nworkers,
            max_nworkers,
            granularity,
            new_workers_max_idle: Duration::from_secs(1),
            min_tasks: 0,
            per_worker: HashMap::new(),
        }
    }

    pub fn set_worker_config(&mut self, worker_id: WorkerId, config: WorkerHypervisorConfig) {
        self.per_worker.insert(worker_id, config);
    }

    fn worker_config(&self, worker_id: WorkerId) -> WorkerHypervisorConfig {
        self.per_worker.get(&worker_id).copied().unwrap_or_default()
    }
}

/// A resize awaiting acknowledgement (SPEC_FULL §4.5 "Acknowledgement").
#[derive(Debug, Clone)]
struct PendingAck {
    receiver: ContextId,
    moved_workers: Vec<WorkerId>,
}

/// Per-task-tag deferred work applied by [`Hypervisor::post_exec_hook`]
/// (SPEC_FULL §4.4, §10.5).
#[derive(Debug, Clone)]
pub enum DeferredAction {
    SetArchSlowFactor { arch: crate::arch::ArchIndex, bucket_id: usize, factor: f64 },
    SetMapping { arch: crate::arch::ArchIndex, source_prio: usize, bucket_id: usize },
    RequestResize { forced_receiver: Option<ContextId> },
}

/// Hypervisor-side accounting for one context (SPEC_FULL §3 "Context
/// Wrapper").
struct ContextWrapper {
    context: Arc<Mutex<SchedulingContext>>,
    config: HypervisorConfig,
    total_flops: f64,
    remaining_flops: f64,
    current_idle_time: HashMap<WorkerId, Duration>,
    elapsed_flops: HashMap<WorkerId, f64>,
    total_elapsed_flops: HashMap<WorkerId, f64>,
    start_time: Duration,
    resize_enabled: bool,
    pushed_count: u64,
    pending_ack: Option<PendingAck>,
}

impl ContextWrapper {
    fn new(context: Arc<Mutex<SchedulingContext>>, config: HypervisorConfig, total_flops: f64, now: Duration) -> Self {
        Self {
            context,
            config,
            total_flops,
            remaining_flops: total_flops,
            current_idle_time: HashMap::new(),
            elapsed_flops: HashMap::new(),
            total_elapsed_flops: HashMap::new(),
            start_time: now,
            resize_enabled: false,
            pushed_count: 0,
            pending_ack: None,
        }
    }

    fn priority_sum(&self) -> i64 {
        let ctx = self.context.lock();
        ctx.workers().iter().map(|&w| self.config.worker_config(w).priority as i64).sum()
    }

    fn throughput_rate(&self, now: Duration) -> f64 {
        let elapsed_flops: f64 = self.elapsed_flops.values().sum();
        let elapsed_secs = (now.saturating_sub(self.start_time)).as_secs_f64();
        if elapsed_secs <= 0.0 {
            0.0
        } else {
            elapsed_flops / elapsed_secs
        }
    }
}

struct HypervisorState {
    contexts: HashMap<ContextId, ContextWrapper>,
    deferred_by_tag: HashMap<u64, DeferredAction>,
}

/// Process-wide coordinator (SPEC_FULL §9 "Global state"). The
/// `act_hypervisor_mutex` of §5 is this type's single internal `Mutex`.
pub struct Hypervisor {
    inner: Mutex<HypervisorState>,
    policy: Policy,
    clock: Box<dyn Clock>,
}

impl Hypervisor {
    pub fn hypervisor_init(policy: Policy) -> Self {
        Self::with_clock(policy, Box::new(SystemClock::default()))
    }

    pub fn with_clock(policy: Policy, clock: Box<dyn Clock>) -> Self {
        Self { inner: Mutex::new(HypervisorState { contexts: HashMap::new(), deferred_by_tag: HashMap::new() }), policy, clock }
    }

    /// `handle_ctx(total_flops)` (SPEC_FULL §3 Lifecycle).
    pub fn handle_ctx(&self, id: ContextId, context: Arc<Mutex<SchedulingContext>>, config: HypervisorConfig, total_flops: f64) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.contexts.insert(id, ContextWrapper::new(context, config, total_flops, now));
        info!("hypervisor: registered context {id} (total_flops={total_flops})");
    }

    /// `ignore_ctx` (SPEC_FULL §3 Lifecycle / §4.8 "-> Closed").
    pub fn ignore_ctx(&self, id: ContextId) {
        self.inner.lock().contexts.remove(&id);
        debug!("hypervisor: context {id} closed");
    }

    /// Shutdown sequence from SPEC_FULL §10.5: stop-resize then `ignore_ctx`
    /// for every still-registered context.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        let ids: Vec<ContextId> = inner.contexts.keys().copied().collect();
        for id in &ids {
            if let Some(w) = inner.contexts.get_mut(id) {
                w.resize_enabled = false;
            }
        }
        inner.contexts.clear();
        info!("hypervisor: shutdown, closed {} context(s)", ids.len());
    }

    pub fn start_resize(&self, id: ContextId) {
        if let Some(w) = self.inner.lock().contexts.get_mut(&id) {
            w.resize_enabled = true;
        }
    }

    pub fn stop_resize(&self, id: ContextId) {
        if let Some(w) = self.inner.lock().contexts.get_mut(&id) {
            w.resize_enabled = false;
        }
    }

    // ---- §4.4 Observation callbacks ----

    pub fn pushed_task(&self, id: ContextId, _worker: WorkerId) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let Some(w) = inner.contexts.get_mut(&id) else { return };
        w.pushed_count += 1;
        if w.pushed_count == 1 {
            w.start_time = now;
        }
        if w.pushed_count >= w.config.min_tasks.max(1) {
            w.resize_enabled = true;
        }
    }

    pub fn poped_task(&self, id: ContextId, worker: WorkerId, flops: f64) {
        let now = self.clock.now();
        let should_resize = {
            let mut inner = self.inner.lock();
            let Some(w) = inner.contexts.get_mut(&id) else { return };
            *w.elapsed_flops.entry(worker).or_insert(0.0) += flops;
            *w.total_elapsed_flops.entry(worker).or_insert(0.0) += flops;
            w.remaining_flops = (w.remaining_flops - flops).max(0.0);
            let active_contexts = inner.contexts.len();
            let sender_rate = inner.contexts.get(&id).unwrap().throughput_rate(now);
            let receiver_rate = inner
                .contexts
                .iter()
                .filter(|(other, _)| **other != id)
                .map(|(_, w)| w.throughput_rate(now))
                .fold(0.0, f64::max);
            let w = inner.contexts.get(&id).unwrap();
            let zero_remaining = w.total_flops > 0.0 && w.remaining_flops <= 0.0;
            let rate_trigger = self.policy.wants_rate_trigger(sender_rate, receiver_rate);
            active_contexts > 1 && (w.resize_enabled || zero_remaining || rate_trigger) && w.pending_ack.is_none()
        };
        if should_resize {
            self.attempt_resize(id);
        } else {
            self.check_ack(id);
        }
    }

    pub fn idle_time(&self, id: ContextId, worker: WorkerId, t: Duration) {
        let trigger = {
            let mut inner = self.inner.lock();
            let Some(w) = inner.contexts.get_mut(&id) else { return };
            *w.current_idle_time.entry(worker).or_insert(Duration::ZERO) += t;
            let max_idle = w.config.worker_config(worker).max_idle;
            let sample = w.current_idle_time[&worker];
            w.resize_enabled && w.pending_ack.is_none() && self.policy.wants_idle_trigger(sample, max_idle)
        };
        if trigger {
            self.attempt_resize(id);
        } else {
            self.check_ack(id);
        }
    }

    pub fn reset_idle_time(&self, id: ContextId, worker: WorkerId) {
        let mut inner = self.inner.lock();
        if let Some(w) = inner.contexts.get_mut(&id) {
            if w.resize_enabled {
                w.current_idle_time.insert(worker, Duration::ZERO);
            }
        }
    }

    /// Register a deferred action keyed to `tag`, applied once the task
    /// carrying that tag completes (SPEC_FULL §10.5).
    pub fn defer(&self, tag: u64, action: DeferredAction) {
        self.inner.lock().deferred_by_tag.insert(tag, action);
    }

    /// `post_exec_hook(task_tag)` (SPEC_FULL §4.4, scenario 6): apply any
    /// deferred work keyed to `tag`, exactly once.
    pub fn post_exec_hook(&self, tag: u64, sched_ctx: ContextId) -> bool {
        let action = self.inner.lock().deferred_by_tag.remove(&tag);
        match action {
            Some(DeferredAction::SetArchSlowFactor { arch, bucket_id, factor }) => {
                let inner = self.inner.lock();
                if let Some(w) = inner.contexts.get(&sched_ctx) {
                    let ctx = w.context.lock();
                    let _ = ctx.scheduler.set_arch_slow_factor(arch, bucket_id, factor);
                }
                true
            }
            Some(DeferredAction::SetMapping { arch, source_prio, bucket_id }) => {
                let inner = self.inner.lock();
                if let Some(w) = inner.contexts.get(&sched_ctx) {
                    let ctx = w.context.lock();
                    let _ = ctx.scheduler.set_mapping(arch, source_prio, bucket_id);
                }
                true
            }
            Some(DeferredAction::RequestResize { forced_receiver }) => {
                drop(action);
                if let Some(receiver) = forced_receiver {
                    self.attempt_resize_to(sched_ctx, Some(receiver));
                } else {
                    self.attempt_resize(sched_ctx);
                }
                true
            }
            None => false,
        }
    }

    // ---- §4.5 Resize algorithm ----

    fn attempt_resize(&self, sender: ContextId) {
        let forced = self.policy.forced_receiver();
        self.attempt_resize_to(sender, forced);
    }

    fn attempt_resize_to(&self, sender: ContextId, forced_receiver: Option<ContextId>) {
        let mut inner = self.inner.lock();

        let Some(sender_wrapper) = inner.contexts.get(&sender) else { return };
        if sender_wrapper.pending_ack.is_some() {
            return;
        }

        let (sender_nworkers, candidates) = {
            let ctx = sender_wrapper.context.lock();
            let config = &sender_wrapper.config;
            let candidates: Vec<resize::Candidate> = ctx
                .workers()
                .iter()
                .map(|&wid| {
                    let wc = config.worker_config(wid);
                    resize::Candidate {
                        worker_id: wid,
                        priority: wc.priority,
                        idle_time: sender_wrapper.current_idle_time.get(&wid).copied().unwrap_or_default(),
                        fixed: wc.fixed,
                    }
                })
                .collect();
            (ctx.nworkers(), candidates)
        };
        let movable = candidates.iter().filter(|c| !c.fixed).count();
        let n_move = resize::compute_n_move(
            movable,
            sender_nworkers,
            sender_wrapper.config.granularity.max(1),
            sender_wrapper.config.min_nworkers,
            sender_wrapper.config.max_nworkers,
        );
        if n_move == 0 {
            return;
        }

        let receiver = match forced_receiver {
            Some(r) => r,
            None => {
                let now = self.clock.now();
                match inner
                    .contexts
                    .iter()
                    .filter(|(id, _)| **id != sender)
                    .max_by_key(|(_, w)| (w.priority_sum(), (w.throughput_rate(now) * 1000.0) as i64))
                    .map(|(id, _)| *id)
                {
                    Some(r) => r,
                    None => return,
                }
            }
        };
        if receiver == sender || !inner.contexts.contains_key(&receiver) {
            return;
        }

        let receiver_max = inner.contexts[&receiver].config.max_nworkers;
        let receiver_current = {
            let ctx = inner.contexts[&receiver].context.lock();
            ctx.nworkers()
        };
        let n_move = n_move.min(receiver_max.saturating_sub(receiver_current));
        if n_move == 0 {
            warn!("hypervisor: resize from {sender} to {receiver} cancelled, receiver at max_nworkers");
            return;
        }

        let chosen = resize::select_workers(&candidates, n_move);
        if chosen.is_empty() {
            return;
        }

        let sender_arch_types: HashMap<WorkerId, ArchMask> = {
            // Arch type is only known by the scheduler once attached; the
            // hypervisor re-derives it by asking the sender's scheduler.
            let ctx = inner.contexts[&sender].context.lock();
            chosen.iter().map(|&w| (w, ctx.scheduler.worker_arch_type(w))).collect()
        };

        {
            let mut sender_ctx = inner.contexts[&sender].context.lock();
            for &w in &chosen {
                sender_ctx.detach_worker(w);
            }
        }
        {
            let mut receiver_ctx = inner.contexts[&receiver].context.lock();
            for &w in &chosen {
                let arch = sender_arch_types[&w];
                receiver_ctx.attach_worker(w, arch);
            }
        }

        debug!("hypervisor: moved {} worker(s) {:?} from context {sender} to {receiver}", chosen.len(), chosen);

        if let Some(sw) = inner.contexts.get_mut(&sender) {
            sw.pending_ack = Some(PendingAck { receiver, moved_workers: chosen });
            for w in sw.current_idle_time.values_mut() {
                *w = Duration::ZERO;
            }
            sw.resize_enabled = false;
        }
    }

    /// Check whether a sender's pending ack is complete (SPEC_FULL §4.5
    /// "Acknowledgement"): every moved worker has `elapsed_flops[w] > 0`
    /// under the receiver.
    fn check_ack(&self, sender: ContextId) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let Some(sw) = inner.contexts.get(&sender) else { return };
        let Some(ack) = sw.pending_ack.clone() else { return };

        let complete = {
            let Some(rw) = inner.contexts.get(&ack.receiver) else { return };
            ack.moved_workers.iter().all(|w| rw.elapsed_flops.get(w).copied().unwrap_or(0.0) > 0.0)
        };
        if !complete {
            return;
        }

        let sender_elapsed: f64;
        {
            let sw = inner.contexts.get_mut(&sender).unwrap();
            sender_elapsed = sw.elapsed_flops.values().sum();
            sw.remaining_flops -= sender_elapsed;
            sw.elapsed_flops.clear();
            sw.start_time = now;
            sw.resize_enabled = true;
            sw.pending_ack = None;
        }
        if let Some(rw) = inner.contexts.get_mut(&ack.receiver) {
            let receiver_elapsed: f64 = ack.moved_workers.iter().map(|w| rw.elapsed_flops.get(w).copied().unwrap_or(0.0)).sum();
            rw.remaining_flops -= receiver_elapsed;
            for w in &ack.moved_workers {
                rw.elapsed_flops.insert(*w, 0.0);
            }
            rw.start_time = now;
        }
        debug!("hypervisor: resize ack complete, context {sender} -> {} re-enabled", ack.receiver);
    }

    #[cfg(test)]
    fn has_pending_ack(&self, id: ContextId) -> bool {
        self.inner.lock().contexts.get(&id).map_or(false, |w| w.pending_ack.is_some())
    }

    #[cfg(test)]
    fn is_resize_enabled(&self, id: ContextId) -> bool {
        self.inner.lock().contexts.get(&id).map_or(false, |w| w.resize_enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::index_to_arch_bit;
    use crate::scheduler::{Heteroprio, DEFAULT_MAX_PRIO};

    fn make_context(id: ContextId, nworkers: usize) -> Arc<Mutex<SchedulingContext>> {
        let sched = Arc::new(Heteroprio::new(DEFAULT_MAX_PRIO, 2, nworkers + 4));
        sched.set_nb_prios(0, 1).unwrap();
        sched.set_mapping(0, 0, 0).unwrap();
        let mut ctx = SchedulingContext::new(id, sched);
        for w in 0..nworkers {
            ctx.attach_worker(id as usize * 100 + w, index_to_arch_bit(0));
        }
        Arc::new(Mutex::new(ctx))
    }

    #[test]
    fn scenario_6_post_exec_deferred_config_applies_once() {
        let hv = Hypervisor::hypervisor_init(Policy::Idle);
        let ctx = make_context(0, 1);
        hv.handle_ctx(0, ctx, HypervisorConfig::new(1, 4, 1), 0.0);
        hv.defer(42, DeferredAction::SetArchSlowFactor { arch: 0, bucket_id: 0, factor: 3.0 });
        assert!(hv.post_exec_hook(42, 0));
        assert!(!hv.post_exec_hook(42, 0), "second call finds nothing, applies nothing");
    }

    #[test]
    fn pushed_task_enables_resize_after_min_tasks() {
        let hv = Hypervisor::hypervisor_init(Policy::Idle);
        let ctx = make_context(0, 1);
        let mut cfg = HypervisorConfig::new(1, 4, 1);
        cfg.min_tasks = 3;
        hv.handle_ctx(0, ctx, cfg, 100.0);
        hv.pushed_task(0, 0);
        assert!(!hv.is_resize_enabled(0));
        hv.pushed_task(0, 0);
        hv.pushed_task(0, 0);
        assert!(hv.is_resize_enabled(0));
    }

    #[test]
    fn start_stop_resize_toggle() {
        let hv = Hypervisor::hypervisor_init(Policy::Idle);
        let ctx = make_context(0, 1);
        hv.handle_ctx(0, ctx, HypervisorConfig::new(1, 4, 1), 0.0);
        hv.start_resize(0);
        assert!(hv.is_resize_enabled(0));
        hv.stop_resize(0);
        assert!(!hv.is_resize_enabled(0));
    }

    #[test]
    fn shutdown_clears_all_contexts() {
        let hv = Hypervisor::hypervisor_init(Policy::Idle);
        hv.handle_ctx(0, make_context(0, 1), HypervisorConfig::new(1, 4, 1), 0.0);
        hv.handle_ctx(1, make_context(1, 1), HypervisorConfig::new(1, 4, 1), 0.0);
        hv.shutdown();
        assert!(!hv.is_resize_enabled(0));
        assert!(!hv.has_pending_ack(1));
    }
}
