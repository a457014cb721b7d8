//! A priority bucket: a FIFO of tasks plus the architecture-eligibility and
//! slow-factor metadata that drives the affinity gate.
//!
//! Grounded on `_heteroprio_bucket` (original_source
//! `src/sched_policies/heteroprio.c`).

use crate::arch::{ArchIndex, ArchMask, NB_ARCH_TYPES};
use crate::fifo::TaskFifo;

/// `factor_base_arch` is optional: a bucket with no designated fastest arch
/// has no slow-factor gating at all (SPEC_FULL §4.3, "factor_base is
/// unset/zero").
pub const NO_FACTOR_BASE: ArchIndex = ArchIndex::MAX;

#[derive(Debug)]
pub struct Bucket {
    pub queue: TaskFifo,
    /// Architectures permitted to execute tasks in this bucket.
    pub valid_archs: ArchMask,
    /// Per-arch slowness weight relative to `factor_base_arch`.
    pub slow_factors: [f64; NB_ARCH_TYPES],
    /// The architecture tasks in this bucket are presumed fastest on, or
    /// [`NO_FACTOR_BASE`] if none was designated.
    pub factor_base_arch: ArchIndex,
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            queue: TaskFifo::new(),
            valid_archs: 0,
            slow_factors: [0.0; NB_ARCH_TYPES],
            factor_base_arch: NO_FACTOR_BASE,
        }
    }
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn serves_arch(&self, arch_bit: ArchMask) -> bool {
        self.valid_archs & arch_bit != 0
    }

    /// The affinity gate of SPEC_FULL §4.3: does `arch` get to pull from
    /// this bucket right now, given `nb_workers_for_base` workers of the
    /// base (presumed-fastest) architecture are attached to the context?
    ///
    /// Computed in `f64` throughout per the Open Question resolution in
    /// SPEC_FULL §9 / DESIGN.md.
    pub fn slow_factor_gate(&self, arch: ArchIndex, nb_workers_for_base: usize) -> bool {
        if self.factor_base_arch == NO_FACTOR_BASE {
            return true;
        }
        if arch == self.factor_base_arch {
            return true;
        }
        if nb_workers_for_base == 0 {
            // No base-arch worker exists to race against; nothing to gate.
            return true;
        }
        let depth = self.queue.ntasks() as f64;
        let factor = self.slow_factors[arch];
        depth / nb_workers_for_base as f64 >= factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::index_to_arch_bit;

    #[test]
    fn gate_open_with_no_factor_base() {
        let b = Bucket::new();
        assert!(b.slow_factor_gate(0, 1));
    }

    #[test]
    fn gate_open_for_base_arch_itself() {
        let mut b = Bucket::new();
        b.factor_base_arch = 0;
        b.slow_factors[1] = 100.0;
        assert!(b.slow_factor_gate(0, 1));
    }

    #[test]
    fn gate_veto_and_release() {
        let mut b = Bucket::new();
        b.valid_archs = index_to_arch_bit(0) | index_to_arch_bit(1);
        b.factor_base_arch = 0;
        b.slow_factors[1] = 2.0;
        // empty bucket: depth 0 / 1 = 0.0 >= 2.0 is false
        assert!(!b.slow_factor_gate(1, 1));
        for i in 0..3 {
            b.queue.push_back(crate::task::Task::new(i, 0, b.valid_archs));
        }
        // depth 3 / 1 workers = 3.0 >= 2.0
        assert!(b.slow_factor_gate(1, 1));
    }

    #[test]
    fn gate_monotonic_in_slow_factor() {
        let mut b = Bucket::new();
        b.valid_archs = index_to_arch_bit(0) | index_to_arch_bit(1);
        b.factor_base_arch = 0;
        for i in 0..3 {
            b.queue.push_back(crate::task::Task::new(i, 0, b.valid_archs));
        }
        b.slow_factors[1] = 2.0;
        assert!(b.slow_factor_gate(1, 1));
        b.slow_factors[1] = 5.0;
        assert!(!b.slow_factor_gate(1, 1));
    }
}
