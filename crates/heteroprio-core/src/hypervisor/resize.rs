//! Pure, unit-testable pieces of the resize algorithm (SPEC_FULL §4.5/§4.6):
//! how many workers to move, and which ones to pick.
//!
//! Grounded on `sched_ctx_hypervisor_policy.c`'s `get_nworkers_to_move` /
//! `get_potential_workers_to_move` in `examples/original_source/`.

use std::time::Duration;

use crate::worker::WorkerId;

/// `n_move` computation, SPEC_FULL §4.5 step 2.
///
/// `p` = movable (non-fixed) workers in the sender, `w` = sender's current
/// worker count, `g` = granularity, `[lo, hi]` = `[min_nworkers,
/// max_nworkers]`.
pub fn compute_n_move(p: usize, w: usize, g: usize, lo: usize, hi: usize) -> usize {
    let mut n = if p <= lo {
        p
    } else if p > hi {
        if p - g > hi {
            p
        } else {
            p - hi
        }
    } else if p > g {
        if w >= g && w - g > lo {
            g
        } else {
            p - lo
        }
    } else if w >= p && w - p >= lo {
        p
    } else {
        p.saturating_sub(lo.saturating_sub(w.saturating_sub(p)))
    };
    // Trailing clamp from `_get_nworkers_to_move`: if the sender would keep
    // more than hi workers after the move, move more.
    if w.saturating_sub(n) > hi {
        n = w.saturating_sub(hi);
    }
    // Existing safety net: don't drop the sender below lo.
    n.min(w.saturating_sub(lo)).min(p)
}

/// A candidate worker for selection, carrying the fields the tie-break rule
/// needs (SPEC_FULL §4.6): lowest `priority` wins, ties broken by highest
/// `idle_time`.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub worker_id: WorkerId,
    pub priority: i32,
    pub idle_time: Duration,
    pub fixed: bool,
}

/// Select up to `n` workers from `candidates`, applying the worker-selection
/// rule repeatedly. Returns fewer than `n` if not enough eligible candidates
/// exist (SPEC_FULL §4.6, "return the count actually filled").
pub fn select_workers(candidates: &[Candidate], n: usize) -> Vec<WorkerId> {
    let mut pool: Vec<&Candidate> = candidates.iter().filter(|c| !c.fixed).collect();
    let mut chosen = Vec::with_capacity(n.min(pool.len()));
    for _ in 0..n {
        let Some((idx, best)) = pool.iter().enumerate().min_by(|(_, a), (_, b)| {
            a.priority.cmp(&b.priority).then_with(|| b.idle_time.cmp(&a.idle_time))
        }) else {
            break;
        };
        chosen.push(best.worker_id);
        pool.remove(idx);
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n_move_all_when_at_or_below_min() {
        assert_eq!(compute_n_move(2, 4, 2, 1, 4), 2);
    }

    #[test]
    fn n_move_above_max_moves_overflow() {
        // p=5, hi=4: p - g(2) = 3 <= hi(4), so the main branch proposes
        // n=p-hi=1 -- but that leaves the sender with w-n=5 workers, which
        // still exceeds hi(4), so the trailing clamp raises n to w-hi=2.
        assert_eq!(compute_n_move(5, 6, 2, 1, 4), 2);
    }

    #[test]
    fn n_move_mid_range_takes_granularity() {
        // p=3 > g=2, w=4, w-g=2 > lo=1 -> move g=2
        assert_eq!(compute_n_move(3, 4, 2, 1, 4), 2);
    }

    #[test]
    fn scenario_5_hypervisor_move_selects_highest_idle() {
        let candidates = vec![
            Candidate { worker_id: 0, priority: 1, idle_time: Duration::from_millis(10), fixed: false },
            Candidate { worker_id: 1, priority: 1, idle_time: Duration::from_millis(10), fixed: false },
            Candidate { worker_id: 2, priority: 1, idle_time: Duration::from_millis(500), fixed: false },
            Candidate { worker_id: 3, priority: 1, idle_time: Duration::from_millis(400), fixed: false },
        ];
        let chosen = select_workers(&candidates, 2);
        assert_eq!(chosen, vec![2, 3]);
    }

    #[test]
    fn select_workers_skips_fixed() {
        let candidates = vec![
            Candidate { worker_id: 0, priority: 0, idle_time: Duration::ZERO, fixed: true },
            Candidate { worker_id: 1, priority: 5, idle_time: Duration::ZERO, fixed: false },
        ];
        assert_eq!(select_workers(&candidates, 1), vec![1]);
    }

    #[test]
    fn select_workers_returns_fewer_when_short() {
        let candidates =
            vec![Candidate { worker_id: 0, priority: 0, idle_time: Duration::ZERO, fixed: false }];
        assert_eq!(select_workers(&candidates, 3), vec![0]);
    }
}
