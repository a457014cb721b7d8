//! The FIFO primitive used by both buckets and worker local queues.
//!
//! Grounded on `_starpu_fifo_taskq` (original_source
//! `src/sched_policies/fifo_queues.h`): push-back, pop-front, and — for the
//! worker local queue only — pop-back, used by a thief to steal from the
//! tail while the owner keeps serving the head (SPEC_FULL §4.3 step 4).

use std::collections::VecDeque;

use crate::task::Task;

/// A plain, unbounded double-ended task queue.
///
/// Bucket queues never need a capacity bound; worker local queues enforce
/// `MAX_PREFETCH` at the call site in [`crate::worker::WorkerWrapper`]
/// rather than here, so the same primitive serves both roles.
#[derive(Debug, Default)]
pub struct TaskFifo {
    tasks: VecDeque<Task>,
}

impl TaskFifo {
    pub fn new() -> Self {
        Self { tasks: VecDeque::new() }
    }

    #[inline]
    pub fn push_back(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    #[inline]
    pub fn pop_back(&mut self) -> Option<Task> {
        self.tasks.pop_back()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[inline]
    pub fn ntasks(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: u64) -> Task {
        Task::new(id, 0, 1)
    }

    #[test]
    fn fifo_order_is_insertion_order() {
        let mut q = TaskFifo::new();
        q.push_back(t(1));
        q.push_back(t(2));
        q.push_back(t(3));
        assert_eq!(q.pop_front().unwrap().id, 1);
        assert_eq!(q.pop_front().unwrap().id, 2);
        assert_eq!(q.pop_front().unwrap().id, 3);
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn pop_back_steals_tail() {
        let mut q = TaskFifo::new();
        q.push_back(t(1));
        q.push_back(t(2));
        q.push_back(t(3));
        assert_eq!(q.pop_back().unwrap().id, 3);
        assert_eq!(q.ntasks(), 2);
        assert_eq!(q.pop_front().unwrap().id, 1);
    }
}
