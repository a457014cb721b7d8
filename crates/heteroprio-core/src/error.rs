//! Error types for the heteroprio scheduler and hypervisor.
//!
//! Invariant violations (counter mismatches, popping from an empty queue the
//! counters claim is non-empty, a waiter bit set when no worker should be
//! waiting) are programming bugs, not recoverable errors: they are asserted
//! with `debug_assert!`/`assert!` at the call site instead of being modeled
//! here. Only the error kinds a caller can reasonably react to are part of
//! this enum.

use std::fmt;

use crate::arch::ArchMask;

/// Caller-recoverable errors surfaced by configuration and submission.
#[derive(Debug, thiserror::Error)]
pub enum HeteroprioError {
    /// A bucket/mapping configuration call was inconsistent.
    #[error("scheduler configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage for a bucket or worker queue could not be allocated during
    /// scheduler init; the scheduler remains uninitialized.
    #[error("resource exhaustion during scheduler init: {0}")]
    ResourceExhaustion(String),

    /// A task was submitted to a bucket whose `valid_archs` are not served
    /// by any worker currently attached to the context.
    #[error("no worker in this context can execute a task requiring archs {required:#06x}")]
    NoEligibleWorker {
        /// The architecture mask the task required.
        required: ArchMask,
    },
}

/// Configuration-time errors (see SPEC_FULL §4.1/§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `set_nb_prios` was called with `n` exceeding `MAX_PRIO`.
    TooManyPriorities { arch: u32, requested: u32, max: u32 },
    /// `set_mapping`/`set_faster_arch`/`set_arch_slow_factor` referenced a
    /// bucket id `>= MAX_PRIO`.
    BucketOutOfRange { bucket_id: usize, max: usize },
    /// A negative slow factor was supplied.
    NegativeSlowFactor { arch: u32, bucket_id: usize, factor: f64 },
    /// A task's priority is outside `0..MAX_PRIO`.
    PriorityOutOfRange { priority: usize, max: usize },
    /// The bucket a task's priority maps to has no `valid_archs` configured.
    EmptyBucket { bucket_id: usize },
    /// The bucket claims an architecture the task cannot run on.
    ArchMismatch { bucket_id: usize, valid_archs: ArchMask, task_where: ArchMask },
    /// The init consistency check found a mapped prio pointing at a bucket
    /// that does not include the mapping architecture in its `valid_archs`.
    MappingIntoUnsetArch { arch: u32, source_prio: usize, bucket_id: usize },
    /// The init consistency check found a bucket whose `valid_archs` bit
    /// count does not match the number of architectures that map into it.
    ArchCountMismatch { bucket_id: usize, valid_archs_count: u32, mapped_count: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TooManyPriorities { arch, requested, max } => write!(
                f,
                "arch {arch} requested {requested} priority levels, exceeding MAX_PRIO={max}"
            ),
            ConfigError::BucketOutOfRange { bucket_id, max } => {
                write!(f, "bucket id {bucket_id} is out of range (MAX_PRIO={max})")
            }
            ConfigError::NegativeSlowFactor { arch, bucket_id, factor } => write!(
                f,
                "arch {arch} bucket {bucket_id}: slow factor {factor} must be >= 0"
            ),
            ConfigError::PriorityOutOfRange { priority, max } => {
                write!(f, "task priority {priority} is out of range (MAX_PRIO={max})")
            }
            ConfigError::EmptyBucket { bucket_id } => {
                write!(f, "bucket {bucket_id} has no valid_archs configured")
            }
            ConfigError::ArchMismatch { bucket_id, valid_archs, task_where } => write!(
                f,
                "bucket {bucket_id} (valid_archs={valid_archs:#06x}) claims archs the task (where={task_where:#06x}) cannot target"
            ),
            ConfigError::MappingIntoUnsetArch { arch, source_prio, bucket_id } => write!(
                f,
                "arch {arch} maps prio {source_prio} into bucket {bucket_id}, which does not list that arch in valid_archs"
            ),
            ConfigError::ArchCountMismatch { bucket_id, valid_archs_count, mapped_count } => write!(
                f,
                "bucket {bucket_id}: valid_archs has {valid_archs_count} archs set but {mapped_count} archs map into it"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
