//! A heterogeneous task-scheduling core: priority-bucket dispatch across
//! architecture-tagged workers ([`scheduler`]), and a process-wide
//! hypervisor that dynamically resizes scheduling contexts across
//! themselves ([`hypervisor`]).
//!
//! Device data transfer, performance-model calibration, the task submission
//! front-end, and command-line tooling are external collaborators, plugged
//! in through the traits in [`collaborators`] rather than owned here.

pub mod arch;
pub mod bucket;
pub mod collaborators;
pub mod context;
pub mod error;
pub mod fifo;
pub mod hypervisor;
pub mod scheduler;
pub mod task;
pub mod worker;

pub use arch::{ArchIndex, ArchMask, NB_ARCH_TYPES};
pub use context::{ContextId, SchedulingContext};
pub use error::{ConfigError, HeteroprioError};
pub use hypervisor::{DeferredAction, Hypervisor, HypervisorConfig, Policy, WorkerHypervisorConfig};
pub use scheduler::{Heteroprio, DEFAULT_MAX_PRIO};
pub use task::{Task, TaskId, TaskTag};
pub use worker::{WorkerId, WorkerSlot};
