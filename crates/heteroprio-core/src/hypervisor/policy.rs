//! Pluggable resize policies (SPEC_FULL §4.7): same resize machinery,
//! different triggering condition and (for app-driven) a forced receiver.
//!
//! Grounded on `sched_ctx_hypervisor_policy.c`'s three policy vtables
//! (`idle_policy`, `app_driven_policy`, `gflops_rate_policy`) in
//! `examples/original_source/`; collapsed into one tagged enum per
//! SPEC_FULL §9's "tagged variant, not inheritance" guidance.

use std::time::Duration;

use crate::context::ContextId;

/// A resize strategy. Policy selection is immutable once a [`crate::hypervisor::Hypervisor`]
/// is constructed (SPEC_FULL §9).
#[derive(Debug, Clone)]
pub enum Policy {
    /// Trigger a resize whenever a worker's sampled idle time exceeds its
    /// configured `max_idle`.
    Idle,
    /// Trigger only when the application explicitly tags a context for
    /// resize, always moving workers to a pre-specified receiver.
    AppDriven { forced_receiver: ContextId },
    /// Trigger by comparing measured throughput (flops/second) between
    /// contexts; a context whose rate lags its peer's by the configured
    /// margin becomes a resize candidate.
    GflopsRate { lag_margin: f64 },
}

impl Policy {
    /// Idle-policy trigger condition (SPEC_FULL §4.4 `idle_time`).
    pub fn wants_idle_trigger(&self, sample: Duration, max_idle: Duration) -> bool {
        matches!(self, Policy::Idle) && sample > max_idle
    }

    /// App-driven policy never auto-triggers on idle samples; it fires only
    /// through an explicit `start_resize`/tag-driven call.
    pub fn forced_receiver(&self) -> Option<ContextId> {
        match self {
            Policy::AppDriven { forced_receiver } => Some(*forced_receiver),
            _ => None,
        }
    }

    /// Throughput-rate trigger condition (SPEC_FULL §4.7): `sender_rate` and
    /// `receiver_rate` in flops/second.
    pub fn wants_rate_trigger(&self, sender_rate: f64, receiver_rate: f64) -> bool {
        match self {
            Policy::GflopsRate { lag_margin } => {
                receiver_rate > 0.0 && sender_rate / receiver_rate < 1.0 - lag_margin
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_policy_triggers_past_threshold() {
        let p = Policy::Idle;
        assert!(p.wants_idle_trigger(Duration::from_millis(200), Duration::from_millis(100)));
        assert!(!p.wants_idle_trigger(Duration::from_millis(50), Duration::from_millis(100)));
    }

    #[test]
    fn app_driven_never_idle_triggers() {
        let p = Policy::AppDriven { forced_receiver: 1 };
        assert!(!p.wants_idle_trigger(Duration::from_secs(10), Duration::ZERO));
        assert_eq!(p.forced_receiver(), Some(1));
    }

    #[test]
    fn gflops_rate_triggers_on_lag() {
        let p = Policy::GflopsRate { lag_margin: 0.2 };
        assert!(p.wants_rate_trigger(0.5, 1.0));
        assert!(!p.wants_rate_trigger(0.9, 1.0));
    }
}
