//! Contest lifecycle state machine: primitives, reconciler, and the
//! lock-strategy registry (spec §4.3, §4.4, §9).

pub mod primitives;
pub mod reconciler;
pub mod strategies;

pub use primitives::{
    attempt_system_transition_with_error_recovery, perform_single_state_transition,
    transition_live_to_complete, transition_locked_to_live, transition_scheduled_to_locked,
    SingleTransitionResult, TransitionBatch,
};
pub use reconciler::{reconcile_lifecycle, spawn_reconciler_worker, ReconcileReport};
