//! Lock-strategy registry.
//!
//! Dynamic dispatch by string key (spec §9 "Dynamic dispatch"): a `match`
//! over known keys, an `available_*()` helper for diagnostics, unknown keys
//! fail construction rather than execution.

use std::collections::HashMap;

use crate::error::CoreError;

/// A lock strategy only needs to be *recognized*; the actual lock-time
/// predicate lives in `lifecycle::primitives::transition_scheduled_to_locked`,
/// which is driven entirely by the contest row's `lock_time` column
/// regardless of which strategy produced it. Validating the key at template
/// creation time is what this registry is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrategy {
    TimeBasedLockV1,
    FirstGameKickoff,
    Manual,
}

pub fn available_lock_strategies() -> HashMap<&'static str, &'static str> {
    let mut map = HashMap::new();
    map.insert("time_based_lock_v1", "Lock at a fixed, pre-computed lock_time");
    map.insert("first_game_kickoff", "Lock at the first constituent game's kickoff time");
    map.insert("manual", "Lock only via explicit admin action");
    map
}

pub fn lock_strategy(key: &str) -> Result<LockStrategy, CoreError> {
    match key {
        "time_based_lock_v1" => Ok(LockStrategy::TimeBasedLockV1),
        "first_game_kickoff" => Ok(LockStrategy::FirstGameKickoff),
        "manual" => Ok(LockStrategy::Manual),
        other => Err(CoreError::UnknownStrategy(other.to_string())),
    }
}
