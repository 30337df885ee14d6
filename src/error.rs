//! Error taxonomy (spec §7).
//!
//! Four classes: client-visible validation results (`JoinResult`),
//! reconciler soft-skip signals and fatal per-contest errors
//! (`SettlementError`), and process-level invariant violations
//! (`CoreError`). Validation errors are never exceptions; invariant
//! violations always are.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinResult {
    Joined,
    AlreadyJoined,
    ContestFull,
    Locked,
    InsufficientFunds,
    ContestNotPublished,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("unknown strategy key: {0}")]
    UnknownStrategy(String),

    #[error("unsupported sport for settlement: {0}")]
    UnsupportedSport(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

/// Outcome of a settlement attempt. `MissingSnapshot` and `NotLive`/
/// `AlreadySettled` are soft-skip signals the reconciler swallows and logs;
/// `Fatal` is what escalates a single contest to ERROR.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("no FINAL snapshot available for contest")]
    MissingSnapshot,

    #[error("contest is not LIVE")]
    NotLive,

    #[error("contest already has a settlement record")]
    AlreadySettled,

    #[error("fatal settlement error: {0}")]
    Fatal(#[from] CoreError),
}
