//! Transition Log (C1, spec §4.1).
//!
//! Append-only. Every lifecycle write inserts a row describing from_state,
//! to_state, a machine-readable trigger tag, and a human reason. Timestamps
//! always come from the caller's injected `now`, never the database clock.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Transaction};
use uuid::Uuid;

use crate::models::{ContestStatus, TriggerTag};

/// Insert a transition row, guarded by `WHERE NOT EXISTS` on
/// `(contest_instance_id, from_state, to_state, triggered_by)` so automatic
/// reconciliation paths never produce a duplicate row for the same tuple
/// (invariant 8). Returns `true` if a row was inserted.
pub fn record_transition(
    tx: &Transaction<'_>,
    contest_instance_id: Uuid,
    from_state: Option<ContestStatus>,
    to_state: ContestStatus,
    triggered_by: TriggerTag,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let from_str = from_state.map(|s| s.as_str());
    let changed = tx.execute(
        "INSERT INTO contest_state_transitions
            (contest_instance_id, from_state, to_state, triggered_by, reason, created_at)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6
         WHERE NOT EXISTS (
             SELECT 1 FROM contest_state_transitions
             WHERE contest_instance_id = ?1
               AND (from_state IS ?2)
               AND to_state = ?3
               AND triggered_by = ?4
         )",
        params![
            contest_instance_id.to_string(),
            from_str,
            to_state.as_str(),
            triggered_by.as_str(),
            reason,
            now.to_rfc3339(),
        ],
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    #[tokio::test]
    async fn test_duplicate_transition_is_a_no_op() {
        let db = Db::open_in_memory().unwrap();
        let contest_id = Uuid::new_v4();
        let now = Utc::now();

        let inserted_first = db
            .with_tx(|tx| {
                record_transition(
                    tx,
                    contest_id,
                    Some(ContestStatus::Scheduled),
                    ContestStatus::Locked,
                    TriggerTag::LockTimeReached,
                    "lock time reached",
                    now,
                )
            })
            .await
            .unwrap();
        assert!(inserted_first);

        let inserted_second = db
            .with_tx(|tx| {
                record_transition(
                    tx,
                    contest_id,
                    Some(ContestStatus::Scheduled),
                    ContestStatus::Locked,
                    TriggerTag::LockTimeReached,
                    "lock time reached",
                    now,
                )
            })
            .await
            .unwrap();
        assert!(!inserted_second);
    }
}
