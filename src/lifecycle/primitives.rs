//! Lifecycle Primitives (C3, spec §4.3).
//!
//! Five pure, deterministic functions. Each takes a database handle and a
//! caller-supplied `now` — never the DB clock — and is safe to call
//! repeatedly. The three time-driven primitives are each a single `UPDATE
//! ... RETURNING id` selecting rows by state+time predicate, followed by a
//! transition-log insert guarded by `NOT EXISTS`; atomicity is the single
//! transaction (`Db::with_tx`). A row already past the target state is
//! simply not selected, so re-running a primitive against unchanged data
//! is always a safe no-op.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Transaction};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::Db;
use crate::error::{CoreError, SettlementError};
use crate::models::{ContestStatus, TriggerTag};
use crate::settlement;
use crate::transition_log::record_transition;

#[derive(Debug, Clone, Default)]
pub struct TransitionBatch {
    pub count: usize,
    pub changed_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy)]
pub struct SingleTransitionResult {
    pub success: bool,
    pub changed: bool,
}

fn collect_ids(tx: &Transaction<'_>, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Uuid>> {
    let mut stmt = tx.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for r in rows {
        let s = r?;
        ids.push(Uuid::parse_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?);
    }
    Ok(ids)
}

/// Phase 1: `SCHEDULED -> LOCKED` when `now >= lock_time` (inclusive boundary).
pub async fn transition_scheduled_to_locked(db: &Db, now: DateTime<Utc>) -> Result<TransitionBatch> {
    db.with_tx(|tx| {
        let ids = collect_ids(
            tx,
            "UPDATE contest_instances SET status = 'LOCKED'
             WHERE status = 'SCHEDULED' AND lock_time IS NOT NULL AND lock_time <= ?1
             RETURNING id",
            rusqlite::params![now.to_rfc3339()].as_slice(),
        )?;
        for id in &ids {
            record_transition(
                tx,
                *id,
                Some(ContestStatus::Scheduled),
                ContestStatus::Locked,
                TriggerTag::LockTimeReached,
                "lock time reached",
                now,
            )?;
        }
        Ok(TransitionBatch {
            count: ids.len(),
            changed_ids: ids,
        })
    })
    .await
}

/// Phase 2: `LOCKED -> LIVE` when `now >= tournament_start_time`.
pub async fn transition_locked_to_live(db: &Db, now: DateTime<Utc>) -> Result<TransitionBatch> {
    db.with_tx(|tx| {
        let ids = collect_ids(
            tx,
            "UPDATE contest_instances SET status = 'LIVE'
             WHERE status = 'LOCKED' AND tournament_start_time IS NOT NULL AND tournament_start_time <= ?1
             RETURNING id",
            rusqlite::params![now.to_rfc3339()].as_slice(),
        )?;
        for id in &ids {
            record_transition(
                tx,
                *id,
                Some(ContestStatus::Locked),
                ContestStatus::Live,
                TriggerTag::TournamentStartTimeReached,
                "tournament start time reached",
                now,
            )?;
        }
        Ok(TransitionBatch {
            count: ids.len(),
            changed_ids: ids,
        })
    })
    .await
}

/// Phase 3: `LIVE -> COMPLETE` when `now >= tournament_end_time`. Invokes the
/// Settlement Engine per eligible contest, each in its own transaction, so a
/// fatal failure for one contest cannot abort the batch (spec §4.3, §7).
pub async fn transition_live_to_complete(db: &Db, now: DateTime<Utc>) -> Result<TransitionBatch> {
    let eligible = db
        .with_tx(|tx| {
            collect_ids(
                tx,
                "SELECT id FROM contest_instances
                 WHERE status = 'LIVE' AND tournament_end_time IS NOT NULL AND tournament_end_time <= ?1",
                rusqlite::params![now.to_rfc3339()].as_slice(),
            )
        })
        .await?;

    let mut changed_ids = Vec::new();
    for contest_id in eligible {
        match settlement::execute_settlement(db, contest_id, now).await {
            Ok(_outcome) => {
                info!(%contest_id, "settlement completed, contest transitioned to COMPLETE");
                changed_ids.push(contest_id);
            }
            Err(SettlementError::MissingSnapshot) => {
                warn!(%contest_id, "no FINAL snapshot yet; leaving contest LIVE");
            }
            Err(SettlementError::NotLive) | Err(SettlementError::AlreadySettled) => {
                // Another run already handled this contest; not an error.
            }
            Err(SettlementError::Fatal(e)) => {
                error!(%contest_id, error = %e, "settlement failed fatally; escalating to ERROR");
                attempt_system_transition_with_error_recovery(db, contest_id, now).await?;
            }
        }
    }

    Ok(TransitionBatch {
        count: changed_ids.len(),
        changed_ids,
    })
}

/// Generic single-instance transition, gated on an allowed-from set.
/// Used for admin-triggered transitions (lock, cancel, error mark/resolve).
pub async fn perform_single_state_transition(
    db: &Db,
    id: Uuid,
    allowed_from: &[ContestStatus],
    to: ContestStatus,
    trigger: TriggerTag,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<SingleTransitionResult> {
    db.with_tx(|tx| {
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM contest_instances WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .ok();
        let Some(current) = current else {
            return Ok(SingleTransitionResult {
                success: false,
                changed: false,
            });
        };
        let current_status = ContestStatus::parse(&current).ok_or_else(|| {
            anyhow::anyhow!(CoreError::InvariantViolation(format!(
                "unrecognized contest status {current}"
            )))
        })?;

        if !allowed_from.contains(&current_status) {
            return Ok(SingleTransitionResult {
                success: false,
                changed: false,
            });
        }

        let updated = tx.execute(
            "UPDATE contest_instances SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![to.as_str(), id.to_string(), current_status.as_str()],
        )?;
        if updated == 0 {
            return Ok(SingleTransitionResult {
                success: false,
                changed: false,
            });
        }

        let inserted = record_transition(tx, id, Some(current_status), to, trigger, reason, now)?;
        Ok(SingleTransitionResult {
            success: true,
            changed: inserted,
        })
    })
    .await
}

/// `LIVE -> ERROR` escalation on a fatal settlement error (spec §4.3, §7).
pub async fn attempt_system_transition_with_error_recovery(
    db: &Db,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<SingleTransitionResult> {
    perform_single_state_transition(
        db,
        id,
        &[ContestStatus::Live],
        ContestStatus::Error,
        TriggerTag::SettlementFailed,
        "settlement raised a fatal error",
        now,
    )
    .await
}
