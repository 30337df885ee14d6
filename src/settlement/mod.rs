//! Settlement Engine (C5, spec §4.5).
//!
//! Given a LIVE contest with at least one FINAL snapshot, deterministically
//! produces rankings, payouts, and a content hash, and persists them
//! atomically with the status flip to COMPLETE (spec §4.5.5).

pub mod canonical;
pub mod pga;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

pub use canonical::{canonicalize_json, hash_canonical};

use crate::db::Db;
use crate::error::{CoreError, SettlementError};
use crate::models::{ContestStatus, TriggerTag};
use crate::transition_log::record_transition;

/// Registered settlement strategies (spec §9 "Dynamic dispatch"). Only
/// `pga_standard_v1` has a concrete aggregation body; the others are
/// recognized names that fail with `UnsupportedSport` until implemented.
pub fn strategy_for(key: &str) -> Result<&'static str, CoreError> {
    match key {
        "pga_standard_v1" => Ok("pga_standard_v1"),
        "nfl_standard_v1" | "nba_standard_v1" | "mlb_standard_v1" => {
            Err(CoreError::UnsupportedSport(key.to_string()))
        }
        other => Err(CoreError::UnknownStrategy(other.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub contest_instance_id: Uuid,
    pub results: serde_json::Value,
    pub results_sha256: String,
}

/// `executeSettlement` (spec §6.3). Single transaction; re-runs against an
/// already-COMPLETE contest are no-ops by construction (status guard + PK
/// conflict + `NOT EXISTS` on the transition log).
pub async fn execute_settlement(
    db: &Db,
    contest_id: Uuid,
    now: DateTime<Utc>,
) -> Result<SettlementOutcome, SettlementError> {
    let result = db.with_tx(|tx| settle_within_tx(tx, contest_id, now)).await;
    match result {
        Ok(outcome) => Ok(outcome),
        Err(e) => match e.downcast::<SettlementError>() {
            Ok(settlement_error) => Err(settlement_error),
            Err(other) => Err(SettlementError::Fatal(CoreError::InvariantViolation(
                other.to_string(),
            ))),
        },
    }
}

fn settle_within_tx(
    tx: &Transaction<'_>,
    contest_id: Uuid,
    now: DateTime<Utc>,
) -> anyhow::Result<SettlementOutcome> {
    let (status, entry_fee_cents, settlement_strategy_key, payout_structure_json): (
        String,
        i64,
        String,
        String,
    ) = tx
        .query_row(
            "SELECT ci.status, ci.entry_fee_cents, ct.settlement_strategy_key, ci.payout_structure
             FROM contest_instances ci JOIN contest_templates ct ON ci.template_id = ct.id
             WHERE ci.id = ?1",
            params![contest_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?
        .ok_or_else(|| {
            anyhow::anyhow!(SettlementError::Fatal(CoreError::InvariantViolation(
                format!("contest {contest_id} not found")
            )))
        })?;

    if status != ContestStatus::Live.as_str() {
        return Err(anyhow::anyhow!(SettlementError::NotLive));
    }

    strategy_for(&settlement_strategy_key).map_err(SettlementError::Fatal)?;

    let snapshot: Option<(String, String, String)> = tx
        .query_row(
            "SELECT id, payload, snapshot_hash FROM event_data_snapshots
             WHERE contest_instance_id = ?1 AND provider_final_flag = 1
             ORDER BY rowid DESC LIMIT 1",
            params![contest_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((snapshot_id, payload_json, stored_hash)) = snapshot else {
        return Err(anyhow::anyhow!(SettlementError::MissingSnapshot));
    };

    let payload: serde_json::Value = serde_json::from_str(&payload_json)?;
    let recomputed_hash = hash_canonical(&payload);
    if recomputed_hash != stored_hash {
        return Err(anyhow::anyhow!(SettlementError::Fatal(
            CoreError::InvariantViolation(format!(
                "snapshot {snapshot_id} hash mismatch at settlement time"
            ))
        )));
    }

    let mut participant_stmt = tx.prepare(
        "SELECT user_id FROM contest_participants WHERE contest_instance_id = ?1 ORDER BY user_id",
    )?;
    let participant_ids: Vec<Uuid> = participant_stmt
        .query_map(params![contest_id.to_string()], |row| {
            row.get::<_, String>(0)
        })?
        .filter_map(|r| r.ok())
        .filter_map(|s| Uuid::parse_str(&s).ok())
        .collect();
    drop(participant_stmt);

    let scores = pga::aggregate_scores_from_payload(&payload, &participant_ids)?;
    let ranked = pga::rank_participants(&scores);

    let payout_structure: BTreeMap<String, i64> = serde_json::from_str(&payout_structure_json)?;
    let pool_cents = (participant_ids.len() as i64) * entry_fee_cents;
    let payouts = pga::allocate_payouts(&ranked, &payout_structure, pool_cents);

    let results = json!({
        "rankings": ranked.iter().map(|r| json!({
            "user_id": r.user_id,
            "rank": r.rank,
            "score": r.score,
        })).collect::<Vec<_>>(),
        "payouts": payouts.iter().map(|p| json!({
            "user_id": p.user_id,
            "rank": p.rank,
            "amount_cents": p.amount_cents,
        })).collect::<Vec<_>>(),
    });
    let results_sha256 = hash_canonical(&results);

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO settlement_records (contest_instance_id, snapshot_id, results, results_sha256)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            contest_id.to_string(),
            snapshot_id,
            serde_json::to_string(&canonicalize_json(&results))?,
            results_sha256,
        ],
    )?;
    if inserted == 0 {
        return Err(anyhow::anyhow!(SettlementError::AlreadySettled));
    }

    tx.execute(
        "UPDATE contest_instances SET status = 'COMPLETE', settle_time = ?1 WHERE id = ?2",
        params![now.to_rfc3339(), contest_id.to_string()],
    )?;

    record_transition(
        tx,
        contest_id,
        Some(ContestStatus::Live),
        ContestStatus::Complete,
        TriggerTag::TournamentEndTimeReached,
        "settlement completed",
        now,
    )?;

    info!(%contest_id, %results_sha256, "settlement persisted");

    Ok(SettlementOutcome {
        contest_instance_id: contest_id,
        results,
        results_sha256,
    })
}
