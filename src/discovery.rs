//! Discovery Cascade (C7, spec §4.7).
//!
//! Runs as Phase 1 of discovery processing, before any metadata-freeze or
//! name-update phase: a provider-reported tournament cancellation cascades
//! to every non-terminal contest instance under that template, in a single
//! transaction. Idempotent: a template already CANCELLED short-circuits
//! before touching any instance.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::db::Db;
use crate::models::{ContestStatus, TriggerTag};
use crate::transition_log::record_transition;

#[derive(Debug, Clone, Default)]
pub struct CascadeReport {
    pub template_cancelled: bool,
    pub instances_cancelled: Vec<Uuid>,
}

pub async fn process_discovery_cancellation(
    db: &Db,
    template_id: Uuid,
    now: DateTime<Utc>,
) -> Result<CascadeReport> {
    db.with_tx(|tx| cancel_within_tx(tx, template_id, now))
        .await
}

fn cancel_within_tx(
    tx: &Transaction<'_>,
    template_id: Uuid,
    now: DateTime<Utc>,
) -> Result<CascadeReport> {
    // Step 1: cancel the template itself; zero rows affected means another
    // cascade already handled this template — the whole cascade is
    // idempotent, so we skip the rest.
    let template_changed = tx.execute(
        "UPDATE contest_templates SET status = 'CANCELLED' WHERE id = ?1 AND status <> 'CANCELLED'",
        params![template_id.to_string()],
    )?;
    if template_changed == 0 {
        return Ok(CascadeReport::default());
    }

    // Step 2: cancel every non-terminal instance under this template.
    // RETURNING reflects the post-UPDATE row, but the transition log needs
    // the pre-update status as from_state, so read it first instead.
    let mut pre_stmt = tx.prepare(
        "SELECT id, status FROM contest_instances
         WHERE template_id = ?1 AND status NOT IN ('COMPLETE', 'CANCELLED')",
    )?;
    let pre_rows: Vec<(String, String)> = pre_stmt
        .query_map(params![template_id.to_string()], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .filter_map(|r| r.ok())
        .collect();
    drop(pre_stmt);

    let mut cancelled = Vec::with_capacity(pre_rows.len());
    for (id_str, from_status_str) in pre_rows {
        let id = Uuid::parse_str(&id_str)?;
        let from_status = ContestStatus::parse(&from_status_str);

        tx.execute(
            "UPDATE contest_instances SET status = 'CANCELLED' WHERE id = ?1",
            params![id_str],
        )?;
        record_transition(
            tx,
            id,
            from_status,
            ContestStatus::Cancelled,
            TriggerTag::ProviderTournamentCancelled,
            "provider reported tournament cancelled",
            now,
        )?;
        cancelled.push(id);
    }

    info!(
        %template_id,
        instances_cancelled = cancelled.len(),
        "discovery cascade cancelled template and its non-terminal instances"
    );

    // TODO: decide whether a cascade-level cancellation reason should also
    // be recorded once on the template itself, or only per-instance as
    // done here (spec §9 Open Questions leaves this unresolved).

    Ok(CascadeReport {
        template_cancelled: true,
        instances_cancelled: cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_template_and_instance(
        db: &Db,
        template_id: Uuid,
        instance_id: Uuid,
        status: &str,
    ) {
        db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO contest_templates
                    (id, sport, lock_strategy_key, settlement_strategy_key, min_entry_fee_cents, max_entry_fee_cents, provider_tournament_id, status, name)
                 VALUES (?1, 'PGA', 'time_based_lock_v1', 'pga_standard_v1', 0, 1000000, 'tourney-1', 'ACTIVE', 'test template')",
                params![template_id.to_string()],
            )?;
            tx.execute(
                "INSERT INTO contest_instances
                    (id, template_id, organizer_id, status, entry_fee_cents, max_entries, lock_time, tournament_start_time, tournament_end_time, settle_time, join_token, payout_structure, contest_name)
                 VALUES (?1, ?2, ?3, ?4, 0, NULL, NULL, NULL, NULL, NULL, 'tok', '{}', 'Test Contest')",
                params![instance_id.to_string(), template_id.to_string(), Uuid::new_v4().to_string(), status],
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cascade_cancels_non_terminal_instance() {
        let db = Db::open_in_memory().unwrap();
        let template_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        seed_template_and_instance(&db, template_id, instance_id, "LIVE").await;

        let report = process_discovery_cancellation(&db, template_id, Utc::now())
            .await
            .unwrap();
        assert!(report.template_cancelled);
        assert_eq!(report.instances_cancelled, vec![instance_id]);
    }

    #[tokio::test]
    async fn test_cascade_is_idempotent() {
        let db = Db::open_in_memory().unwrap();
        let template_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        seed_template_and_instance(&db, template_id, instance_id, "LIVE").await;

        process_discovery_cancellation(&db, template_id, Utc::now()).await.unwrap();
        let second = process_discovery_cancellation(&db, template_id, Utc::now())
            .await
            .unwrap();
        assert!(!second.template_cancelled);
        assert!(second.instances_cancelled.is_empty());
    }

    #[tokio::test]
    async fn test_cascade_preserves_complete_contests() {
        let db = Db::open_in_memory().unwrap();
        let template_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        seed_template_and_instance(&db, template_id, instance_id, "COMPLETE").await;

        let report = process_discovery_cancellation(&db, template_id, Utc::now())
            .await
            .unwrap();
        assert!(report.instances_cancelled.is_empty());
    }
}
