//! Reconciler (C4, spec §4.4).
//!
//! Single entry point `reconcile_lifecycle(db, now)`, run in fixed phase
//! order: Phase 1 SCHEDULED->LOCKED, Phase 2 LOCKED->LIVE, Phase 3
//! LIVE->COMPLETE. A contest whose `lock_time` and `tournament_start_time`
//! coincide can traverse SCHEDULED->LOCKED->LIVE in one tick; each phase is
//! state-gated so this is safe. The worker's periodic loop is a plain
//! `tokio::spawn` task driven by a `tokio::time::interval`.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::Db;

use super::primitives::{
    transition_live_to_complete, transition_locked_to_live, transition_scheduled_to_locked,
    TransitionBatch,
};

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub now: DateTime<Utc>,
    pub scheduled_to_locked: TransitionBatch,
    pub locked_to_live: TransitionBatch,
    pub live_to_complete: TransitionBatch,
}

impl ReconcileReport {
    /// Union of per-phase changed ids, preserving multiplicity (spec §6.1).
    pub fn total_changed_ids(&self) -> Vec<Uuid> {
        let mut all = Vec::with_capacity(
            self.scheduled_to_locked.changed_ids.len()
                + self.locked_to_live.changed_ids.len()
                + self.live_to_complete.changed_ids.len(),
        );
        all.extend(self.scheduled_to_locked.changed_ids.iter().copied());
        all.extend(self.locked_to_live.changed_ids.iter().copied());
        all.extend(self.live_to_complete.changed_ids.iter().copied());
        all
    }

    pub fn total_count(&self) -> usize {
        self.scheduled_to_locked.count + self.locked_to_live.count + self.live_to_complete.count
    }
}

/// This is the sole execution authority for the lifecycle primitives — no
/// other caller may invoke them directly (spec §4.4).
pub async fn reconcile_lifecycle(db: &Db, now: DateTime<Utc>) -> Result<ReconcileReport> {
    let scheduled_to_locked = transition_scheduled_to_locked(db, now).await?;
    let locked_to_live = transition_locked_to_live(db, now).await?;
    let live_to_complete = transition_live_to_complete(db, now).await?;

    Ok(ReconcileReport {
        now,
        scheduled_to_locked,
        locked_to_live,
        live_to_complete,
    })
}

/// Starts the periodic reconciler task if `config.enable_lifecycle_reconciler`
/// is set. The worker's only responsibilities are scheduling and failure
/// logging; all correctness lives in the primitives.
pub fn spawn_reconciler_worker(db: Db, config: &Config) -> Option<tokio::task::JoinHandle<()>> {
    if !config.enable_lifecycle_reconciler {
        info!("lifecycle reconciler disabled (ENABLE_LIFECYCLE_RECONCILER is unset)");
        return None;
    }

    let interval_ms = config.lifecycle_reconciler_interval_ms;
    info!(interval_ms, "starting lifecycle reconciler worker");

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = Utc::now();
            match reconcile_lifecycle(&db, now).await {
                Ok(report) => {
                    if report.total_count() > 0 {
                        info!(
                            scheduled_to_locked = report.scheduled_to_locked.count,
                            locked_to_live = report.locked_to_live.count,
                            live_to_complete = report.live_to_complete.count,
                            "reconciler tick applied transitions"
                        );
                    }
                }
                Err(e) => {
                    warn!(error = %e, "reconciler tick failed");
                }
            }
        }
    }))
}
