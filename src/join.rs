//! Join Service (C6, spec §4.6).
//!
//! `join(db, contest_id, user_id)` is exactly one transaction. The
//! idempotent short-circuit (step 4) must precede any ledger write; the
//! unique constraint on `(contest_instance_id, user_id)` and on
//! `idempotency_key` are what make retries safe, not application checks.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::db::Db;
use crate::error::JoinResult;
use crate::ledger::{self, WALLET_REFERENCE_TYPE};

pub async fn join(db: &Db, contest_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<JoinResult> {
    db.with_tx(|tx| join_within_tx(tx, contest_id, user_id, now))
        .await
}

struct ContestRow {
    status: String,
    lock_time: Option<DateTime<Utc>>,
    max_entries: Option<i64>,
    join_token: Option<String>,
    entry_fee_cents: i64,
}

fn join_within_tx(
    tx: &Transaction<'_>,
    contest_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<JoinResult> {
    // Step 1-2: read the user and contest rows. SQLite has no row-level
    // FOR UPDATE; holding the connection mutex for this transaction's
    // duration (Db::with_tx) is what serializes these reads against
    // concurrent joins.
    let contest: Option<ContestRow> = tx
        .query_row(
            "SELECT status, lock_time, max_entries, join_token, entry_fee_cents
             FROM contest_instances WHERE id = ?1",
            params![contest_id.to_string()],
            |row| {
                let lock_time: Option<String> = row.get(1)?;
                Ok(ContestRow {
                    status: row.get(0)?,
                    lock_time: lock_time.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))),
                    max_entries: row.get(2)?,
                    join_token: row.get(3)?,
                    entry_fee_cents: row.get(4)?,
                })
            },
        )
        .optional()?;

    let Some(contest) = contest else {
        return Ok(JoinResult::ContestNotPublished);
    };

    // Step 3: join_token non-null, status=SCHEDULED, now < lock_time.
    // The time gate is authoritative — status alone never suffices.
    if contest.join_token.is_none() {
        return Ok(JoinResult::ContestNotPublished);
    }
    if contest.status != "SCHEDULED" {
        return Ok(JoinResult::Locked);
    }
    if let Some(lock_time) = contest.lock_time {
        if now >= lock_time {
            return Ok(JoinResult::Locked);
        }
    }

    // Step 4: idempotent short-circuit, must precede any debit.
    if participant_exists(tx, contest_id, user_id)? {
        return Ok(JoinResult::AlreadyJoined);
    }

    // Step 5: capacity check.
    if let Some(max_entries) = contest.max_entries {
        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM contest_participants WHERE contest_instance_id = ?1",
            params![contest_id.to_string()],
            |row| row.get(0),
        )?;
        if count >= max_entries {
            return Ok(JoinResult::ContestFull);
        }
    }

    // Step 6: balance check for paid contests.
    if contest.entry_fee_cents > 0 {
        let balance = ledger::wallet_balance(tx, user_id)?;
        if balance < contest.entry_fee_cents {
            return Ok(JoinResult::InsufficientFunds);
        }
    }

    // Step 7: insert participant, ON CONFLICT DO NOTHING.
    let inserted = tx.execute(
        "INSERT INTO contest_participants (contest_instance_id, user_id, joined_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(contest_instance_id, user_id) DO NOTHING",
        params![contest_id.to_string(), user_id.to_string(), now.to_rfc3339()],
    )?;
    if inserted == 0 {
        // A race: another transaction inserted the participant first, or
        // capacity was exhausted between steps 5 and 7.
        if participant_exists(tx, contest_id, user_id)? {
            return Ok(JoinResult::AlreadyJoined);
        }
        return Ok(JoinResult::ContestFull);
    }

    // Step 8: debit the entry fee. Conflict on the idempotency key with a
    // mismatched request is an invariant violation (handled in ledger::debit).
    if contest.entry_fee_cents > 0 {
        let idempotency_key = ledger::wallet_debit_idempotency_key(contest_id, user_id);
        ledger::debit(
            tx,
            "ENTRY_FEE",
            contest.entry_fee_cents,
            WALLET_REFERENCE_TYPE,
            &user_id.to_string(),
            &idempotency_key,
            now,
        )?;
    }

    Ok(JoinResult::Joined)
}

// TODO: wallet_debit_idempotency_key is `wallet_debit:{contest_id}:{user_id}`,
// which assumes one entry per (contest, user). A multi-entry contest design
// would need an entry ordinal folded into this key (spec §9 Open Questions).

fn participant_exists(tx: &Transaction<'_>, contest_id: Uuid, user_id: Uuid) -> Result<bool> {
    let exists: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM contest_participants WHERE contest_instance_id = ?1 AND user_id = ?2",
            params![contest_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::WALLET_REFERENCE_TYPE as WALLET;

    async fn seed_balance(db: &Db, user_id: Uuid, amount_cents: i64) {
        let now = Utc::now();
        db.with_tx(|tx| {
            ledger::credit(tx, "SEED", amount_cents, WALLET, &user_id.to_string(), "seed:test", now)
        })
        .await
        .unwrap();
    }

    async fn seed_contest(
        db: &Db,
        contest_id: Uuid,
        entry_fee_cents: i64,
        max_entries: Option<i64>,
        lock_time: DateTime<Utc>,
    ) {
        db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO contest_templates
                    (id, sport, lock_strategy_key, settlement_strategy_key, min_entry_fee_cents, max_entry_fee_cents, provider_tournament_id, status, name)
                 VALUES (?1, 'PGA', 'time_based_lock_v1', 'pga_standard_v1', 0, 1000000, 'tourney-1', 'ACTIVE', 'test template')",
                params![Uuid::new_v4().to_string()],
            )?;
            tx.execute(
                "INSERT INTO contest_instances
                    (id, template_id, organizer_id, status, entry_fee_cents, max_entries, lock_time, tournament_start_time, tournament_end_time, settle_time, join_token, payout_structure, contest_name)
                 VALUES (?1, (SELECT id FROM contest_templates LIMIT 1), ?2, 'SCHEDULED', ?3, ?4, ?5, ?5, ?5, NULL, 'tok', '{}', 'Test Contest')",
                params![
                    contest_id.to_string(),
                    Uuid::new_v4().to_string(),
                    entry_fee_cents,
                    max_entries,
                    lock_time.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_join_idempotency_produces_exactly_one_debit() {
        let db = Db::open_in_memory().unwrap();
        let contest_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let lock_time = Utc::now() + chrono::Duration::hours(1);
        seed_contest(&db, contest_id, 5_000, None, lock_time).await;
        seed_balance(&db, user_id, 10_000).await;

        let now = Utc::now();
        let first = join(&db, contest_id, user_id, now).await.unwrap();
        let second = join(&db, contest_id, user_id, now).await.unwrap();

        assert_eq!(first, JoinResult::Joined);
        assert_eq!(second, JoinResult::AlreadyJoined);

        let key = ledger::wallet_debit_idempotency_key(contest_id, user_id);
        let count: i64 = db
            .with_tx(|tx| {
                Ok(tx.query_row(
                    "SELECT COUNT(*) FROM ledger WHERE idempotency_key = ?1",
                    params![key],
                    |r| r.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_join_locked_after_lock_time() {
        let db = Db::open_in_memory().unwrap();
        let contest_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let lock_time = Utc::now() - chrono::Duration::hours(1);
        seed_contest(&db, contest_id, 0, None, lock_time).await;

        let result = join(&db, contest_id, user_id, Utc::now()).await.unwrap();
        assert_eq!(result, JoinResult::Locked);
    }

    #[tokio::test]
    async fn test_join_insufficient_funds() {
        let db = Db::open_in_memory().unwrap();
        let contest_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let lock_time = Utc::now() + chrono::Duration::hours(1);
        seed_contest(&db, contest_id, 5_000, None, lock_time).await;

        let result = join(&db, contest_id, user_id, Utc::now()).await.unwrap();
        assert_eq!(result, JoinResult::InsufficientFunds);
    }

    #[tokio::test]
    async fn test_join_contest_full() {
        let db = Db::open_in_memory().unwrap();
        let contest_id = Uuid::new_v4();
        let lock_time = Utc::now() + chrono::Duration::hours(1);
        seed_contest(&db, contest_id, 0, Some(1), lock_time).await;

        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let now = Utc::now();
        assert_eq!(join(&db, contest_id, u1, now).await.unwrap(), JoinResult::Joined);
        assert_eq!(join(&db, contest_id, u2, now).await.unwrap(), JoinResult::ContestFull);
    }
}
