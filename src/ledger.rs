//! Ledger (C2, spec §4.2).
//!
//! Append-only wallet ledger. The unique constraint on `idempotency_key` is
//! the sole dedup mechanism — callers never "check then insert". A conflict
//! whose stored row disagrees with the request on any field is an invariant
//! violation (hard error, rollback, escalate), not a normal conflict.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::LedgerDirection;

pub const WALLET_REFERENCE_TYPE: &str = "WALLET";

struct ExistingEntry {
    direction: LedgerDirection,
    amount_cents: i64,
    reference_type: String,
    reference_id: String,
}

fn fetch_existing(tx: &Transaction<'_>, idempotency_key: &str) -> Result<Option<ExistingEntry>> {
    let row = tx
        .query_row(
            "SELECT direction, amount_cents, reference_type, reference_id
             FROM ledger WHERE idempotency_key = ?1",
            params![idempotency_key],
            |row| {
                let direction: String = row.get(0)?;
                Ok(ExistingEntry {
                    direction: LedgerDirection::parse(&direction).unwrap_or(LedgerDirection::Debit),
                    amount_cents: row.get(1)?,
                    reference_type: row.get(2)?,
                    reference_id: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Insert a ledger row for `direction`. On unique-key conflict, verifies the
/// existing row matches every field of the request; a mismatch is an
/// invariant violation. Returns the ledger entry id (existing or newly
/// inserted).
fn write_entry(
    tx: &Transaction<'_>,
    entry_type: &str,
    direction: LedgerDirection,
    amount_cents: i64,
    reference_type: &str,
    reference_id: &str,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    if let Some(existing) = fetch_existing(tx, idempotency_key)? {
        if existing.direction == direction
            && existing.amount_cents == amount_cents
            && existing.reference_type == reference_type
            && existing.reference_id == reference_id
        {
            let id: String = tx.query_row(
                "SELECT id FROM ledger WHERE idempotency_key = ?1",
                params![idempotency_key],
                |row| row.get(0),
            )?;
            return Ok(Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()));
        }
        return Err(CoreError::InvariantViolation(format!(
            "ledger idempotency key {idempotency_key} already exists with conflicting fields"
        ))
        .into());
    }

    let id = Uuid::new_v4();
    tx.execute(
        "INSERT INTO ledger
            (id, entry_type, direction, amount_cents, reference_type, reference_id, idempotency_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id.to_string(),
            entry_type,
            direction.as_str(),
            amount_cents,
            reference_type,
            reference_id,
            idempotency_key,
            now.to_rfc3339(),
        ],
    )?;
    Ok(id)
}

pub fn debit(
    tx: &Transaction<'_>,
    entry_type: &str,
    amount_cents: i64,
    reference_type: &str,
    reference_id: &str,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    write_entry(
        tx,
        entry_type,
        LedgerDirection::Debit,
        amount_cents,
        reference_type,
        reference_id,
        idempotency_key,
        now,
    )
}

pub fn credit(
    tx: &Transaction<'_>,
    entry_type: &str,
    amount_cents: i64,
    reference_type: &str,
    reference_id: &str,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    write_entry(
        tx,
        entry_type,
        LedgerDirection::Credit,
        amount_cents,
        reference_type,
        reference_id,
        idempotency_key,
        now,
    )
}

/// `SUM(CREDIT) - SUM(DEBIT)` over `reference_type='WALLET'`,
/// `reference_id=user`. No application-level lock; correct because reads
/// here always coexist with the outer transaction mutex (see `db::Db::with_tx`).
pub fn wallet_balance(tx: &Transaction<'_>, user_id: Uuid) -> Result<i64> {
    let credit: i64 = tx.query_row(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM ledger
         WHERE reference_type = ?1 AND reference_id = ?2 AND direction = 'CREDIT'",
        params![WALLET_REFERENCE_TYPE, user_id.to_string()],
        |row| row.get(0),
    )?;
    let debit: i64 = tx.query_row(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM ledger
         WHERE reference_type = ?1 AND reference_id = ?2 AND direction = 'DEBIT'",
        params![WALLET_REFERENCE_TYPE, user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(credit - debit)
}

pub fn wallet_debit_idempotency_key(contest_id: Uuid, user_id: Uuid) -> String {
    format!("wallet_debit:{contest_id}:{user_id}")
}
