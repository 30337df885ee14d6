//! Storage layer: a single SQLite connection behind an async mutex.
//!
//! `Arc<tokio::sync::Mutex<Connection>>`, WAL pragmas, `CREATE TABLE IF NOT
//! EXISTS`. SQLite has no row-level `FOR UPDATE`; holding this mutex for the
//! duration of a transaction is this crate's stand-in for row-level locking.

use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("open contest-core db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("enable foreign keys")?;
        Self::init_schema(&conn).context("init schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory db")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Hold the connection mutex for the duration of a transaction. This is
    /// the crate's sole "row lock": any operation that must be atomic needs
    /// to happen inside one call to this method, never split across two.
    pub async fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut guard: MutexGuard<'_, Connection> = self.conn.lock().await;
        let tx = guard.transaction().context("begin transaction")?;
        let result = f(&tx);
        match result {
            Ok(value) => {
                tx.commit().context("commit transaction")?;
                Ok(value)
            }
            Err(e) => {
                // rollback happens automatically on drop
                Err(e)
            }
        }
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS contest_templates (
                id TEXT PRIMARY KEY,
                sport TEXT NOT NULL,
                lock_strategy_key TEXT NOT NULL,
                settlement_strategy_key TEXT NOT NULL,
                min_entry_fee_cents INTEGER NOT NULL,
                max_entry_fee_cents INTEGER NOT NULL,
                allowed_payout_structures TEXT NOT NULL DEFAULT '[]',
                provider_tournament_id TEXT NOT NULL,
                status TEXT NOT NULL,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS contest_instances (
                id TEXT PRIMARY KEY,
                template_id TEXT NOT NULL REFERENCES contest_templates(id),
                organizer_id TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_fee_cents INTEGER NOT NULL,
                max_entries INTEGER,
                lock_time TEXT,
                tournament_start_time TEXT,
                tournament_end_time TEXT,
                settle_time TEXT,
                join_token TEXT,
                payout_structure TEXT NOT NULL,
                contest_name TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_contest_instances_template
                ON contest_instances(template_id);
            CREATE INDEX IF NOT EXISTS idx_contest_instances_status
                ON contest_instances(status);

            CREATE TABLE IF NOT EXISTS contest_participants (
                contest_instance_id TEXT NOT NULL REFERENCES contest_instances(id),
                user_id TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                UNIQUE(contest_instance_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS contest_state_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contest_instance_id TEXT NOT NULL,
                from_state TEXT,
                to_state TEXT NOT NULL,
                triggered_by TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transitions_contest
                ON contest_state_transitions(contest_instance_id);

            CREATE TABLE IF NOT EXISTS event_data_snapshots (
                id TEXT PRIMARY KEY,
                contest_instance_id TEXT NOT NULL REFERENCES contest_instances(id),
                provider_event_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                snapshot_hash TEXT NOT NULL,
                provider_final_flag INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_contest
                ON event_data_snapshots(contest_instance_id);

            CREATE TABLE IF NOT EXISTS settlement_records (
                contest_instance_id TEXT PRIMARY KEY,
                snapshot_id TEXT NOT NULL,
                results TEXT NOT NULL,
                results_sha256 TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ledger (
                id TEXT PRIMARY KEY,
                entry_type TEXT NOT NULL,
                direction TEXT NOT NULL,
                amount_cents INTEGER NOT NULL,
                reference_type TEXT NOT NULL,
                reference_id TEXT NOT NULL,
                idempotency_key TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ledger_reference
                ON ledger(reference_type, reference_id);

            -- Immutability guards (spec §4.8). Database-enforced, not
            -- application-enforced: no code path is permitted to bypass them.
            CREATE TRIGGER IF NOT EXISTS prevent_entry_fee_change_after_publish
            BEFORE UPDATE OF entry_fee_cents ON contest_instances
            WHEN OLD.join_token IS NOT NULL AND NEW.entry_fee_cents <> OLD.entry_fee_cents
            BEGIN
                SELECT RAISE(ABORT, 'entry_fee_cents is immutable after publish');
            END;

            CREATE TRIGGER IF NOT EXISTS transitions_no_update
            BEFORE UPDATE ON contest_state_transitions
            BEGIN
                SELECT RAISE(ABORT, 'contest_state_transitions is append-only');
            END;
            CREATE TRIGGER IF NOT EXISTS transitions_no_delete
            BEFORE DELETE ON contest_state_transitions
            BEGIN
                SELECT RAISE(ABORT, 'contest_state_transitions is append-only');
            END;

            CREATE TRIGGER IF NOT EXISTS snapshots_no_update
            BEFORE UPDATE ON event_data_snapshots
            BEGIN
                SELECT RAISE(ABORT, 'event_data_snapshots is immutable');
            END;
            CREATE TRIGGER IF NOT EXISTS snapshots_no_delete
            BEFORE DELETE ON event_data_snapshots
            BEGIN
                SELECT RAISE(ABORT, 'event_data_snapshots is immutable');
            END;

            CREATE TRIGGER IF NOT EXISTS settlement_records_no_update
            BEFORE UPDATE ON settlement_records
            BEGIN
                SELECT RAISE(ABORT, 'settlement_records is immutable after insert');
            END;
            CREATE TRIGGER IF NOT EXISTS settlement_records_no_delete
            BEFORE DELETE ON settlement_records
            BEGIN
                SELECT RAISE(ABORT, 'settlement_records is immutable after insert');
            END;

            CREATE TRIGGER IF NOT EXISTS ledger_no_update
            BEFORE UPDATE ON ledger
            BEGIN
                SELECT RAISE(ABORT, 'ledger is append-only');
            END;
            CREATE TRIGGER IF NOT EXISTS ledger_no_delete
            BEFORE DELETE ON ledger
            BEGIN
                SELECT RAISE(ABORT, 'ledger is append-only');
            END;
            "#,
        )?;
        Ok(())
    }
}
