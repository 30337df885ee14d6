//! Core data model.
//!
//! Mirrors the entities in the contest platform's data model: templates,
//! contest instances, participants, snapshots, settlement records,
//! transition log entries, ledger entries, and users. Money is always
//! integer cents; timestamps are always `chrono::DateTime<Utc>` supplied by
//! the caller, never read from the system clock inside core logic.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TemplateStatus {
    Active,
    Cancelled,
}

impl TemplateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Active => "ACTIVE",
            TemplateStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(TemplateStatus::Active),
            "CANCELLED" => Some(TemplateStatus::Cancelled),
            _ => None,
        }
    }
}

/// Contest instance lifecycle state. See `spec.md` §3.3 for the transition
/// diagram: SCHEDULED -> LOCKED -> LIVE -> COMPLETE, any non-terminal state
/// -> CANCELLED, LIVE -> ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContestStatus {
    Scheduled,
    Locked,
    Live,
    Complete,
    Cancelled,
    Error,
}

impl ContestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContestStatus::Scheduled => "SCHEDULED",
            ContestStatus::Locked => "LOCKED",
            ContestStatus::Live => "LIVE",
            ContestStatus::Complete => "COMPLETE",
            ContestStatus::Cancelled => "CANCELLED",
            ContestStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SCHEDULED" => Some(ContestStatus::Scheduled),
            "LOCKED" => Some(ContestStatus::Locked),
            "LIVE" => Some(ContestStatus::Live),
            "COMPLETE" => Some(ContestStatus::Complete),
            "CANCELLED" => Some(ContestStatus::Cancelled),
            "ERROR" => Some(ContestStatus::Error),
            _ => None,
        }
    }

    /// COMPLETE and CANCELLED never transition to anything else (invariant 4).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContestStatus::Complete | ContestStatus::Cancelled)
    }
}

/// Machine-readable trigger tags recognized by the transition log (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerTag {
    LockTimeReached,
    TournamentStartTimeReached,
    TournamentEndTimeReached,
    ProviderTournamentCancelled,
    AdminCancel,
    AdminLock,
    AdminErrorMark,
    AdminErrorResolve,
    SettlementFailed,
}

impl TriggerTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerTag::LockTimeReached => "LOCK_TIME_REACHED",
            TriggerTag::TournamentStartTimeReached => "TOURNAMENT_START_TIME_REACHED",
            TriggerTag::TournamentEndTimeReached => "TOURNAMENT_END_TIME_REACHED",
            TriggerTag::ProviderTournamentCancelled => "PROVIDER_TOURNAMENT_CANCELLED",
            TriggerTag::AdminCancel => "ADMIN_CANCEL",
            TriggerTag::AdminLock => "ADMIN_LOCK",
            TriggerTag::AdminErrorMark => "ADMIN_ERROR_MARK",
            TriggerTag::AdminErrorResolve => "ADMIN_ERROR_RESOLVE",
            TriggerTag::SettlementFailed => "SETTLEMENT_FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerDirection {
    Credit,
    Debit,
}

impl LedgerDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerDirection::Credit => "CREDIT",
            LedgerDirection::Debit => "DEBIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREDIT" => Some(LedgerDirection::Credit),
            "DEBIT" => Some(LedgerDirection::Debit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub sport: String,
    pub lock_strategy_key: String,
    pub settlement_strategy_key: String,
    pub min_entry_fee_cents: i64,
    pub max_entry_fee_cents: i64,
    /// Set of payout-structure shapes an instance created from this
    /// template is allowed to use; each entry is a percentage-by-rank map
    /// in the same shape as `ContestInstance::payout_structure`.
    pub allowed_payout_structures: Vec<BTreeMap<String, i64>>,
    pub provider_tournament_id: String,
    pub status: TemplateStatus,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub organizer_id: Uuid,
    pub status: ContestStatus,
    pub entry_fee_cents: i64,
    pub max_entries: Option<i64>,
    pub lock_time: Option<DateTime<Utc>>,
    pub tournament_start_time: Option<DateTime<Utc>>,
    pub tournament_end_time: Option<DateTime<Utc>>,
    pub settle_time: Option<DateTime<Utc>>,
    pub join_token: Option<String>,
    /// Percentage keyed by rank string ("1", "2", ...), integers summing <= 100.
    pub payout_structure: BTreeMap<String, i64>,
    pub contest_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub contest_instance_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDataSnapshot {
    pub id: Uuid,
    pub contest_instance_id: Uuid,
    pub provider_event_id: String,
    pub payload: serde_json::Value,
    pub snapshot_hash: String,
    pub provider_final_flag: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub contest_instance_id: Uuid,
    pub snapshot_id: Uuid,
    pub results: serde_json::Value,
    pub results_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    pub contest_instance_id: Uuid,
    pub from_state: Option<ContestStatus>,
    pub to_state: ContestStatus,
    pub triggered_by: TriggerTag,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntryRow {
    pub id: Uuid,
    pub entry_type: String,
    pub direction: LedgerDirection,
    pub amount_cents: i64,
    pub reference_type: String,
    pub reference_id: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}
