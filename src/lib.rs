//! Contest Core
//!
//! Library surface for the contest lifecycle state machine, settlement
//! engine, wallet ledger, and discovery cascade. `main.rs` is a thin worker
//! boot that wires these modules together; everything else lives here so
//! it can be exercised directly from tests.

pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod join;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod settlement;
pub mod transition_log;
