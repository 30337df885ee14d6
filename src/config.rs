//! Application configuration, loaded once at worker boot.
//!
//! `dotenv::dotenv().ok()` followed by `std::env::var(...).unwrap_or_else(...)`
//! per field, read exactly once at startup. No global mutable config state.

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub enable_lifecycle_reconciler: bool,
    pub lifecycle_reconciler_interval_ms: u64,
    /// Test-only gate (spec §9): destructive integration tests must check
    /// this before touching a real database file.
    pub reconciler_test_destructive_ops: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "./contest_core.db".to_string());

        let enable_lifecycle_reconciler = std::env::var("ENABLE_LIFECYCLE_RECONCILER")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let lifecycle_reconciler_interval_ms = std::env::var("LIFECYCLE_RECONCILER_INTERVAL_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .unwrap_or(30_000);

        let reconciler_test_destructive_ops = std::env::var("RECONCILER_TEST_DESTRUCTIVE_OPS")
            .map(|v| v == "1")
            .unwrap_or(false);

        Ok(Self {
            database_path,
            enable_lifecycle_reconciler,
            lifecycle_reconciler_interval_ms,
            reconciler_test_destructive_ops,
        })
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
