//! Shared test helpers — available to all `#[cfg(test)]` modules in the crate.

use chrono::{Duration, Utc};
use tempfile::TempDir;

use crate::config::TokenConfig;
use crate::state_machine::TokenState;
use crate::storage::models::{DeviceInfo, LoginToken};
use crate::storage::Database;
use crate::tokens::TokenService;

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard — the caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A `TokenConfig` suitable for unit tests.
pub fn test_token_config() -> TokenConfig {
    TokenConfig {
        cleanup_batch_size: 100,
        cleanup_interval_seconds: 60,
        retention_seconds: 3600,
        ttl_seconds: 300,
    }
}

/// Build a `TokenService` over a fresh temporary database.
pub fn test_service() -> (TokenService, TempDir) {
    test_service_with(test_token_config())
}

pub fn test_service_with(config: TokenConfig) -> (TokenService, TempDir) {
    let (db, temp_dir) = setup_db();
    (TokenService::new(config, db), temp_dir)
}

/// Create a `LoginToken` row in the given state, expiring 5 minutes out.
///
/// Consumer/claimer/cancellation fields are filled so the row satisfies the
/// state invariants (`consumer_id` set iff `Consumed`, etc.).
pub fn make_token(id: &str, state: TokenState) -> LoginToken {
    let now = Utc::now();
    LoginToken {
        cancelled_at: (state == TokenState::Cancelled).then_some(now),
        claimed_at: (state == TokenState::Claimed).then_some(now),
        claimer_id: (state == TokenState::Claimed).then(|| format!("claimer-{id}")),
        consumed_at: (state == TokenState::Consumed).then_some(now),
        consumer_id: (state == TokenState::Consumed).then(|| format!("consumer-{id}")),
        created_at: now,
        device_info: DeviceInfo::default(),
        expires_at: now + Duration::minutes(5),
        id: id.to_string(),
        ip_address: None,
        state,
        token: format!("tok_{id}"),
    }
}

/// Insert a `Pending` row whose deadline has already passed, bypassing the
/// service's TTL (config validation forbids a zero TTL in production).
pub fn expired_token(service: &TokenService) -> LoginToken {
    let mut row = make_token(&uuid::Uuid::new_v4().to_string(), TokenState::Pending);
    row.token = crate::tokens::generator::generate_hex(32);
    row.expires_at = Utc::now() - Duration::seconds(1);
    service.db().put_token(&row).unwrap();
    row
}
