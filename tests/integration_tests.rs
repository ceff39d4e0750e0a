//! End-to-end lifecycle tests

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use qr_login::config::TokenConfig;
use qr_login::state_machine::TokenState;
use qr_login::storage::models::{DeviceInfo, LoginToken};
use qr_login::storage::Database;
use qr_login::tokens::{TokenError, TokenService, TokenStatus};

fn setup_service() -> (TokenService, TempDir) {
    setup_service_with(TokenConfig {
        cleanup_batch_size: 100,
        cleanup_interval_seconds: 60,
        retention_seconds: 3600,
        ttl_seconds: 300,
    })
}

fn setup_service_with(config: TokenConfig) -> (TokenService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (TokenService::new(config, db), temp_dir)
}

/// Insert a Pending row whose deadline already passed (a TTL of zero is
/// rejected by config validation, so the row is built directly).
fn insert_expired_token(service: &TokenService) -> LoginToken {
    let now = Utc::now();
    let row = LoginToken {
        cancelled_at: None,
        claimed_at: None,
        claimer_id: None,
        consumed_at: None,
        consumer_id: None,
        created_at: now - Duration::minutes(10),
        device_info: DeviceInfo::default(),
        expires_at: now - Duration::seconds(1),
        id: uuid::Uuid::new_v4().to_string(),
        ip_address: None,
        state: TokenState::Pending,
        token: format!("{:064x}", rand::random::<u128>()),
    };
    service.db().put_token(&row).unwrap();
    row
}

#[test]
fn test_create_consume_poll_flow() {
    let (service, _temp) = setup_service();

    let row = service.create_token(DeviceInfo::default(), None).unwrap();
    assert_eq!(
        service.get_status(&row.token).unwrap().status,
        TokenStatus::Pending
    );

    service.consume(&row.token, "42").unwrap();

    let view = service.get_status(&row.token).unwrap();
    assert_eq!(view.status, TokenStatus::Consumed);

    let stored = service.db().get_token(&row.token).unwrap().unwrap();
    assert_eq!(stored.consumer_id.as_deref(), Some("42"));
    assert!(stored.consumed_at.is_some());
}

#[test]
fn test_consume_expired_token_fails() {
    let (service, _temp) = setup_service();
    let row = insert_expired_token(&service);

    let err = service.consume(&row.token, "42").unwrap_err();
    assert!(matches!(err, TokenError::Expired));
}

#[test]
fn test_double_consume_keeps_first_consumer() {
    let (service, _temp) = setup_service();
    let row = service.create_token(DeviceInfo::default(), None).unwrap();

    service.consume(&row.token, "1").unwrap();
    let err = service.consume(&row.token, "2").unwrap_err();
    assert!(matches!(err, TokenError::AlreadyConsumed));

    let stored = service.db().get_token(&row.token).unwrap().unwrap();
    assert_eq!(stored.consumer_id.as_deref(), Some("1"));
}

#[test]
fn test_consume_unknown_token_not_found() {
    let (service, _temp) = setup_service();

    let err = service.consume("bogus-token", "1").unwrap_err();
    assert!(matches!(err, TokenError::NotFound));
}

#[test]
fn test_cancel_then_consume_flow() {
    let (service, _temp) = setup_service();
    let row = service.create_token(DeviceInfo::default(), None).unwrap();

    service.cancel(&row.token).unwrap();
    assert_eq!(
        service.get_status(&row.token).unwrap().status,
        TokenStatus::Cancelled
    );

    let err = service.consume(&row.token, "1").unwrap_err();
    assert!(matches!(err, TokenError::InvalidTransition { .. }));
}

#[test]
fn test_at_most_once_consumption_under_concurrency() {
    let (service, _temp) = setup_service();
    let service = Arc::new(service);

    let row = service.create_token(DeviceInfo::default(), None).unwrap();
    let token = row.token.clone();

    let n = 8;
    let results: Vec<Result<(), TokenError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let service = Arc::clone(&service);
                let token = token.clone();
                scope.spawn(move || service.consume(&token, &format!("user-{i}")).map(|_| ()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let already = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(TokenError::AlreadyConsumed) | Err(TokenError::InvalidTransition { .. })
            )
        })
        .count();

    assert_eq!(ok, 1, "exactly one consume must win");
    assert_eq!(already, n - 1, "all losers must see a typed race outcome");

    // The winner's identity is intact.
    let stored = service.db().get_token(&token).unwrap().unwrap();
    assert_eq!(stored.state, TokenState::Consumed);
    assert!(stored.consumer_id.is_some());
}

#[test]
fn test_claim_consume_race_from_two_devices() {
    let (service, _temp) = setup_service();
    let service = Arc::new(service);

    let row = service.create_token(DeviceInfo::default(), None).unwrap();
    let token = row.token.clone();

    // One device claims while another consumes directly; whatever the
    // interleaving, the token ends Consumed with exactly one consumer.
    std::thread::scope(|scope| {
        let s1 = Arc::clone(&service);
        let t1 = token.clone();
        let claimer = scope.spawn(move || s1.claim(&t1, "phone-a"));

        let s2 = Arc::clone(&service);
        let t2 = token.clone();
        let consumer = scope.spawn(move || s2.consume(&t2, "user-b"));

        let _ = claimer.join().unwrap();
        consumer.join().unwrap().unwrap();
    });

    let stored = service.db().get_token(&token).unwrap().unwrap();
    assert_eq!(stored.state, TokenState::Consumed);
    assert_eq!(stored.consumer_id.as_deref(), Some("user-b"));
}

#[test]
fn test_expiry_is_monotone_without_sweep() {
    let (service, _temp) = setup_service();
    let row = insert_expired_token(&service);

    // No background sweep has run; lazy expiry on read must report expired
    // and keep reporting it.
    for _ in 0..3 {
        assert_eq!(
            service.get_status(&row.token).unwrap().status,
            TokenStatus::Expired
        );
    }
}

#[test]
fn test_status_after_mutation_is_never_stale() {
    let (service, _temp) = setup_service();
    let row = service.create_token(DeviceInfo::default(), None).unwrap();

    // Interleave polls (cache-warming reads) with every mutation.
    assert_eq!(
        service.get_status(&row.token).unwrap().status,
        TokenStatus::Pending
    );
    service.claim(&row.token, "phone-1").unwrap();
    assert_eq!(
        service.get_status(&row.token).unwrap().status,
        TokenStatus::Claimed
    );
    service.consume(&row.token, "user-1").unwrap();
    assert_eq!(
        service.get_status(&row.token).unwrap().status,
        TokenStatus::Consumed
    );
}

#[test]
fn test_cleanup_batches_and_retention() {
    let (service, _temp) = setup_service_with(TokenConfig {
        cleanup_batch_size: 100,
        cleanup_interval_seconds: 60,
        retention_seconds: 0,
        ttl_seconds: 300,
    });

    for _ in 0..5 {
        insert_expired_token(&service);
    }
    let live = service.create_token(DeviceInfo::default(), None).unwrap();

    // Batch bound holds per call.
    assert_eq!(service.cleanup(2).unwrap(), 2);
    assert_eq!(service.cleanup(2).unwrap(), 2);
    assert_eq!(service.cleanup(2).unwrap(), 1);
    assert_eq!(service.cleanup(2).unwrap(), 0);

    // Live tokens are untouchable by cleanup.
    assert!(service.db().get_token(&live.token).unwrap().is_some());
    assert!(service.validate_token(&live.token).unwrap());
}

#[test]
fn test_lookup_by_id_matches_token_lookup() {
    let (service, _temp) = setup_service();
    let row = service.create_token(DeviceInfo::default(), None).unwrap();

    // Support tooling records row ids, not the secret token string; the id
    // index must resolve to the same row.
    let by_id = service.db().get_token_by_id(&row.id).unwrap().unwrap();
    assert_eq!(by_id.token, row.token);
    assert_eq!(by_id.id, row.id);

    assert!(service.db().get_token_by_id("missing-id").unwrap().is_none());
}

#[test]
fn test_consumed_token_survives_until_retention_lapses() {
    let (service, _temp) = setup_service();
    let row = service.create_token(DeviceInfo::default(), None).unwrap();
    service.consume(&row.token, "user-1").unwrap();

    // Within the retention window nothing is deleted, so a retried consume
    // still gets the distinguishable answer rather than NotFound.
    assert_eq!(service.cleanup(100).unwrap(), 0);
    let err = service.consume(&row.token, "user-2").unwrap_err();
    assert!(matches!(err, TokenError::AlreadyConsumed));
}
