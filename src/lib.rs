//! qr-login - A scan-to-login token service
//!
//! This crate provides single-use login tokens for QR scan-to-login flows:
//! - Opaque high-entropy token generation with device tracking
//! - A closed lifecycle state machine (pending/claimed/consumed/expired/
//!   cancelled) with at-most-once consumption, enforced by conditional
//!   updates at the storage layer
//! - redb embedded database (ACID, MVCC, crash-safe) as the source of truth
//! - A read-through snapshot cache for the status polling hot path
//! - Lazy expiry on read plus a background sweep/cleanup task
//! - REST API

pub mod api;
pub mod cache;
pub mod config;
pub mod device;
pub mod expiration;
pub mod identity;
pub mod login_url;
pub mod state_machine;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use std::sync::Arc;

use config::Config;
use identity::CredentialValidator;
use login_url::LoginUrlEncoder;
use tokens::TokenService;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub credential_validator: Arc<dyn CredentialValidator>,
    pub login_url: Arc<dyn LoginUrlEncoder>,
    pub service: TokenService,
}
