use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::TokenState;

/// Device kind detected from User-Agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeviceKind {
    Bot,
    Desktop,
    Mobile,
    Tablet,
    #[default]
    Unknown,
}

/// Information about the device that requested a login token.
/// Captured for audit/device-display only; never consulted for
/// authorization decisions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceInfo {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub kind: DeviceKind,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub raw_user_agent: String,
}

/// A single-use scan-to-login token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginToken {
    /// When the token was cancelled (set iff state is Cancelled)
    pub cancelled_at: Option<DateTime<Utc>>,
    /// When a mobile party claimed the token
    pub claimed_at: Option<DateTime<Utc>>,
    /// Identity of the party that scanned/opened the token
    pub claimer_id: Option<String>,
    /// When login was confirmed (set iff state is Consumed)
    pub consumed_at: Option<DateTime<Utc>>,
    /// External user identity logged in via this token (Some iff Consumed)
    pub consumer_id: Option<String>,
    /// When the token was created
    pub created_at: DateTime<Utc>,
    /// Device that requested the token
    pub device_info: DeviceInfo,
    /// Fixed expiry deadline; no transition extends it
    pub expires_at: DateTime<Utc>,
    /// Non-secret UUID identifier
    pub id: String,
    /// Requesting client IP, audit only
    pub ip_address: Option<String>,
    /// Current lifecycle state
    pub state: TokenState,
    /// Opaque secret token (32-byte hex, the external lookup key)
    pub token: String,
}

impl LoginToken {
    /// Whether the expiry deadline has passed as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Field changes applied alongside a state transition.
///
/// Only the fields relevant to the target state are populated; everything
/// else on the row is left untouched by the conditional update.
#[derive(Debug, Clone, Default)]
pub struct StateChange {
    pub cancelled_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimer_id: Option<String>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumer_id: Option<String>,
    pub new_state: TokenState,
}

impl StateChange {
    pub fn claim(claimer_id: String, at: DateTime<Utc>) -> Self {
        Self {
            claimed_at: Some(at),
            claimer_id: Some(claimer_id),
            new_state: TokenState::Claimed,
            ..Default::default()
        }
    }

    pub fn consume(consumer_id: String, at: DateTime<Utc>) -> Self {
        Self {
            consumed_at: Some(at),
            consumer_id: Some(consumer_id),
            new_state: TokenState::Consumed,
            ..Default::default()
        }
    }

    pub fn cancel(at: DateTime<Utc>) -> Self {
        Self {
            cancelled_at: Some(at),
            new_state: TokenState::Cancelled,
            ..Default::default()
        }
    }

    pub fn expire() -> Self {
        Self {
            new_state: TokenState::Expired,
            ..Default::default()
        }
    }

    /// Apply this change to a row, returning the updated row.
    pub fn apply(&self, mut row: LoginToken) -> LoginToken {
        row.state = self.new_state;
        if self.cancelled_at.is_some() {
            row.cancelled_at = self.cancelled_at;
        }
        if self.claimer_id.is_some() {
            row.claimed_at = self.claimed_at;
            row.claimer_id = self.claimer_id.clone();
        }
        if self.consumer_id.is_some() {
            row.consumed_at = self.consumed_at;
            row.consumer_id = self.consumer_id.clone();
        }
        row
    }
}
