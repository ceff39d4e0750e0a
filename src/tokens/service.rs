//! Token service: the public operations over store, cache, and state machine.
//!
//! Every mutation funnels through the store's conditional update; the cache
//! is only ever written as a side effect of a successful store read or
//! write, never consulted to decide a mutation.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::cache::{SnapshotSource, TokenCache, TokenSnapshot};
use crate::config::TokenConfig;
use crate::state_machine::{transition, TokenEvent, TokenState, TransitionError};
use crate::storage::models::{DeviceInfo, LoginToken, StateChange};
use crate::storage::{Database, DatabaseError, UpdateOutcome};

use super::generator::generate_hex;

/// Generation retries before giving up on a collision-free token string.
const MAX_GENERATION_ATTEMPTS: u32 = 3;

/// Conflict re-application attempts when a conditional update races with
/// another writer whose result still permits our event (e.g. a consume that
/// raced with a claim).
const MAX_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token already consumed")]
    AlreadyConsumed,
    #[error("token expired")]
    Expired,
    #[error("invalid transition: {event} from {from}")]
    InvalidTransition { event: TokenEvent, from: TokenState },
    #[error("token not found")]
    NotFound,
    #[error("Storage error: {0}")]
    Store(#[from] DatabaseError),
    #[error("failed to generate a unique token after {0} attempts")]
    TokenGeneration(u32),
}

impl From<TransitionError> for TokenError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::AlreadyConsumed => TokenError::AlreadyConsumed,
            TransitionError::Expired => TokenError::Expired,
            TransitionError::InvalidTransition { event, from } => {
                TokenError::InvalidTransition { event, from }
            }
        }
    }
}

/// Status observed by the desktop polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Cancelled,
    Claimed,
    Consumed,
    Expired,
    NotFound,
    Pending,
}

impl From<TokenState> for TokenStatus {
    fn from(state: TokenState) -> Self {
        match state {
            TokenState::Cancelled => TokenStatus::Cancelled,
            TokenState::Claimed => TokenStatus::Claimed,
            TokenState::Consumed => TokenStatus::Consumed,
            TokenState::Expired => TokenStatus::Expired,
            TokenState::Pending => TokenStatus::Pending,
        }
    }
}

/// Status plus the timestamps a polling client renders.
#[derive(Debug, Clone)]
pub struct TokenStatusView {
    pub claimed_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub status: TokenStatus,
}

impl TokenStatusView {
    fn not_found() -> Self {
        Self {
            claimed_at: None,
            consumed_at: None,
            status: TokenStatus::NotFound,
        }
    }

    fn from_snapshot(snap: &TokenSnapshot) -> Self {
        Self {
            claimed_at: snap.claimed_at,
            consumed_at: snap.consumed_at,
            status: snap.state.into(),
        }
    }
}

/// Orchestrates the token lifecycle over the store and cache.
///
/// Constructed explicitly from configuration and an opened database; holds
/// no ambient state beyond its own cache.
pub struct TokenService {
    cache: TokenCache,
    config: TokenConfig,
    db: Database,
}

impl TokenService {
    pub fn new(config: TokenConfig, db: Database) -> Self {
        Self {
            cache: TokenCache::new(),
            config,
            db,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Issue a new token in `Pending` state and warm the cache.
    ///
    /// Regenerates the token string on a collision; this is the one internal
    /// retry in the system, safe because an insert that never happened has
    /// no side effects.
    pub fn create_token(
        &self,
        device_info: DeviceInfo,
        ip_address: Option<String>,
    ) -> Result<LoginToken, TokenError> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let now = Utc::now();
            let row = LoginToken {
                cancelled_at: None,
                claimed_at: None,
                claimer_id: None,
                consumed_at: None,
                consumer_id: None,
                created_at: now,
                device_info: device_info.clone(),
                expires_at: now + Duration::seconds(self.config.ttl_seconds as i64),
                id: uuid::Uuid::new_v4().to_string(),
                ip_address: ip_address.clone(),
                state: TokenState::Pending,
                token: generate_hex(32),
            };

            match self.db.put_token(&row) {
                Ok(()) => {
                    self.refresh_cache(&row);
                    debug!(id = %row.id, expires_at = %row.expires_at, "Created login token");
                    return Ok(row);
                }
                Err(DatabaseError::DuplicateToken) => {
                    warn!("Token string collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(TokenError::TokenGeneration(MAX_GENERATION_ATTEMPTS))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Status for the desktop polling loop.
    ///
    /// Served from the cache while fresh; falls through to the store on
    /// miss. `Pending`/`Claimed` rows past their deadline are lazily
    /// transitioned to `Expired` on read, so pollers observe `expired`
    /// without waiting for the background sweep.
    pub fn get_status(&self, token: &str) -> Result<TokenStatusView, TokenError> {
        let now = Utc::now();

        if let Some(snap) = self.cache.get(token) {
            // A cached active entry whose deadline has passed must not be
            // served; fall through so the store row gets lazily expired.
            if !(snap.state.is_active() && snap.expires_at <= now) {
                trace!(source = SnapshotSource::Cache.as_str(), "Status served");
                return Ok(TokenStatusView::from_snapshot(&snap));
            }
        }

        let row = match self.db.get_token(token)? {
            Some(row) => row,
            None => return Ok(TokenStatusView::not_found()),
        };

        let row = self.lazily_expire(row, now)?;
        self.refresh_cache(&row);
        trace!(source = SnapshotSource::Store.as_str(), "Status served");
        Ok(TokenStatusView::from_snapshot(&TokenSnapshot::from(&row)))
    }

    /// True iff the token exists, is still awaiting action (`Pending` or
    /// `Claimed`), and has not passed its deadline. A consumed token exists
    /// but is not valid in this sense; status and validity are different
    /// queries.
    pub fn validate_token(&self, token: &str) -> Result<bool, TokenError> {
        let now = Utc::now();

        if let Some(snap) = self.cache.get(token) {
            return Ok(snap.state.is_active() && snap.expires_at > now);
        }

        match self.db.get_token(token)? {
            Some(row) => {
                self.refresh_cache(&row);
                Ok(row.state.is_active() && !row.is_expired_at(now))
            }
            None => Ok(false),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Mark the token as opened by a mobile party. Advisory: a consume may
    /// arrive without a prior claim.
    pub fn claim(&self, token: &str, claimer_id: &str) -> Result<LoginToken, TokenError> {
        let row = self.apply_event(token, TokenEvent::Claim, |now| {
            StateChange::claim(claimer_id.to_string(), now)
        })?;
        debug!(id = %row.id, claimer_id, "Token claimed");
        Ok(row)
    }

    /// Confirm login, binding `consumer_id` to the token. At most one
    /// consume succeeds per token; concurrent losers observe
    /// `AlreadyConsumed`.
    pub fn consume(&self, token: &str, consumer_id: &str) -> Result<LoginToken, TokenError> {
        let row = self.apply_event(token, TokenEvent::Consume, |now| {
            StateChange::consume(consumer_id.to_string(), now)
        })?;
        debug!(id = %row.id, consumer_id, "Token consumed");
        Ok(row)
    }

    /// Explicitly abort the flow. No time guard; cancelling an expired-but-
    /// unswept token is allowed.
    pub fn cancel(&self, token: &str) -> Result<LoginToken, TokenError> {
        let row = self.apply_event(token, TokenEvent::Cancel, StateChange::cancel)?;
        debug!(id = %row.id, "Token cancelled");
        Ok(row)
    }

    /// Load, gate through the pure transition function, and commit via the
    /// store's conditional update.
    ///
    /// On a conflict the observed row is re-evaluated: if the event is still
    /// legal from the observed state (our expectation was merely stale) the
    /// update is re-applied; otherwise the race loser gets the typed error
    /// the observed state dictates.
    fn apply_event(
        &self,
        token: &str,
        event: TokenEvent,
        make_change: impl Fn(DateTime<Utc>) -> StateChange,
    ) -> Result<LoginToken, TokenError> {
        let mut row = self.db.get_token(token)?.ok_or(TokenError::NotFound)?;

        for _ in 0..=MAX_CONFLICT_RETRIES {
            let now = Utc::now();
            let expired = row.is_expired_at(now);

            if let Err(e) = transition(row.state, event, expired) {
                if e == TransitionError::Expired && row.state.is_active() {
                    // The deadline passed before the event landed; persist
                    // the expiry lazily so later reads see it immediately.
                    row = self.lazily_expire(row, now)?;
                    self.refresh_cache(&row);
                }
                return Err(e.into());
            }

            match self
                .db
                .update_token_state(token, row.state, &make_change(now))?
            {
                UpdateOutcome::Updated(updated) => {
                    self.refresh_cache(&updated);
                    return Ok(updated);
                }
                UpdateOutcome::Conflict(observed) => {
                    trace!(
                        event = event.as_str(),
                        observed = observed.state.as_str(),
                        "Conditional update raced, re-evaluating"
                    );
                    row = observed;
                }
                UpdateOutcome::Missing => return Err(TokenError::NotFound),
            }
        }

        // Only reachable if the row keeps changing under us while staying
        // legal for the event, which the state machine's shape rules out
        // beyond a single claim->consume step.
        Err(TokenError::InvalidTransition {
            event,
            from: row.state,
        })
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Transition expired `Pending`/`Claimed` rows to `Expired`, bounded by
    /// `batch`. Invoked by the background cleaner; reads do the same work
    /// lazily, so this only bounds how long unobserved rows stay stale.
    pub fn sweep_expired(&self, batch: usize) -> Result<usize, TokenError> {
        let swept = self.db.sweep_expired_tokens(Utc::now(), batch)?;
        for row in &swept {
            self.refresh_cache(row);
        }
        Ok(swept.len())
    }

    /// Delete rows past the retention window, bounded by `batch` per call.
    /// Returns the number of rows deleted.
    pub fn cleanup(&self, batch: usize) -> Result<usize, TokenError> {
        let retention = Duration::seconds(self.config.retention_seconds as i64);
        let deleted = self.db.delete_stale_tokens(Utc::now(), retention, batch)?;
        for token in &deleted {
            self.cache.invalidate(token);
        }
        if !deleted.is_empty() {
            debug!(count = deleted.len(), "Deleted stale tokens");
        }
        Ok(deleted.len())
    }

    /// Drop cache entries past their deadline.
    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Row counts per state, for the stats endpoint.
    pub fn stats(&self) -> Result<HashMap<TokenState, u64>, TokenError> {
        Ok(self.db.count_tokens_by_state()?)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Persist `Expired` for an active row past its deadline; a lost race
    /// means another writer landed first, and its result wins.
    fn lazily_expire(&self, row: LoginToken, now: DateTime<Utc>) -> Result<LoginToken, TokenError> {
        if !(row.state.is_active() && row.is_expired_at(now)) {
            return Ok(row);
        }
        match self
            .db
            .update_token_state(&row.token, row.state, &StateChange::expire())?
        {
            UpdateOutcome::Updated(updated) => Ok(updated),
            UpdateOutcome::Conflict(observed) => Ok(observed),
            UpdateOutcome::Missing => Err(TokenError::NotFound),
        }
    }

    /// Re-populate the cache from a store row, with the token's remaining
    /// lifetime as the entry ttl (floored at zero, which drops the entry).
    fn refresh_cache(&self, row: &LoginToken) {
        let remaining = (row.expires_at - Utc::now())
            .to_std()
            .unwrap_or(StdDuration::ZERO);
        self.cache.put(&row.token, TokenSnapshot::from(row), remaining);
    }
}
