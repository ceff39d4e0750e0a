//! In-process read-through cache for the status polling hot path.
//!
//! The cache holds lightweight snapshots of token state, each with a
//! deadline equal to the token's remaining lifetime at population time. It
//! is an accelerator, never a second source of truth: mutations always go
//! to the store first, and the cache is refreshed (or dropped) afterwards.
//! If the two ever disagree, the store wins.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::state_machine::TokenState;
use crate::storage::models::LoginToken;

/// Where a snapshot was served from. Logged for metrics only; callers never
/// branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Cache,
    Store,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Cache => "cache",
            SnapshotSource::Store => "store",
        }
    }
}

/// The slice of token state a status poll needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSnapshot {
    pub claimed_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub state: TokenState,
}

impl From<&LoginToken> for TokenSnapshot {
    fn from(row: &LoginToken) -> Self {
        Self {
            claimed_at: row.claimed_at,
            consumed_at: row.consumed_at,
            expires_at: row.expires_at,
            state: row.state,
        }
    }
}

struct CacheEntry {
    deadline: Instant,
    snapshot: TokenSnapshot,
}

/// How far along the lifecycle a state is. The lifecycle is monotone
/// (pending -> claimed -> terminal), so a snapshot can never legitimately
/// move backwards; a put that would is a stale read racing a fresher write.
fn progress(state: TokenState) -> u8 {
    match state {
        TokenState::Pending => 0,
        TokenState::Claimed => 1,
        TokenState::Cancelled | TokenState::Consumed | TokenState::Expired => 2,
    }
}

/// Snapshot cache keyed by token string.
#[derive(Default)]
pub struct TokenCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot if present and not past its deadline.
    pub fn get(&self, token: &str) -> Option<TokenSnapshot> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(token)?;
        if entry.deadline <= Instant::now() {
            return None;
        }
        Some(entry.snapshot.clone())
    }

    /// Store a snapshot with the given time-to-live. Zero-ttl puts are
    /// dropped (a token at or past its deadline has nothing cacheable).
    ///
    /// A put never moves a live entry backwards in the lifecycle: a status
    /// poll that loaded a row from the store can race a mutation that lands
    /// between its read and its cache refresh, and the stale refresh must
    /// not shadow the mutation's fresher snapshot.
    pub fn put(&self, token: &str, snapshot: TokenSnapshot, ttl: Duration) {
        if ttl.is_zero() {
            self.invalidate(token);
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = entries.get(token) {
            if existing.deadline > now
                && progress(existing.snapshot.state) > progress(snapshot.state)
            {
                return;
            }
        }
        entries.insert(
            token.to_string(),
            CacheEntry {
                deadline: now + ttl,
                snapshot,
            },
        );
    }

    pub fn invalidate(&self, token: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(token);
    }

    /// Drop entries past their deadline; returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.deadline > now);
        before - entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
