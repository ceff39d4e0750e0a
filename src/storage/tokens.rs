use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use redb::ReadableTable;

use super::db::{expiry_key, expiry_key_ms, Database, DatabaseError};
use super::models::{LoginToken, StateChange};
use super::tables::*;
use crate::state_machine::TokenState;

/// Result of a conditional state update.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The row existed but its state did not match the expectation; carries
    /// the row as observed at write time so the caller can re-map the
    /// failure (e.g. a consume race loser sees the winner's Consumed row).
    Conflict(LoginToken),
    /// No row for this token.
    Missing,
    /// The precondition held and the change was committed.
    Updated(LoginToken),
}

impl Database {
    // ========================================================================
    // Token operations
    // ========================================================================

    /// Insert a new token row, failing if the token string already exists.
    ///
    /// Collisions are practically impossible at 32 bytes of entropy; the
    /// service retries generation when one occurs anyway.
    pub fn put_token(&self, row: &LoginToken) -> Result<(), DatabaseError> {
        debug_assert!(!row.token.is_empty(), "token must not be empty");
        debug_assert!(!row.id.is_empty(), "token id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(TOKENS)?;
            if table.get(row.token.as_str())?.is_some() {
                return Err(DatabaseError::DuplicateToken);
            }
            let data = rmp_serde::to_vec_named(row)?;
            table.insert(row.token.as_str(), data.as_slice())?;

            let mut id_table = write_txn.open_table(TOKEN_IDS)?;
            id_table.insert(row.id.as_str(), row.token.as_str())?;

            let mut expiry_table = write_txn.open_table(TOKEN_EXPIRY)?;
            let ek = expiry_key(&row.expires_at, &row.token);
            expiry_table.insert(ek.as_str(), row.token.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a token row by its secret token value
    pub fn get_token(&self, token: &str) -> Result<Option<LoginToken>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(TOKENS)?;

        match table.get(token)? {
            Some(data) => {
                let row: LoginToken = rmp_serde::from_slice(data.value())?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    /// Get a token row by its UUID (resolves id -> token -> row)
    pub fn get_token_by_id(&self, id: &str) -> Result<Option<LoginToken>, DatabaseError> {
        let token = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(TOKEN_IDS)?;
            match table.get(id)? {
                Some(data) => data.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get_token(&token)
    }

    /// Conditionally transition a token row.
    ///
    /// The read-compare-write runs inside one write transaction; redb's
    /// single-writer model makes this the compare-and-swap that every state
    /// mutation in the system funnels through. The row is updated only if
    /// its state still equals `expected` at write time.
    pub fn update_token_state(
        &self,
        token: &str,
        expected: TokenState,
        change: &StateChange,
    ) -> Result<UpdateOutcome, DatabaseError> {
        let write_txn = self.begin_write()?;

        let current: Option<LoginToken> = {
            let table = write_txn.open_table(TOKENS)?;
            let found = match table.get(token)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            found
        };

        let row = match current {
            Some(row) => row,
            None => return Ok(UpdateOutcome::Missing),
        };

        if row.state != expected {
            return Ok(UpdateOutcome::Conflict(row));
        }

        let updated = change.apply(row);
        {
            let mut table = write_txn.open_table(TOKENS)?;
            let data = rmp_serde::to_vec_named(&updated)?;
            table.insert(token, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(UpdateOutcome::Updated(updated))
    }

    /// Transition Pending/Claimed rows past their deadline to Expired,
    /// walking the expiration index. Bounded by `batch` transitions per call.
    ///
    /// Returns the rows that were expired by this sweep.
    pub fn sweep_expired_tokens(
        &self,
        now: DateTime<Utc>,
        batch: usize,
    ) -> Result<Vec<LoginToken>, DatabaseError> {
        let now_ms = now.timestamp_millis();

        // Phase 1: collect candidate tokens from the ordered expiry index
        let candidates: Vec<String> = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(TOKEN_EXPIRY)?;
            let mut result = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                match expiry_key_ms(key.value()) {
                    Some(ms) if ms <= now_ms => {
                        result.push(value.value().to_string());
                        if result.len() >= batch {
                            break;
                        }
                    }
                    // Index is ordered by expiry; the first future deadline
                    // ends the scan.
                    _ => break,
                }
            }
            result
        };

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Phase 2: each candidate still goes through the conditional update,
        // so a row consumed or cancelled between the phases is left alone.
        let mut swept = Vec::new();
        for token in candidates {
            let row = match self.get_token(&token)? {
                Some(row) => row,
                None => continue,
            };
            if !row.state.is_active() {
                continue;
            }
            if let UpdateOutcome::Updated(updated) =
                self.update_token_state(&token, row.state, &StateChange::expire())?
            {
                swept.push(updated);
            }
        }

        Ok(swept)
    }

    /// Delete rows whose deadline passed at least `retention` ago, bounded
    /// by `batch` rows per call to keep write transactions short.
    ///
    /// Retention is counted from `expires_at`, so a Pending/Claimed row that
    /// is not yet expired is never eligible, and terminal rows stay visible
    /// to status polls until the window lapses.
    ///
    /// Returns the deleted token strings (for cache invalidation).
    pub fn delete_stale_tokens(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
        batch: usize,
    ) -> Result<Vec<String>, DatabaseError> {
        let cutoff_ms = (now - retention).timestamp_millis();

        // Phase 1: read the expiry index to collect stale entries
        let stale: Vec<(String, String)> = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(TOKEN_EXPIRY)?;
            let mut result = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                match expiry_key_ms(key.value()) {
                    Some(ms) if ms <= cutoff_ms => {
                        result.push((key.value().to_string(), value.value().to_string()));
                        if result.len() >= batch {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            result
        };

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        // Phase 2: delete rows and clean up both indexes
        let write_txn = self.begin_write()?;
        let mut deleted = Vec::with_capacity(stale.len());

        for (expiry_key_val, token) in &stale {
            let row: Option<LoginToken> = {
                let table = write_txn.open_table(TOKENS)?;
                let found = match table.get(token.as_str())? {
                    Some(data) => Some(rmp_serde::from_slice(data.value())?),
                    None => None,
                };
                found
            };

            if let Some(row) = row {
                {
                    let mut table = write_txn.open_table(TOKENS)?;
                    table.remove(token.as_str())?;
                }
                {
                    let mut id_table = write_txn.open_table(TOKEN_IDS)?;
                    id_table.remove(row.id.as_str())?;
                }
                deleted.push(token.clone());
            }

            {
                let mut expiry_table = write_txn.open_table(TOKEN_EXPIRY)?;
                expiry_table.remove(expiry_key_val.as_str())?;
            }
        }

        write_txn.commit()?;
        Ok(deleted)
    }

    /// Aggregate row counts per state (full scan; the table holds only
    /// tokens within their retention window).
    pub fn count_tokens_by_state(&self) -> Result<HashMap<TokenState, u64>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(TOKENS)?;

        let mut counts = HashMap::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let row: LoginToken = rmp_serde::from_slice(value.value())?;
            *counts.entry(row.state).or_insert(0) += 1;
        }

        Ok(counts)
    }

    /// Purge all token data - for testing only
    pub fn purge_all(&self) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut purged = 0u64;

        {
            let table = write_txn.open_table(TOKENS)?;
            let keys: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(TOKENS)?;
            for key in keys {
                table.remove(key.as_str())?;
                purged += 1;
            }
        }

        {
            let table = write_txn.open_table(TOKEN_IDS)?;
            let keys: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(TOKEN_IDS)?;
            for key in keys {
                table.remove(key.as_str())?;
            }
        }

        {
            let table = write_txn.open_table(TOKEN_EXPIRY)?;
            let keys: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(TOKEN_EXPIRY)?;
            for key in keys {
                table.remove(key.as_str())?;
            }
        }

        write_txn.commit()?;
        Ok(purged)
    }
}
