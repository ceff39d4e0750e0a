use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database as RedbDatabase, ReadTransaction, WriteTransaction};
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("token string already exists")]
    DuplicateToken,
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Redb(#[from] redb::Error),
    #[error("Database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
}

pub struct Database {
    db: RedbDatabase,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("qr-login.redb");
        let db = RedbDatabase::create(db_path)?;

        // Create tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TOKENS)?;
            let _ = write_txn.open_table(TOKEN_IDS)?;
            let _ = write_txn.open_table(TOKEN_EXPIRY)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction.
    ///
    /// redb admits one writer at a time; every conditional state update runs
    /// its read-compare-write inside a single write transaction, which is
    /// what makes it a true compare-and-swap.
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }
}

/// Build an expiration index key: zero-padded millis timestamp + token.
///
/// Lexicographic order over these keys equals chronological order over
/// expiry deadlines, so range iteration visits soonest-expiring rows first.
pub fn expiry_key(expires_at: &DateTime<Utc>, token: &str) -> String {
    format!("{:020}:{token}", expires_at.timestamp_millis())
}

/// Parse the millis timestamp back out of an expiration index key.
pub fn expiry_key_ms(key: &str) -> Option<i64> {
    key.split(':').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_key_orders_chronologically() {
        let early = Utc::now();
        let late = early + chrono::Duration::minutes(5);
        let k1 = expiry_key(&early, "zzz");
        let k2 = expiry_key(&late, "aaa");
        assert!(k1 < k2);
    }

    #[test]
    fn test_expiry_key_roundtrip() {
        let now = Utc::now();
        let key = expiry_key(&now, "abc123");
        assert_eq!(expiry_key_ms(&key), Some(now.timestamp_millis()));
    }

    #[test]
    fn test_expiry_key_ms_rejects_garbage() {
        assert_eq!(expiry_key_ms("not-a-key"), None);
    }
}
