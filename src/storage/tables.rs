use redb::TableDefinition;

/// Login tokens: token (secret lookup key) -> LoginToken (msgpack)
pub const TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("tokens");

/// Record ID index: id (UUID) -> token
pub const TOKEN_IDS: TableDefinition<&str, &str> = TableDefinition::new("token_ids");

/// Expiration index: "{expires_at_ms:020}:{token}" -> token.
/// Ordered by expiry, so the sweep and retention cleanup never scan the
/// whole tokens table.
pub const TOKEN_EXPIRY: TableDefinition<&str, &str> = TableDefinition::new("token_expiry");
