mod admin;
mod tokens;

pub use admin::{admin_cleanup, admin_purge, admin_stats, health};
pub use tokens::{
    cancel_token, claim_token, consume_token, create_token, get_token_by_id, token_status,
};
