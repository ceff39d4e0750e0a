pub mod db;
pub mod models;
mod tables;
mod tokens;

pub use db::{Database, DatabaseError};
pub use tokens::UpdateOutcome;
