//! Parley Database Crate
//!
//! SQLite connection management, the embedded schema migrations, and the
//! repositories the realtime pipeline reads from and writes to.

use parley_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use migrations::run_migrations;

pub use repos::{ChatRepository, MessageRepository, UserRepository};

pub use entities::{
    chat::ChatRecord,
    message::{MessageRecord, NewMessage},
    user::NewUser,
};

pub use types::{errors::DatabaseError, DatabaseResult};

/// Open the pool and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
