//! Row types for the tables the realtime pipeline touches.

pub mod chat;
pub mod message;
pub mod user;

use chrono::{DateTime, Utc};

use crate::types::DatabaseError;

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidData(format!("{column}: {e}")))
}
