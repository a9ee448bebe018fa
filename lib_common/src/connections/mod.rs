//! # Connections Module
//!
//! This module handles persistent connections to external services.
//! Currently the PostgreSQL store behind the `EventSink` trait.

/// PostgreSQL connection pooling and the event sink built on it.
pub mod db_postgres;

pub use db_postgres::{DbError, PgEventSink};
