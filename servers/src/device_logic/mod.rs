pub mod config;
pub mod http;
pub mod ingestion;
pub mod sweeper;
