pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod expander;
pub mod ingestion;
pub mod normalizer;
pub mod pipeline;
pub mod resolver;
pub mod snapshot;
pub mod successor;
pub mod types;
pub mod upsert;
