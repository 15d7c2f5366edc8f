// crates/handover-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandoverError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration file is invalid: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Spreadsheet archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input file is missing required column '{0}'")]
    MissingColumn(String),

    #[error("{} portfolio ID(s) were not found in the reference table: {}", .0.len(), .0.join(", "))]
    UnresolvedPortfolios(Vec<String>),

    #[error("Live Index rows with invalid Portfolio ID fields: {0}")]
    LiveIndexIdentifiers(String),

    #[error("Value could not be coerced for the destination table: {0}")]
    Coercion(String),

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, HandoverError>;
