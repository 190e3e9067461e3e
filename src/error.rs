use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Fetch of '{table}' timed out after {seconds}s")]
    Timeout { table: &'static str, seconds: u64 },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
