use electra_core::ElectraError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration `{name}` failed: {source}")]
    Migration {
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A row would violate a key or reference constraint.
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ElectraError {
    fn from(err: StoreError) -> Self {
        ElectraError::Storage(err.to_string())
    }
}
