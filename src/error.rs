use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("no eligible rail for this amount and funding source")]
    NoEligibleRail,
    #[error("payment not found")]
    NotFound,
    #[error("payment has already been submitted to a provider")]
    AlreadySubmitted,
    #[error("concurrent update detected for payment {0}")]
    ConcurrentUpdate(Uuid),
    #[error("store error: {0}")]
    Store(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
