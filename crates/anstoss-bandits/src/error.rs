use anstoss_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BanditError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("epsilon must lie in [0, 1], got {0}")]
    InvalidEpsilon(f64),
    #[error("message pool is empty or has an arm without templates: {0}")]
    EmptyPool(String),
}

pub type Result<T> = std::result::Result<T, BanditError>;
