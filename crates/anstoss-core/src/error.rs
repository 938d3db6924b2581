use thiserror::Error;

/// Fehler der Persistenzschicht.
///
/// `Unavailable` deckt alles ab, was ein Aufrufer nur durch Wiederholen des
/// ganzen Requests beheben kann (Verbindung, Lock, SQL). Die HTTP-Schicht
/// bildet das auf einen 5xx-Status ab.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("invalid reward: {0}")]
    InvalidReward(f64),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
