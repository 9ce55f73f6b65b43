use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Connection failures and operation failures reported by the driver.
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),

    #[error("operation did not terminate within {0:?}")]
    Timeout(Duration),

    #[error("operation completed without producing a value")]
    NoResult,

    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    BsonSer(#[from] mongodb::bson::ser::Error),

    #[error(transparent)]
    BsonDe(#[from] mongodb::bson::de::Error),

    #[error("cannot evaluate expression: {0}")]
    Evaluation(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_no_result(&self) -> bool {
        matches!(self, Self::NoResult)
    }
}
