//! The `error` module defines the error types used across `signalhub`.
//!
//! Only failures that the caller can act on are errors: bad arguments,
//! a worker pool that cannot start, or unreadable configuration. Faults
//! raised by individual subscribers are not errors; they are reported per
//! delivery in a `PublishReport`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
