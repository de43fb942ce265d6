use std::path::PathBuf;

use thiserror::Error;

use crate::pool::PoolStatus;

/// Errors surfaced synchronously by pool operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("operation not allowed while the pool is {status}")]
    IllegalState { status: PoolStatus },
    #[error("task queue is full (capacity: {capacity})")]
    QueueFull { capacity: usize },
}

/// Errors delivered to the submitter through a task's result handle.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The task body panicked; the payload is routed here instead of
    /// unwinding into the worker.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was dropped before it ran (pool terminated with the
    /// handle still outstanding).
    #[error("task was dropped before it ran")]
    Cancelled,
}

/// Errors raised by the configuration store.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config name '{0}': allowed characters are [0-9a-z_.]")]
    InvalidName(String),
    #[error("invalid value for config '{name}': {source}")]
    InvalidValue {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config '{name}' is registered with type {actual}, requested {requested}")]
    TypeMismatch {
        name: String,
        actual: &'static str,
        requested: &'static str,
    },
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
