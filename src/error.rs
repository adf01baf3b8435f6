//! Error types for the smokers table.

use thiserror::Error;

use crate::ingredient::Ingredient;

/// Smokers error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A placement named the same ingredient twice
    #[error("ingredient placed twice: {0}")]
    DuplicateIngredient(Ingredient),

    /// An ingredient name outside the fixed set
    #[error("unknown ingredient: {0}")]
    UnknownIngredient(String),

    /// A table invariant would have been broken; this is a synchronization bug
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// A table semaphore was closed while an actor waited on it
    #[error("table closed")]
    TableClosed(#[from] tokio::sync::AcquireError),

    /// An actor or smoking session panicked or was aborted
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for the smokers crate.
pub type Result<T> = std::result::Result<T, Error>;
