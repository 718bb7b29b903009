//! # Error Module
//!
//! The single error type returned by every fallible core operation.

use crate::workflow::{CloStatus, WorkflowAction};
use thiserror::Error;

/// Errors produced by the records engine.
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// The record does not exist, or lives in another tenant.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind (e.g. "course").
        kind: &'static str,
        /// Identifier or natural key that was looked up.
        id: String,
    },

    /// The caller is authenticated but lacks the permission.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No valid credentials were presented.
    #[error("authentication required")]
    Unauthenticated,

    /// Uniqueness or referential integrity would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The workflow does not allow this action from the current status.
    #[error("cannot {action} an assessment that is {from}")]
    InvalidTransition {
        /// Status the assessment was in.
        from: CloStatus,
        /// Action that was attempted.
        action: WorkflowAction,
    },

    /// An adapter could not parse or render a file.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// The underlying datastore failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A record could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl RegistrarError {
    /// Shorthand for a [`RegistrarError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`RegistrarError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a [`RegistrarError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Shorthand for a [`RegistrarError::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}

impl From<postcard::Error> for RegistrarError {
    fn from(err: postcard::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<redb::Error> for RegistrarError {
    fn from(err: redb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::DatabaseError> for RegistrarError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for RegistrarError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TableError> for RegistrarError {
    fn from(err: redb::TableError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for RegistrarError {
    fn from(err: redb::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for RegistrarError {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RegistrarError>;
