//! Error types for the Moim SDK.

use chrono::NaiveDate;
use moim_core::ReconcileError;
use moim_store::StoreError;
use std::fmt;

/// Error type for SDK operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    /// Document not found.
    DocumentNotFound(String),
    /// The poll's end date has passed.
    ExpiredPoll { poll: String, end_date: NaiveDate },
    /// The client has no usable identity or display name.
    MissingIdentityContext(&'static str),
    /// The engine refused the action.
    Rejected(ReconcileError),
    /// The store refused the read or write.
    Store(StoreError),
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkError::DocumentNotFound(id) => write!(f, "Document not found: {}", id),
            SdkError::ExpiredPoll { poll, end_date } => {
                write!(f, "Poll {} closed after {}", poll, end_date)
            }
            SdkError::MissingIdentityContext(what) => write!(f, "Missing identity context: {}", what),
            SdkError::Rejected(e) => write!(f, "Rejected: {}", e),
            SdkError::Store(e) => write!(f, "Store error: {}", e),
        }
    }
}

impl std::error::Error for SdkError {}

impl From<ReconcileError> for SdkError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::MissingIdentityContext(what) => SdkError::MissingIdentityContext(what),
            other => SdkError::Rejected(other),
        }
    }
}

impl From<StoreError> for SdkError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DocumentNotFound(id) => SdkError::DocumentNotFound(id),
            other => SdkError::Store(other),
        }
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
