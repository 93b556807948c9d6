use thiserror::Error;

use crate::store::StoreError;
use crate::types::{LoanId, LoanStatus};

#[derive(Error, Debug)]
pub enum LedgerError {
    /// malformed or out-of-range input, detected before any write
    #[error("validation failed: {message}")]
    Validation {
        message: String,
    },

    #[error("loan not found: {id}")]
    NotFound {
        id: LoanId,
    },

    #[error("loan {id} is not active: current status is {status}")]
    InvalidState {
        id: LoanId,
        status: LoanStatus,
    },

    #[error("persistence error: {0}")]
    Persistence(StoreError),

    #[error("calculation error: {message}")]
    Calculation {
        message: String,
    },
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
        }
    }

    pub fn calculation(message: impl Into<String>) -> Self {
        LedgerError::Calculation {
            message: message.into(),
        }
    }

    /// coarse classification for callers that translate errors into a
    /// transport response
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation { .. } => ErrorKind::InvalidInput,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::InvalidState { .. } => ErrorKind::InvalidState,
            LedgerError::Persistence(_) | LedgerError::Calculation { .. } => ErrorKind::Storage,
        }
    }

    /// true for an optimistic-concurrency rejection from the store
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Persistence(StoreError::Conflict { .. }))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LoanNotFound { id } => LedgerError::NotFound { id },
            other => LedgerError::Persistence(other),
        }
    }
}

/// error class as seen by an API caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    InvalidState,
    Storage,
}

impl ErrorKind {
    /// http-equivalent status code
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidState => 409,
            ErrorKind::Storage => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
