// src/error.rs
use thiserror::Error;

use crate::types::ErrorBody;

#[derive(Error, Debug)]
pub enum PaymasterError {
    #[error("Invalid UserOperation: {0}")]
    InvalidUserOperation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaymasterError {
    /// Wire code reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            PaymasterError::InvalidUserOperation(_) => "INVALID_USER_OPERATION",
            PaymasterError::Configuration(_) => "CONFIGURATION_ERROR",
            PaymasterError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured `{code, message}` body. Internal details never leave the process.
    pub fn to_error_body(&self) -> ErrorBody {
        let message = match self {
            PaymasterError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code().to_string(),
            message,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, PaymasterError::InvalidUserOperation(_))
    }
}
