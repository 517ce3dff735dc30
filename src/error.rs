//! Error types for the Safe executor

use thiserror::Error;

/// Raw error returned by an external capability (RPC client, signer, contract binding).
///
/// These are never rewritten: they are classified and handed back to the caller as-is.
pub type CallError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the executor
#[derive(Error, Debug)]
pub enum SafeTxError {
    #[error("Encoding error: unsupported type {0}")]
    UnsupportedType(String),

    #[error("Encoding error: invalid value for type {ty}: {message}")]
    InvalidValue { ty: String, message: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Contract call {call} failed: {source}")]
    Contract {
        call: &'static str,
        #[source]
        source: CallError,
    },

    #[error("Signer error: {0}")]
    Signer(#[source] CallError),

    #[error("Fee data error: {0}")]
    FeeData(#[source] CallError),

    #[error("Transaction submission failed after {attempts} attempt(s): {source}")]
    Submission {
        attempts: u32,
        retryable: bool,
        #[source]
        source: CallError,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Cancelled during {stage}")]
    Cancelled { stage: &'static str },

    #[error("Wallet error: {0}")]
    Wallet(String),
}

impl SafeTxError {
    /// Raw error from the submission capability, if this is a submission failure
    pub fn submission_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            SafeTxError::Submission { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Errors that point at bad input or a programming mistake rather than the network
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SafeTxError::UnsupportedType(_)
                | SafeTxError::InvalidValue { .. }
                | SafeTxError::InvalidSignature(_)
        )
    }
}

/// Result type for executor operations
pub type ExecResult<T> = Result<T, SafeTxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors() {
        assert!(SafeTxError::UnsupportedType("tuple".into()).is_input_error());
        assert!(SafeTxError::InvalidSignature("short".into()).is_input_error());
        assert!(!SafeTxError::Wallet("No wallet configured. Set PK".into()).is_input_error());
        assert!(!SafeTxError::Cancelled { stage: "backoff" }.is_input_error());
        assert!(!SafeTxError::FeeData("rpc down".into()).is_input_error());
    }

    #[test]
    fn test_submission_source_is_the_raw_error() {
        let err = SafeTxError::Submission {
            attempts: 2,
            retryable: true,
            source: "nonce too low".into(),
        };
        assert_eq!(err.submission_source().map(|e| e.to_string()), Some("nonce too low".to_string()));
        assert!(SafeTxError::Timeout { operation: "receipt".into() }.submission_source().is_none());
    }
}
