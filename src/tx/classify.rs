//! Retry classification of submission errors
//!
//! RPC nodes report transient conditions only as free-form text, so the verdict is
//! a case-insensitive substring match against a table of known phrases.

use std::fmt::Display;

/// Phrases that mark a submission failure as transient
pub const DEFAULT_RETRYABLE_PHRASES: &[&str] = &[
    "replacement fee too low",
    "nonce too low",
    "nonce has already been used",
    "underpriced",
    "timeout",
    "rate limit",
    "transaction was replaced",
    "failed to meet minimum gas price",
];

/// What the executor should do after a failed submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Transient; escalate fees and try again
    Retry,
    /// Give up immediately and surface the error
    Abort,
}

/// Table-driven error classifier
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    /// Lower-cased phrases
    phrases: Vec<String>,
}

impl ErrorClassifier {
    /// Create a classifier from a custom phrase table
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Classify an error by its display text
    pub fn classify<E: Display + ?Sized>(&self, error: &E) -> RetryVerdict {
        self.classify_message(Some(&error.to_string()))
    }

    /// Classify raw message text; a missing or empty message never retries
    pub fn classify_message(&self, message: Option<&str>) -> RetryVerdict {
        let Some(message) = message.filter(|m| !m.is_empty()) else {
            return RetryVerdict::Abort;
        };

        let message = message.to_lowercase();
        if self.phrases.iter().any(|p| message.contains(p.as_str())) {
            RetryVerdict::Retry
        } else {
            RetryVerdict::Abort
        }
    }

    /// Convenience wrapper over [`ErrorClassifier::classify`]
    pub fn is_retryable<E: Display + ?Sized>(&self, error: &E) -> bool {
        self.classify(error) == RetryVerdict::Retry
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RETRYABLE_PHRASES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_case_insensitively() {
        let classifier = ErrorClassifier::default();
        assert!(classifier.is_retryable("Nonce too LOW"));
        assert!(classifier.is_retryable("(code: -32000, message: replacement transaction underpriced)"));
        assert!(classifier.is_retryable("request TIMEOUT after 30s"));
        assert!(classifier.is_retryable("Rate limit exceeded"));
    }

    #[test]
    fn test_unknown_errors_abort() {
        let classifier = ErrorClassifier::default();
        assert!(!classifier.is_retryable("insufficient funds for gas * price + value"));
        assert!(!classifier.is_retryable("execution reverted: GS026"));
        assert_eq!(classifier.classify_message(None), RetryVerdict::Abort);
        assert_eq!(classifier.classify_message(Some("")), RetryVerdict::Abort);
    }

    #[test]
    fn test_every_default_phrase_retries() {
        let classifier = ErrorClassifier::default();
        for phrase in DEFAULT_RETRYABLE_PHRASES {
            let message = format!("rpc error: {}", phrase.to_uppercase());
            assert_eq!(classifier.classify(&message), RetryVerdict::Retry, "{}", phrase);
        }
    }

    #[test]
    fn test_custom_table_replaces_defaults() {
        let classifier = ErrorClassifier::new(["Already Known", ""]);
        assert_eq!(classifier.phrases(), &["already known".to_string()][..]);
        assert!(classifier.is_retryable("tx already known"));
        assert!(!classifier.is_retryable("nonce too low"));
    }

    #[test]
    fn test_classifies_error_values() {
        let err: Box<dyn std::error::Error + Send + Sync> = "transaction was replaced".into();
        assert!(ErrorClassifier::default().is_retryable(&*err));
    }
}
