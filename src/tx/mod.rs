//! Transaction module - signing, fee resolution and submission with retries

pub mod classify;
pub mod executor;
pub mod gas;
pub mod signing;

pub use classify::{ErrorClassifier, RetryVerdict};
pub use executor::{PreparedExecution, SafeExecutor};
pub use gas::{bump_fees, resolve_fees, FeeData, FeeOverrides};
pub use signing::{sign_hash, MessageSigner, SafeSignature};
