//! Safe Executor - single-owner Safe multisig transaction submission
//!
//! Signs the Safe transaction hash, packs the owner signature into the layout
//! `execTransaction` expects, resolves EIP-1559 fees and submits with linear backoff
//! and fee escalation on transient RPC failures.

pub mod chain;
pub mod config;
pub mod error;
pub mod packed;
pub mod tx;

pub use chain::{ChainProvider, FeeDataSource, SafeClient, SafeContract, SafeTransaction};
pub use config::{RetryConfig, Settings};
pub use error::{CallError, ExecResult, SafeTxError};
pub use packed::encode_packed;
pub use tx::{FeeOverrides, SafeExecutor};
