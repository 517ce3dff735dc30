//! Safe transaction executor with fee-escalating retries
//!
//! One execution reads the Safe nonce, asks the Safe for the transaction hash, signs
//! it once, and then submits `execTransaction` until it is accepted, fails with a
//! non-transient error, or the retry budget runs out. The signature covers only the
//! Safe transaction hash, so it stays valid while the network fees are escalated.

use super::classify::{ErrorClassifier, RetryVerdict};
use super::gas::{bump_fees, resolve_fees, FeeOverrides};
use super::signing::{sign_hash, MessageSigner, SafeSignature};
use crate::chain::{FeeDataSource, SafeContract, SafeTransaction};
use crate::config::RetryConfig;
use crate::error::{ExecResult, SafeTxError};

use ethers::types::{Bytes, H256, U256};
use serde::Serialize;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything fixed for the lifetime of one execution
#[derive(Debug, Clone, Serialize)]
pub struct PreparedExecution {
    pub tx: SafeTransaction,
    pub nonce: U256,
    pub tx_hash: H256,
    pub signature: SafeSignature,
    /// `r || s || v`, as passed to `execTransaction`
    pub packed_signature: Bytes,
}

/// Executes Safe transactions authorized by a single owner signature.
///
/// The nonce and hash are read once per execution and never refreshed between
/// attempts. Two concurrent executions against the same Safe will race for the same
/// nonce and the loser fails on-chain; callers that need ordering must serialize
/// executions per Safe themselves.
pub struct SafeExecutor {
    /// Retry policy
    config: RetryConfig,
    /// Decides which submission failures are transient
    classifier: ErrorClassifier,
}

impl SafeExecutor {
    /// Create an executor using the classifier described by `config`
    pub fn new(config: RetryConfig) -> Self {
        let classifier = config.classifier();
        Self { config, classifier }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Sign and submit `tx`, retrying transient failures with escalating fees
    pub async fn execute<S, P, C>(
        &self,
        signer: &S,
        provider: &P,
        contract: &C,
        tx: SafeTransaction,
        overrides: FeeOverrides,
    ) -> ExecResult<H256>
    where
        S: MessageSigner + ?Sized,
        P: FeeDataSource + ?Sized,
        C: SafeContract + ?Sized,
    {
        self.execute_with_cancel(signer, provider, contract, tx, overrides, &CancellationToken::new())
            .await
    }

    /// [`SafeExecutor::execute`] that stops at the next suspension point once `cancel` fires
    pub async fn execute_with_cancel<S, P, C>(
        &self,
        signer: &S,
        provider: &P,
        contract: &C,
        tx: SafeTransaction,
        overrides: FeeOverrides,
        cancel: &CancellationToken,
    ) -> ExecResult<H256>
    where
        S: MessageSigner + ?Sized,
        P: FeeDataSource + ?Sized,
        C: SafeContract + ?Sized,
    {
        let prepared = self.prepare(signer, contract, tx, cancel).await?;
        let overrides = self.resolve_overrides(provider, &overrides, cancel).await?;
        self.submit(contract, &prepared, overrides, cancel).await
    }

    /// Read the nonce, fetch the Safe transaction hash, sign and pack it
    pub async fn prepare<S, C>(
        &self,
        signer: &S,
        contract: &C,
        tx: SafeTransaction,
        cancel: &CancellationToken,
    ) -> ExecResult<PreparedExecution>
    where
        S: MessageSigner + ?Sized,
        C: SafeContract + ?Sized,
    {
        let nonce = until_cancelled(cancel, "nonce", contract.nonce())
            .await?
            .map_err(|source| SafeTxError::Contract { call: "nonce", source })?;

        let tx_hash = until_cancelled(cancel, "transaction hash", contract.get_transaction_hash(&tx, nonce))
            .await?
            .map_err(|source| SafeTxError::Contract {
                call: "getTransactionHash",
                source,
            })?;

        let signature = until_cancelled(cancel, "signing", sign_hash(signer, tx_hash)).await??;
        let packed_signature = signature.pack()?;

        info!(
            "Prepared Safe transaction to {:?} at nonce {} (hash {:?})",
            tx.to, nonce, tx_hash
        );

        Ok(PreparedExecution {
            tx,
            nonce,
            tx_hash,
            signature,
            packed_signature,
        })
    }

    /// Resolve caller overrides against a fresh fee snapshot and fill in the gas limit
    pub async fn resolve_overrides<P>(
        &self,
        provider: &P,
        overrides: &FeeOverrides,
        cancel: &CancellationToken,
    ) -> ExecResult<FeeOverrides>
    where
        P: FeeDataSource + ?Sized,
    {
        let fee_data = until_cancelled(cancel, "fee data", provider.fee_data())
            .await?
            .map_err(SafeTxError::FeeData)?;

        let mut resolved = resolve_fees(overrides, &fee_data, self.config.priority_fee());
        if resolved.gas_limit.is_none() {
            resolved = resolved.with_gas_limit(self.config.default_gas_limit);
        }

        debug!("Resolved fee overrides {:?} from {:?}", resolved, fee_data);
        Ok(resolved)
    }

    /// Submit a prepared execution, escalating fees after each transient failure
    pub async fn submit<C>(
        &self,
        contract: &C,
        prepared: &PreparedExecution,
        overrides: FeeOverrides,
        cancel: &CancellationToken,
    ) -> ExecResult<H256>
    where
        C: SafeContract + ?Sized,
    {
        let max_attempts = self.config.max_retries;
        let mut attempt: u32 = 0;
        let mut overrides = overrides;

        loop {
            debug!(
                "Submitting Safe nonce {} (attempt {}/{}, max fee {:?}, max cost {:?})",
                prepared.nonce,
                attempt + 1,
                max_attempts,
                overrides.max_fee_per_gas,
                overrides.max_cost()
            );

            let result = until_cancelled(
                cancel,
                "submission",
                contract.exec_transaction(&prepared.tx, &prepared.packed_signature, &overrides),
            )
            .await?;

            let err = match result {
                Ok(tx_hash) => {
                    info!(
                        "Transaction sent: {:?} (attempt {}/{})",
                        tx_hash,
                        attempt + 1,
                        max_attempts
                    );
                    return Ok(tx_hash);
                }
                Err(err) => err,
            };

            if self.classifier.classify(&*err) == RetryVerdict::Abort {
                error!("Submission failed with non-retryable error: {}", err);
                return Err(SafeTxError::Submission {
                    attempts: attempt + 1,
                    retryable: false,
                    source: err,
                });
            }

            if attempt + 1 >= max_attempts {
                error!("Submission failed after {} attempts: {}", attempt + 1, err);
                return Err(SafeTxError::Submission {
                    attempts: attempt + 1,
                    retryable: true,
                    source: err,
                });
            }

            overrides = bump_fees(&overrides, self.config.bump_multiplier);
            let delay = self.config.backoff_for(attempt);
            warn!(
                "Retryable submission error (attempt {}/{}): {}; retrying in {:?} with max fee {:?}",
                attempt + 1,
                max_attempts,
                err,
                delay,
                overrides.max_fee_per_gas
            );

            until_cancelled(cancel, "backoff", tokio::time::sleep(delay)).await?;
            attempt += 1;
        }
    }
}

/// Race `fut` against `cancel`
async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    stage: &'static str,
    fut: F,
) -> ExecResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("Execution cancelled during {}", stage);
            Err(SafeTxError::Cancelled { stage })
        }
        out = fut => Ok(out),
    }
}
