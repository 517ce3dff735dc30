//! Chain provider: fee data snapshots and receipt polling

use crate::error::{CallError, ExecResult, SafeTxError};
use crate::tx::gas::FeeData;

use async_trait::async_trait;
use ethers::providers::Middleware;
use ethers::types::{BlockNumber, TransactionReceipt, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Priority fee assumed when deriving EIP-1559 fees from the latest base fee (1.5 gwei)
pub const DEFAULT_PRIORITY_FEE_WEI: u64 = 1_500_000_000;

/// Capability that reports the network's current fee suggestion
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeDataSource: Send + Sync {
    async fn fee_data(&self) -> Result<FeeData, CallError>;
}

/// Build a fee snapshot the way wallets do: `max_fee = 2 * base_fee + priority_fee`
pub fn fee_data_from(gas_price: Option<U256>, base_fee: Option<U256>) -> FeeData {
    match base_fee {
        Some(base_fee) => {
            let priority = U256::from(DEFAULT_PRIORITY_FEE_WEI);
            FeeData {
                gas_price,
                max_fee_per_gas: Some(base_fee.saturating_mul(U256::from(2)).saturating_add(priority)),
                max_priority_fee_per_gas: Some(priority),
            }
        }
        None => FeeData {
            gas_price,
            ..FeeData::default()
        },
    }
}

/// RPC-backed provider for one chain
pub struct ChainProvider<M> {
    /// Underlying middleware
    client: Arc<M>,
    /// Chain ID, for logging
    chain_id: u64,
}

impl<M: Middleware + 'static> ChainProvider<M> {
    pub fn new(client: Arc<M>, chain_id: u64) -> Self {
        Self { client, chain_id }
    }

    pub fn client(&self) -> Arc<M> {
        self.client.clone()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Poll for a transaction receipt until it appears, `timeout` elapses, or `cancel` fires
    pub async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        timeout: Duration,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> ExecResult<TransactionReceipt> {
        let poll = async {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                match self.client.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return Ok::<_, SafeTxError>(receipt),
                    Ok(None) => debug!("Receipt for {:?} not yet available on chain {}", tx_hash, self.chain_id),
                    Err(e) => warn!("Failed to fetch receipt for {:?} on chain {}: {}", tx_hash, self.chain_id, e),
                }
            }
        };

        let receipt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SafeTxError::Cancelled { stage: "receipt" }),
            res = tokio::time::timeout(timeout, poll) => match res {
                Ok(receipt) => receipt?,
                Err(_) => {
                    return Err(SafeTxError::Timeout {
                        operation: format!("receipt of {:?}", tx_hash),
                    })
                }
            },
        };

        info!(
            "Transaction {:?} mined in block {:?} (status {:?}, gas used {:?})",
            tx_hash, receipt.block_number, receipt.status, receipt.gas_used
        );
        Ok(receipt)
    }
}

#[async_trait]
impl<M: Middleware + 'static> FeeDataSource for ChainProvider<M> {
    async fn fee_data(&self) -> Result<FeeData, CallError> {
        let gas_price = self.client.get_gas_price().await?;
        let block = self.client.get_block(BlockNumber::Latest).await?;
        let fee_data = fee_data_from(Some(gas_price), block.and_then(|b| b.base_fee_per_gas));

        debug!("Fee data for chain {}: {:?}", self.chain_id, fee_data);
        Ok(fee_data)
    }
}
