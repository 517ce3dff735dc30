//! Safe multisig contract binding

use crate::error::CallError;
use crate::tx::gas::FeeOverrides;

use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::{abigen, ContractCall};
use ethers::providers::Middleware;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

abigen!(
    GnosisSafe,
    r#"[
        function nonce() external view returns (uint256)
        function getTransactionHash(address to, uint256 value, bytes data, uint8 operation, uint256 safeTxGas, uint256 baseGas, uint256 gasPrice, address gasToken, address refundReceiver, uint256 _nonce) external view returns (bytes32)
        function execTransaction(address to, uint256 value, bytes data, uint8 operation, uint256 safeTxGas, uint256 baseGas, uint256 gasPrice, address gasToken, address refundReceiver, bytes signatures) external payable returns (bool)
    ]"#
);

/// Safe operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(u8)]
pub enum Operation {
    #[default]
    Call = 0,
    DelegateCall = 1,
}

/// Fields of a Safe transaction, minus the nonce
///
/// Refund-related fields default to zero: the submitting account pays gas itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    /// Refund gas price paid by the Safe, not the network fee
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
}

impl SafeTransaction {
    /// Plain call from the Safe with no value and no refund
    pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::zero(),
            data: data.into(),
            operation: Operation::Call,
            safe_tx_gas: U256::zero(),
            base_gas: U256::zero(),
            gas_price: U256::zero(),
            gas_token: Address::zero(),
            refund_receiver: Address::zero(),
        }
    }
}

/// Capability over a deployed Safe
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SafeContract: Send + Sync {
    /// Current Safe nonce
    async fn nonce(&self) -> Result<U256, CallError>;

    /// Hash the owners must sign for `tx` at `nonce`
    async fn get_transaction_hash(&self, tx: &SafeTransaction, nonce: U256) -> Result<H256, CallError>;

    /// Submit `execTransaction`; returns the network transaction hash
    async fn exec_transaction(
        &self,
        tx: &SafeTransaction,
        signatures: &Bytes,
        overrides: &FeeOverrides,
    ) -> Result<H256, CallError>;
}

/// [`SafeContract`] over an RPC middleware
pub struct SafeClient<M> {
    contract: GnosisSafe<M>,
}

impl<M: Middleware + 'static> SafeClient<M> {
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            contract: GnosisSafe::new(address, client),
        }
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }
}

#[async_trait]
impl<M: Middleware + 'static> SafeContract for SafeClient<M> {
    async fn nonce(&self) -> Result<U256, CallError> {
        Ok(self.contract.nonce().call().await?)
    }

    async fn get_transaction_hash(&self, tx: &SafeTransaction, nonce: U256) -> Result<H256, CallError> {
        let hash = self
            .contract
            .get_transaction_hash(
                tx.to,
                tx.value,
                tx.data.clone(),
                tx.operation as u8,
                tx.safe_tx_gas,
                tx.base_gas,
                tx.gas_price,
                tx.gas_token,
                tx.refund_receiver,
                nonce,
            )
            .call()
            .await?;
        Ok(H256::from(hash))
    }

    async fn exec_transaction(
        &self,
        tx: &SafeTransaction,
        signatures: &Bytes,
        overrides: &FeeOverrides,
    ) -> Result<H256, CallError> {
        let call = self.contract.exec_transaction(
            tx.to,
            tx.value,
            tx.data.clone(),
            tx.operation as u8,
            tx.safe_tx_gas,
            tx.base_gas,
            tx.gas_price,
            tx.gas_token,
            tx.refund_receiver,
            signatures.clone(),
        );
        let call = apply_overrides(call, overrides);

        debug!("Sending execTransaction to Safe {:?}: {:?}", self.address(), call.tx);
        let pending = call.send().await?;
        Ok(pending.tx_hash())
    }
}

/// Attach fee and gas-limit overrides to a contract call
pub fn apply_overrides<M: Middleware, D: Detokenize>(
    mut call: ContractCall<M, D>,
    overrides: &FeeOverrides,
) -> ContractCall<M, D> {
    if let Some(gas_limit) = overrides.gas_limit {
        call = call.gas(gas_limit);
    }

    match (overrides.max_fee_per_gas, overrides.max_priority_fee_per_gas) {
        (Some(max_fee_per_gas), Some(max_priority_fee_per_gas)) => match &mut call.tx {
            TypedTransaction::Eip1559(inner) => {
                inner.max_fee_per_gas = Some(max_fee_per_gas);
                inner.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
            }
            other => {
                other.set_gas_price(max_fee_per_gas);
            }
        },
        _ => {
            if let Some(gas_price) = overrides.gas_price {
                call = call.legacy().gas_price(gas_price);
            }
        }
    }

    call
}
