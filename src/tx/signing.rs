//! Safe owner signatures over a transaction hash
//!
//! The hash is handed to the signer as an opaque message; the signer applies the
//! `eth_sign` prefix itself. Safe tells such signatures apart from plain ECDSA ones by
//! `v > 30`, so the recovery byte is shifted into `{31, 32}` before packing.

use crate::error::{CallError, ExecResult, SafeTxError};
use crate::packed::encode_packed;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256};
use serde::Serialize;
use tracing::debug;

/// Length of an `r || s || v` signature
pub const SIGNATURE_LEN: usize = 65;

/// Capability that signs arbitrary messages with an owner key
#[async_trait]
pub trait MessageSigner: Send + Sync {
    /// Raw 65-byte `r || s || v` signature over `message`
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, CallError>;

    fn address(&self) -> Address;
}

#[async_trait]
impl MessageSigner for LocalWallet {
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, CallError> {
        let signature = Signer::sign_message(self, message).await?;
        Ok(signature.to_vec())
    }

    fn address(&self) -> Address {
        Signer::address(self)
    }
}

/// Owner signature in the form Safe's `checkSignatures` expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafeSignature {
    pub r: U256,
    pub s: U256,
    pub v: u8,
}

impl SafeSignature {
    /// Split a raw 65-byte signature and normalize its recovery byte
    pub fn from_raw(raw: &[u8]) -> ExecResult<Self> {
        if raw.len() != SIGNATURE_LEN {
            return Err(SafeTxError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LEN,
                raw.len()
            )));
        }

        Ok(Self {
            r: U256::from_big_endian(&raw[..32]),
            s: U256::from_big_endian(&raw[32..64]),
            v: normalize_v(raw[64])?,
        })
    }

    /// Packed `(uint256 r, uint256 s, uint8 v)`
    pub fn pack(&self) -> ExecResult<Bytes> {
        let packed = encode_packed(&[
            ("uint256", Token::Uint(self.r)),
            ("uint256", Token::Uint(self.s)),
            ("uint8", Token::Uint(U256::from(self.v))),
        ])?;
        Ok(Bytes::from(packed))
    }
}

/// Map a recovery id (`0/1`) or legacy `v` (`27/28`) onto Safe's eth_sign range
pub fn normalize_v(v: u8) -> ExecResult<u8> {
    match v {
        0 | 27 => Ok(31),
        1 | 28 => Ok(32),
        other => Err(SafeTxError::InvalidSignature(format!(
            "unexpected recovery byte {}",
            other
        ))),
    }
}

/// Sign a Safe transaction hash
pub async fn sign_hash<S: MessageSigner + ?Sized>(signer: &S, hash: H256) -> ExecResult<SafeSignature> {
    let raw = signer
        .sign_message(hash.as_bytes())
        .await
        .map_err(SafeTxError::Signer)?;

    let signature = SafeSignature::from_raw(&raw)?;
    debug!("Signed hash {:?} as {:?} (v={})", hash, signer.address(), signature.v);
    Ok(signature)
}
