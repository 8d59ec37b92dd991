use std::fmt;
use std::future::Future;
use std::time::Duration;

use alloy::primitives::B256;

use crate::models::{GasPricing, PreparedTransaction, TxReceipt};

/// Raw error reported by the provider layer, before classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderError {
    pub message: String,
    pub code: Option<i64>,
    /// Hash of the signed transaction, when the provider got as far as signing it.
    pub hash: Option<B256>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            hash: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_hash(mut self, hash: B256) -> Self {
        self.hash = Some(hash);
        self
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Outcome of waiting for confirmations other than success.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitError {
    Timeout,
    /// The awaited hash was superseded by another transaction at the same nonce.
    Replaced {
        replacement: B256,
        receipt: TxReceipt,
    },
    Provider(ProviderError),
}

impl From<ProviderError> for WaitError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Pending,
}

/// A transaction as seen by the node, mined or still in the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: B256,
    pub block_number: Option<u64>,
}

/// The view of the network the dispatcher consumes.
///
/// Implementations own signing and endpoint failover. Every method may be
/// called concurrently from the dispatcher's loops.
pub trait ChainProvider: Send + Sync + 'static {
    fn estimate_gas<'a>(
        &'a self,
        transaction: &'a PreparedTransaction,
    ) -> impl Future<Output = Result<u64, ProviderError>> + Send + 'a;

    fn get_gas_price(&self) -> impl Future<Output = Result<u128, ProviderError>> + Send + '_;

    /// Returns EIP-1559 fees as `GasPricing::Eip1559`.
    fn estimate_eip1559_fees(
        &self,
    ) -> impl Future<Output = Result<GasPricing, ProviderError>> + Send + '_;

    fn get_transaction_count(
        &self,
        tag: BlockTag,
    ) -> impl Future<Output = Result<u64, ProviderError>> + Send + '_;

    /// Signs and broadcasts. Returns the transaction hash.
    fn send_transaction<'a>(
        &'a self,
        transaction: &'a PreparedTransaction,
    ) -> impl Future<Output = Result<B256, ProviderError>> + Send + 'a;

    fn get_transaction(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<ChainTransaction>, ProviderError>> + Send + '_;

    fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TxReceipt>, ProviderError>> + Send + '_;

    /// Waits until `hash` has `confirmations` blocks on top of (and including)
    /// its own block.
    fn wait_for_confirmations(
        &self,
        hash: B256,
        confirmations: u64,
        timeout: Duration,
    ) -> impl Future<Output = Result<TxReceipt, WaitError>> + Send + '_;
}
