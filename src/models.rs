use alloy::primitives::{Address, Bytes, B256, U256};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

use crate::errors::DispatchError;

pub(crate) type SharedTransaction = Arc<RwLock<OnchainTransaction>>;

/// What the caller wants done on chain. Immutable for the life of the transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub chain_id: u64,
}

impl WriteRequest {
    pub fn new(to: Address, data: Bytes, chain_id: u64) -> Self {
        Self {
            to,
            data,
            value: U256::ZERO,
            chain_id,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GasPricing {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl GasPricing {
    /// The field compared against the ceiling: gas price, or max fee per gas.
    pub fn price(&self) -> u128 {
        match self {
            Self::Legacy { gas_price } => *gas_price,
            Self::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasParams {
    pub pricing: GasPricing,
    pub limit: u64,
}

/// One physical submission of a logical transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub hash: B256,
    pub pricing: GasPricing,
    pub submitted_at: SystemTime,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub submitted: bool,
    pub mined: bool,
    pub confirmed: bool,
    /// Terminal: confirmed to the required depth, or failed.
    pub finished: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub gas_used: u128,
    pub effective_gas_price: u128,
    pub status: bool,
}

/// Everything the provider needs to sign and broadcast one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub pricing: GasPricing,
}

/// One logical transaction and all of its physical submissions.
#[derive(Clone, Debug)]
pub struct OnchainTransaction {
    pub id: String,
    pub correlation_id: String,
    pub request: WriteRequest,
    pub nonce: u64,
    pub gas: GasParams,
    pub submissions: Vec<Submission>,
    pub bumps: usize,
    pub error: Option<DispatchError>,
    pub receipt: Option<TxReceipt>,
    pub created_at: SystemTime,
    pub lifecycle: Lifecycle,
}

impl OnchainTransaction {
    pub(crate) fn new(
        request: WriteRequest,
        correlation_id: &str,
        nonce: u64,
        gas: GasParams,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            correlation_id: correlation_id.to_string(),
            request,
            nonce,
            gas,
            submissions: Vec::new(),
            bumps: 0,
            error: None,
            receipt: None,
            created_at: SystemTime::now(),
            lifecycle: Lifecycle::default(),
        }
    }

    pub(crate) fn shared(self) -> SharedTransaction {
        Arc::new(RwLock::new(self))
    }

    /// Changes the nonce. Refused once anything has been submitted.
    pub(crate) fn set_nonce(&mut self, nonce: u64) -> Result<(), DispatchError> {
        if !self.submissions.is_empty() {
            return Err(DispatchError::TransactionProcessingError(format!(
                "nonce change from {} to {} after submission [{}]",
                self.nonce,
                nonce,
                self.context()
            )));
        }
        self.nonce = nonce;
        Ok(())
    }

    pub(crate) fn prepared(&self) -> PreparedTransaction {
        PreparedTransaction {
            to: self.request.to,
            data: self.request.data.clone(),
            value: self.request.value,
            chain_id: self.request.chain_id,
            nonce: self.nonce,
            gas_limit: self.gas.limit,
            pricing: self.gas.pricing,
        }
    }

    pub(crate) fn record_submission(&mut self, hash: B256) {
        // A provider may report the same hash twice ("already known").
        if self.has_submitted(&hash) {
            return;
        }
        self.submissions.push(Submission {
            hash,
            pricing: self.gas.pricing,
            submitted_at: SystemTime::now(),
        });
        self.lifecycle.submitted = true;
    }

    pub fn hashes(&self) -> Vec<B256> {
        self.submissions.iter().map(|s| s.hash).collect()
    }

    pub fn last_hash(&self) -> Option<B256> {
        self.submissions.last().map(|s| s.hash)
    }

    pub fn has_submitted(&self, hash: &B256) -> bool {
        self.submissions.iter().any(|s| &s.hash == hash)
    }

    pub(crate) fn mark_mined(&mut self, receipt: TxReceipt) {
        self.receipt = Some(receipt);
        self.lifecycle.mined = true;
    }

    pub(crate) fn mark_confirmed(&mut self, receipt: TxReceipt) {
        self.receipt = Some(receipt);
        self.lifecycle.mined = true;
        self.lifecycle.confirmed = true;
        self.lifecycle.finished = true;
    }

    pub(crate) fn fail(&mut self, err: DispatchError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self.lifecycle.finished = true;
    }

    /// Mine loop exit condition.
    pub fn is_settled(&self) -> bool {
        self.lifecycle.mined || self.error.is_some()
    }

    /// Chain id, nonce and attempt hashes, for error messages.
    pub fn context(&self) -> String {
        let hashes = self
            .submissions
            .iter()
            .map(|s| s.hash.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "tx {} chain {} nonce {} attempts [{}] bumps {}",
            self.id, self.request.chain_id, self.nonce, hashes, self.bumps
        )
    }
}

/// Lifecycle notifications. Each carries a snapshot of the transaction.
#[derive(Clone, Debug)]
pub enum DispatchEvent {
    Submitted(OnchainTransaction),
    Mined(OnchainTransaction),
    Confirmed(OnchainTransaction),
    Failed(OnchainTransaction),
}

impl DispatchEvent {
    pub fn transaction(&self) -> &OnchainTransaction {
        match self {
            Self::Submitted(tx) | Self::Mined(tx) | Self::Confirmed(tx) | Self::Failed(tx) => tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction() -> OnchainTransaction {
        OnchainTransaction::new(
            WriteRequest::new(Address::ZERO, Bytes::new(), 31337),
            "corr",
            5,
            GasParams {
                pricing: GasPricing::Legacy { gas_price: 10 },
                limit: 21_000,
            },
        )
    }

    #[test]
    fn test_nonce_locked_after_submission() {
        let mut tx = transaction();
        assert!(tx.set_nonce(6).is_ok());
        assert_eq!(tx.nonce, 6);

        tx.record_submission(B256::repeat_byte(1));
        assert!(tx.lifecycle.submitted);
        assert!(matches!(
            tx.set_nonce(7),
            Err(DispatchError::TransactionProcessingError(_))
        ));
        assert_eq!(tx.nonce, 6);
    }

    #[test]
    fn test_submissions_are_append_only_and_deduplicated() {
        let mut tx = transaction();
        tx.record_submission(B256::repeat_byte(1));
        tx.gas.pricing = GasPricing::Legacy { gas_price: 13 };
        tx.record_submission(B256::repeat_byte(2));
        tx.record_submission(B256::repeat_byte(2));

        assert_eq!(tx.hashes(), vec![B256::repeat_byte(1), B256::repeat_byte(2)]);
        assert_eq!(tx.submissions[1].pricing.price(), 13);
        assert_eq!(tx.last_hash(), Some(B256::repeat_byte(2)));
    }

    #[test]
    fn test_first_error_wins() {
        let mut tx = transaction();
        tx.fail(DispatchError::TransactionBackfilled("first".to_string()));
        tx.fail(DispatchError::Rpc("second".to_string()));

        assert!(tx.is_settled());
        assert!(tx.lifecycle.finished);
        assert_eq!(
            tx.error,
            Some(DispatchError::TransactionBackfilled("first".to_string()))
        );
    }

    #[test]
    fn test_context_mentions_chain_and_nonce() {
        let mut tx = transaction();
        tx.record_submission(B256::repeat_byte(3));
        let context = tx.context();
        assert!(context.contains("chain 31337"));
        assert!(context.contains("nonce 5"));
        assert!(context.contains(&B256::repeat_byte(3).to_string()));
    }
}
