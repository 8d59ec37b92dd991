use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::Signer;
use alloy::transports::http::{Client, Http};
use alloy::transports::{RpcError, TransportErrorKind};
use tokio::time::{sleep, Instant};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

use crate::constants::HTTP_SLEEP_TIME_MS;
use crate::errors::SetupError;
use crate::models::{GasPricing, PreparedTransaction, TxReceipt};
use crate::provider::{BlockTag, ChainProvider, ChainTransaction, ProviderError, WaitError};
use crate::utils::{verify_private_signer, verify_rpc_url};

type HttpProvider = RootProvider<Http<Client>>;

/// `ChainProvider` over a single HTTP JSON-RPC endpoint.
///
/// Transactions are signed locally with the configured key and broadcast raw,
/// so the hash is known even when the node rejects the submission.
#[derive(Debug)]
pub struct HttpChainProvider {
    provider: HttpProvider,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
}

impl HttpChainProvider {
    /// # Errors
    /// * `SetupError::InvalidRpcUrl` - If the RPC URL is not http(s).
    /// * `SetupError::InvalidPrivateSigner` - If the key does not parse.
    pub fn new(rpc_url: &str, chain_id: u64, private_key_hex: &str) -> Result<Self, SetupError> {
        let url = verify_rpc_url(rpc_url)?;
        let signer = verify_private_signer(private_key_hex)?.with_chain_id(Some(chain_id));
        let address = signer.address();

        Ok(Self {
            provider: ProviderBuilder::new().on_http(url),
            wallet: EthereumWallet::from(signer),
            address,
            chain_id,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn build_request(&self, transaction: &PreparedTransaction) -> TransactionRequest {
        let request = TransactionRequest::default()
            .with_from(self.address)
            .with_to(transaction.to)
            .with_input(transaction.data.clone())
            .with_value(transaction.value)
            .with_chain_id(transaction.chain_id)
            .with_nonce(transaction.nonce);

        // Unset limit and price mean the request is only being estimated.
        let request = if transaction.gas_limit > 0 {
            request.with_gas_limit(transaction.gas_limit)
        } else {
            request
        };
        if transaction.pricing.price() == 0 {
            return request;
        }

        match transaction.pricing {
            GasPricing::Legacy { gas_price } => request.with_gas_price(gas_price),
            GasPricing::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => request
                .with_max_fee_per_gas(max_fee_per_gas)
                .with_max_priority_fee_per_gas(max_priority_fee_per_gas),
        }
    }

    fn read_retry_strategy() -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(2)
            .factor(100)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(3)
    }
}

fn provider_error(err: RpcError<TransportErrorKind>) -> ProviderError {
    let code = err.as_error_resp().map(|payload| payload.code);
    let provider_err = ProviderError::new(err.to_string());
    match code {
        Some(code) => provider_err.with_code(code),
        None => provider_err,
    }
}

fn to_receipt(receipt: TransactionReceipt) -> Option<TxReceipt> {
    Some(TxReceipt {
        transaction_hash: receipt.transaction_hash,
        block_number: receipt.block_number?,
        gas_used: u128::from(receipt.gas_used),
        effective_gas_price: receipt.effective_gas_price,
        status: receipt.status(),
    })
}

impl ChainProvider for HttpChainProvider {
    async fn estimate_gas<'a>(
        &'a self,
        transaction: &'a PreparedTransaction,
    ) -> Result<u64, ProviderError> {
        let request = self.build_request(transaction);
        self.provider
            .estimate_gas(&request)
            .await
            .map_err(provider_error)
    }

    async fn get_gas_price(&self) -> Result<u128, ProviderError> {
        Retry::spawn(Self::read_retry_strategy(), || async {
            self.provider.get_gas_price().await.map_err(provider_error)
        })
        .await
    }

    async fn estimate_eip1559_fees(&self) -> Result<GasPricing, ProviderError> {
        let estimation = Retry::spawn(Self::read_retry_strategy(), || async {
            self.provider
                .estimate_eip1559_fees(None)
                .await
                .map_err(provider_error)
        })
        .await?;

        Ok(GasPricing::Eip1559 {
            max_fee_per_gas: estimation.max_fee_per_gas,
            max_priority_fee_per_gas: estimation.max_priority_fee_per_gas,
        })
    }

    async fn get_transaction_count(&self, tag: BlockTag) -> Result<u64, ProviderError> {
        let block = match tag {
            BlockTag::Latest => BlockNumberOrTag::Latest,
            BlockTag::Pending => BlockNumberOrTag::Pending,
        };
        Retry::spawn(Self::read_retry_strategy(), || async {
            self.provider
                .get_transaction_count(self.address)
                .block_id(BlockId::Number(block))
                .await
                .map_err(provider_error)
        })
        .await
    }

    async fn send_transaction<'a>(
        &'a self,
        transaction: &'a PreparedTransaction,
    ) -> Result<B256, ProviderError> {
        let request = self.build_request(transaction);
        let envelope =
            <TransactionRequest as TransactionBuilder<Ethereum>>::build(request, &self.wallet)
                .await
                .map_err(|err| ProviderError::new(format!("failed to sign transaction: {err}")))?;
        let hash = *envelope.tx_hash();

        debug!(%hash, nonce = transaction.nonce, "Broadcasting transaction");

        self.provider
            .send_raw_transaction(&envelope.encoded_2718())
            .await
            .map_err(|err| provider_error(err).with_hash(hash))?;

        Ok(hash)
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<ChainTransaction>, ProviderError> {
        let transaction = Retry::spawn(Self::read_retry_strategy(), || async {
            self.provider
                .get_transaction_by_hash(hash)
                .await
                .map_err(provider_error)
        })
        .await?;

        Ok(transaction.map(|transaction| ChainTransaction {
            hash,
            block_number: transaction.block_number,
        }))
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ProviderError> {
        let receipt = Retry::spawn(Self::read_retry_strategy(), || async {
            self.provider
                .get_transaction_receipt(hash)
                .await
                .map_err(provider_error)
        })
        .await?;

        Ok(receipt.and_then(to_receipt))
    }

    async fn wait_for_confirmations(
        &self,
        hash: B256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<TxReceipt, WaitError> {
        // No deadline at all when the timeout is beyond the clock's range.
        let deadline = Instant::now().checked_add(timeout);

        loop {
            match self.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => match self.provider.get_block_number().await {
                    Ok(head)
                        if head.saturating_add(1)
                            >= receipt.block_number.saturating_add(confirmations) =>
                    {
                        return Ok(receipt);
                    }
                    Ok(_) => {}
                    Err(err) => warn!(%hash, error = %err, "Failed to fetch block number"),
                },
                Ok(None) => {}
                Err(err) => warn!(%hash, error = %err, "Failed to fetch receipt"),
            }

            let now = Instant::now();
            let mut pause = Duration::from_millis(HTTP_SLEEP_TIME_MS);
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(WaitError::Timeout);
                }
                pause = pause.min(deadline - now);
            }
            sleep(pause).await;
        }
    }
}
