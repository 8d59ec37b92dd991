use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, B256};
use tokio::time::{sleep, Instant};

use crate::config::DispatcherConfig;
use crate::models::{GasPricing, PreparedTransaction, TxReceipt, WriteRequest};
use crate::provider::{BlockTag, ChainProvider, ChainTransaction, ProviderError, WaitError};

pub(crate) const CHAIN_ID: u64 = 31337;
pub(crate) const WAIT_POLL_MS: u64 = 100;

/// Config with short timeouts; provider sync effectively off.
pub(crate) fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        chain_id: CHAIN_ID,
        inflight_capacity: 4,
        confirmations_required: 1,
        confirmation_timeout_ms: 5_000,
        gas_bump_percent: 20,
        gas_price_ceiling: None,
        gas_limit_increment_amount: 1_000,
        mine_interval_ms: 2_000,
        confirm_interval_ms: 2_000,
        completion_poll_interval_ms: 500,
        provider_sync_interval_ms: 3_600_000,
        rpc_timeout_ms: 10_000,
        event_capacity: 64,
        ..DispatcherConfig::default()
    }
}

pub(crate) fn write_request(tag: u8) -> WriteRequest {
    WriteRequest::new(Address::repeat_byte(0x11), Bytes::from(vec![tag]), CHAIN_ID)
}

#[derive(Debug)]
struct MockState {
    head: u64,
    latest_count: u64,
    scripted_counts: VecDeque<u64>,
    gas_price: u128,
    estimate: Result<u64, String>,
    send_errors: VecDeque<String>,
    wait_errors: VecDeque<String>,
    auto_mine: bool,
    revert_next_mine: bool,
    blocks_per_poll: u64,
    mempool: HashMap<B256, PreparedTransaction>,
    receipts: HashMap<B256, TxReceipt>,
    withheld: HashSet<B256>,
    replacements: HashMap<B256, (B256, TxReceipt)>,
    sent: Vec<(B256, PreparedTransaction)>,
}

/// In-memory chain for one signer. Clones share state so a test can keep a
/// handle while the dispatcher owns another.
#[derive(Clone, Debug)]
pub(crate) struct MockChainProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockChainProvider {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                head: 100,
                latest_count: 0,
                scripted_counts: VecDeque::new(),
                gas_price: 10,
                estimate: Ok(21_000),
                send_errors: VecDeque::new(),
                wait_errors: VecDeque::new(),
                auto_mine: true,
                revert_next_mine: false,
                blocks_per_poll: 1,
                mempool: HashMap::new(),
                receipts: HashMap::new(),
                withheld: HashSet::new(),
                replacements: HashMap::new(),
                sent: Vec::new(),
            })),
        }
    }

    /// Transactions stay in the pool until `mine_pending`.
    pub(crate) fn manual_mining(self) -> Self {
        self.state.lock().unwrap().auto_mine = false;
        self
    }

    pub(crate) fn set_transaction_count(&self, count: u64) {
        self.state.lock().unwrap().latest_count = count;
    }

    /// Latest counts handed out before falling back to the real one.
    pub(crate) fn script_counts(&self, counts: &[u64]) {
        self.state.lock().unwrap().scripted_counts.extend(counts);
    }

    pub(crate) fn set_gas_price(&self, gas_price: u128) {
        self.state.lock().unwrap().gas_price = gas_price;
    }

    pub(crate) fn fail_estimate(&self, message: &str) {
        self.state.lock().unwrap().estimate = Err(message.to_string());
    }

    /// The next sends fail with these messages, in order.
    pub(crate) fn script_send_errors(&self, messages: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .send_errors
            .extend(messages.iter().map(|m| m.to_string()));
    }

    /// The next waits fail with these messages before looking at the chain.
    pub(crate) fn script_wait_errors(&self, messages: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .wait_errors
            .extend(messages.iter().map(|m| m.to_string()));
    }

    /// Keeps the block number of a mined transaction visible while its
    /// receipt is not served.
    pub(crate) fn withhold_receipt(&self, hash: B256) {
        self.state.lock().unwrap().withheld.insert(hash);
    }

    pub(crate) fn release_receipt(&self, hash: B256) {
        self.state.lock().unwrap().withheld.remove(&hash);
    }

    pub(crate) fn revert_next_mine(&self) {
        self.state.lock().unwrap().revert_next_mine = true;
    }

    /// Stops the head from advancing while confirmations are awaited.
    pub(crate) fn freeze_head(&self) {
        self.state.lock().unwrap().blocks_per_poll = 0;
    }

    /// Mines the most recent pool entry for every nonce.
    pub(crate) fn mine_pending(&self) {
        let mut state = self.state.lock().unwrap();
        let mut latest: HashMap<u64, B256> = HashMap::new();
        for (hash, prepared) in &state.sent {
            if state.mempool.contains_key(hash) {
                latest.insert(prepared.nonce, *hash);
            }
        }
        let mut hashes: Vec<(u64, B256)> = latest.into_iter().collect();
        hashes.sort();
        for (_, hash) in hashes {
            state.mine(hash);
        }
        state.mempool.clear();
    }

    /// Forgets a pooled transaction, as if the node evicted it.
    pub(crate) fn drop_from_pool(&self, hash: B256) {
        self.state.lock().unwrap().mempool.remove(&hash);
    }

    /// Waits on `hash` report `replacement` as mined instead.
    pub(crate) fn replace(&self, hash: B256, replacement: B256) {
        let mut state = self.state.lock().unwrap();
        let block_number = state.head;
        let receipt = TxReceipt {
            transaction_hash: replacement,
            block_number,
            gas_used: 21_000,
            effective_gas_price: state.gas_price,
            status: true,
        };
        state.replacements.insert(hash, (replacement, receipt));
    }

    pub(crate) fn sent(&self) -> Vec<(B256, PreparedTransaction)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub(crate) fn sent_prices(&self) -> Vec<u128> {
        self.sent()
            .iter()
            .map(|(_, prepared)| prepared.pricing.price())
            .collect()
    }

    pub(crate) fn sent_nonces(&self) -> Vec<u64> {
        self.sent().iter().map(|(_, prepared)| prepared.nonce).collect()
    }
}

impl MockState {
    fn mine(&mut self, hash: B256) {
        let Some(prepared) = self
            .mempool
            .remove(&hash)
            .or_else(|| self.sent.iter().find(|(h, _)| *h == hash).map(|(_, p)| p.clone()))
        else {
            return;
        };
        self.head += 1;
        let status = !std::mem::take(&mut self.revert_next_mine);
        self.receipts.insert(
            hash,
            TxReceipt {
                transaction_hash: hash,
                block_number: self.head,
                gas_used: 21_000,
                effective_gas_price: prepared.pricing.price(),
                status,
            },
        );
        self.latest_count = self.latest_count.max(prepared.nonce + 1);
    }
}

fn hash_of(prepared: &PreparedTransaction) -> B256 {
    keccak256(format!(
        "{}:{}:{}:{}:{}",
        prepared.chain_id,
        prepared.nonce,
        prepared.to,
        prepared.data,
        prepared.pricing.price()
    ))
}

impl ChainProvider for MockChainProvider {
    async fn estimate_gas<'a>(
        &'a self,
        _transaction: &'a PreparedTransaction,
    ) -> Result<u64, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .estimate
            .clone()
            .map_err(ProviderError::new)
    }

    async fn get_gas_price(&self) -> Result<u128, ProviderError> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn estimate_eip1559_fees(&self) -> Result<GasPricing, ProviderError> {
        let gas_price = self.state.lock().unwrap().gas_price;
        Ok(GasPricing::Eip1559 {
            max_fee_per_gas: gas_price * 2,
            max_priority_fee_per_gas: 1,
        })
    }

    async fn get_transaction_count(&self, tag: BlockTag) -> Result<u64, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let latest = match state.scripted_counts.pop_front() {
            Some(count) => count,
            None => state.latest_count,
        };
        match tag {
            BlockTag::Latest => Ok(latest),
            BlockTag::Pending => Ok(state
                .mempool
                .values()
                .map(|prepared| prepared.nonce + 1)
                .fold(latest, u64::max)),
        }
    }

    async fn send_transaction<'a>(
        &'a self,
        transaction: &'a PreparedTransaction,
    ) -> Result<B256, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let hash = hash_of(transaction);
        state.sent.push((hash, transaction.clone()));

        if let Some(message) = state.send_errors.pop_front() {
            return Err(ProviderError::new(message).with_hash(hash));
        }
        if state.mempool.contains_key(&hash) || state.receipts.contains_key(&hash) {
            return Err(ProviderError::new("already known").with_hash(hash));
        }

        state.mempool.insert(hash, transaction.clone());
        if state.auto_mine {
            state.mine(hash);
        }
        Ok(hash)
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<ChainTransaction>, ProviderError> {
        let state = self.state.lock().unwrap();
        if let Some(receipt) = state.receipts.get(&hash) {
            return Ok(Some(ChainTransaction {
                hash,
                block_number: Some(receipt.block_number),
            }));
        }
        Ok(state.mempool.contains_key(&hash).then_some(ChainTransaction {
            hash,
            block_number: None,
        }))
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ProviderError> {
        let state = self.state.lock().unwrap();
        if state.withheld.contains(&hash) {
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn wait_for_confirmations(
        &self,
        hash: B256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<TxReceipt, WaitError> {
        let deadline = Instant::now() + timeout;
        if let Some(message) = self.state.lock().unwrap().wait_errors.pop_front() {
            return Err(WaitError::Provider(ProviderError::new(message)));
        }
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some((replacement, receipt)) = state.replacements.get(&hash).cloned() {
                    return Err(WaitError::Replaced {
                        replacement,
                        receipt,
                    });
                }
                let receipt = match state.withheld.contains(&hash) {
                    true => None,
                    false => state.receipts.get(&hash).cloned(),
                };
                if let Some(receipt) = receipt {
                    if state.head + 1 >= receipt.block_number.saturating_add(confirmations) {
                        return Ok(receipt);
                    }
                    let step = state.blocks_per_poll;
                    state.head += step;
                }
            }

            if Instant::now() >= deadline {
                return Err(WaitError::Timeout);
            }
            sleep(Duration::from_millis(WAIT_POLL_MS)).await;
        }
    }
}
