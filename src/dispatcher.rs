use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::buffer::TransactionBuffer;
use crate::classifier::{classify, classify_estimate, into_fault, Classification};
use crate::config::{DispatcherConfig, FeeMode};
use crate::errors::{DispatchError, NonceFault, RevertCause, SetupError};
use crate::gas::GasEscalator;
use crate::models::{
    DispatchEvent, GasParams, GasPricing, OnchainTransaction, PreparedTransaction,
    SharedTransaction, TxReceipt, WriteRequest,
};
use crate::nonce::{NonceInput, NonceResolver};
use crate::provider::{BlockTag, ChainProvider, ProviderError, WaitError};

/// Nonce bookkeeping for the signer. Guarded by the submission queue lock.
#[derive(Debug)]
struct SignerState {
    local_nonce: u64,
    resolver: NonceResolver,
}

/// What the chain says about a transaction whose wait ran out.
#[derive(Debug)]
enum ChainCheck {
    Mined(TxReceipt),
    /// Included in a block but the receipt is not served yet.
    Confirming,
    /// Sitting in the pool unmined.
    Pending,
    /// Unknown to the node, nonce still open.
    Missing,
    /// Unknown to the node and the nonce is used up.
    Backfilled(u64),
}

/// Submits and tracks transactions for one signer on one chain.
///
/// The `Dispatcher` provides functionality to:
/// - Submit transactions one at a time with locally managed nonces
/// - Recover from nonce collisions and underpriced replacements
/// - Resubmit dropped or stuck transactions, bumping gas when they sit in the pool
/// - Wait for the configured confirmation depth and detect reorg replacements
///
/// It assumes it is the only writer for its signing key.
///
/// # Example
/// ```no_run
/// use alloy::primitives::{Address, Bytes};
/// use txn_dispatcher::{Dispatcher, DispatcherConfig, HttpChainProvider, WriteRequest};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = HttpChainProvider::new(
///     "https://sepolia-rollup.arbitrum.io/rpc",
///     421614,
///     "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef",
/// )?;
/// let dispatcher = Dispatcher::new(provider, DispatcherConfig::for_chain(421614))?;
/// dispatcher.run().await;
///
/// let request = WriteRequest::new(Address::ZERO, Bytes::new(), 421614);
/// let receipt = dispatcher.send(request, "job-42").await?;
/// println!("mined in block {}", receipt.block_number);
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher<P> {
    provider: P,
    config: DispatcherConfig,
    escalator: GasEscalator,
    inflight: TransactionBuffer,
    mined: TransactionBuffer,
    signer: Mutex<SignerState>,
    /// Shifted out of `inflight` and still owned by the mine loop.
    mining: Mutex<Option<SharedTransaction>>,
    events: broadcast::Sender<DispatchEvent>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: ChainProvider> Dispatcher<P> {
    /// Creates a dispatcher. Call [`run`](Self::run) (or just `send`) to start its loops.
    ///
    /// # Errors
    /// * `SetupError::InvalidConfig` - If a capacity, depth, interval or timeout is zero.
    pub fn new(provider: P, config: DispatcherConfig) -> Result<Arc<Self>, SetupError> {
        config.validate()?;

        let escalator = GasEscalator::new(
            u128::from(config.gas_bump_percent),
            config.gas_price_ceiling.map(u128::from),
        );
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Arc::new(Self {
            provider,
            escalator,
            inflight: TransactionBuffer::bounded(config.inflight_capacity),
            mined: TransactionBuffer::unbounded(),
            signer: Mutex::new(SignerState {
                local_nonce: 0,
                resolver: NonceResolver::new(),
            }),
            mining: Mutex::new(None),
            events,
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            config,
        }))
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Lifecycle events for every transaction. Slow receivers lag; the
    /// dispatcher never waits on them.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Next nonce this dispatcher intends to use.
    pub async fn local_nonce(&self) -> u64 {
        self.signer.lock().await.local_nonce
    }

    pub async fn inflight_len(&self) -> usize {
        self.inflight.len().await
    }

    pub async fn mined_len(&self) -> usize {
        self.mined.len().await
    }

    /// Starts the mine, confirm and provider-sync loops. Calling it again is a no-op.
    pub async fn run(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(self.clone().mine_loop()));
        tasks.push(tokio::spawn(self.clone().confirm_loop()));
        tasks.push(tokio::spawn(self.clone().provider_sync_loop()));

        info!(
            chain_id = self.config.chain_id,
            inflight_capacity = self.config.inflight_capacity,
            confirmations = self.config.confirmations_required,
            "Dispatcher running"
        );
    }

    /// Stops the background loops. Transactions already in flight stop being tracked.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.running.store(false, Ordering::SeqCst);
        info!(chain_id = self.config.chain_id, "Dispatcher stopped");
    }

    /// Submits `request` and waits until it is confirmed or fails for good.
    ///
    /// `correlation_id` is carried through logs and events for tracing.
    ///
    /// # Errors
    /// Exactly one `DispatchError`; see the variants for which are recoverable
    /// internally and which reach the caller.
    pub async fn send(
        self: &Arc<Self>,
        request: WriteRequest,
        correlation_id: &str,
    ) -> Result<TxReceipt, DispatchError> {
        self.run().await;

        if request.chain_id != self.config.chain_id {
            return Err(DispatchError::TransactionProcessingError(format!(
                "request for chain {} sent to dispatcher for chain {}",
                request.chain_id, self.config.chain_id
            )));
        }

        let transaction = self.submit(request, correlation_id).await?;
        let settled = self.wait_until_finished(&transaction).await;

        if let Some(err) = &settled.error {
            if !settled.lifecycle.mined {
                self.rewind_nonce(settled.nonce).await;
            }
            return Err(err.clone());
        }

        match &settled.receipt {
            Some(receipt) if settled.lifecycle.confirmed => Ok(receipt.clone()),
            _ => Err(DispatchError::TransactionProcessingError(format!(
                "finished without a confirmed receipt [{}]",
                settled.context()
            ))),
        }
    }

    /// Arm-and-fire under the submission queue: wait for room, estimate, price,
    /// pick a nonce, submit, enqueue.
    async fn submit(
        &self,
        request: WriteRequest,
        correlation_id: &str,
    ) -> Result<SharedTransaction, DispatchError> {
        let mut signer = self.signer.lock().await;

        if self.inflight.is_full().await {
            debug!(
                correlation_id,
                capacity = ?self.inflight.capacity(),
                "Inflight buffer full, waiting for a slot"
            );
        }
        self.inflight.wait_for_slot().await;

        let estimate_request = PreparedTransaction {
            to: request.to,
            data: request.data.clone(),
            value: request.value,
            chain_id: request.chain_id,
            nonce: signer.local_nonce,
            gas_limit: 0,
            pricing: GasPricing::Legacy { gas_price: 0 },
        };
        let (estimated_gas, pricing, transaction_count) = tokio::try_join!(
            self.estimate_gas(&estimate_request),
            self.fetch_pricing(),
            self.transaction_count(BlockTag::Latest),
        )?;

        let local_nonce = signer.local_nonce;
        let mut resolution = signer.resolver.resolve(&NonceInput {
            attempted: &[],
            transaction_count,
            pending_count: None,
            local_nonce,
            fault: None,
        });
        let gas = GasParams {
            pricing,
            limit: estimated_gas.saturating_add(self.config.gas_limit_increment_amount),
        };

        let attempts = self.config.submission_attempts();
        let mut attempted: Vec<u64> = Vec::with_capacity(attempts);
        let mut transaction =
            OnchainTransaction::new(request, correlation_id, resolution.nonce, gas);
        let mut accepted = false;

        for _ in 0..attempts {
            let nonce = resolution.nonce;
            if resolution.backfill {
                info!(
                    correlation_id,
                    nonce,
                    transaction_count = resolution.transaction_count,
                    "Backfilling nonce gap"
                );
            }
            attempted.push(nonce);
            transaction.set_nonce(nonce)?;

            let fault = if self.nonce_in_use(nonce).await {
                debug!(correlation_id, nonce, "Nonce held by a queued transaction");
                NonceFault::Expired
            } else {
                match self.call(self.provider.send_transaction(&transaction.prepared())).await {
                    Ok(hash) => {
                        transaction.record_submission(hash);
                        accepted = true;
                        break;
                    }
                    Err(err) => match classify(&err) {
                        Classification::AlreadyKnown => {
                            let Some(hash) = err.hash else {
                                return Err(DispatchError::TransactionProcessingError(format!(
                                    "provider reported an already known transaction without its hash [{}]",
                                    transaction.context()
                                )));
                            };
                            transaction.record_submission(hash);
                            accepted = true;
                            break;
                        }
                        Classification::Fault(DispatchError::BadNonce(fault, message)) => {
                            warn!(correlation_id, nonce, %fault, error = %message, "Submission rejected for nonce");
                            fault
                        }
                        Classification::Fault(fault) => {
                            let fault = fault.with_context(&transaction.context());
                            error!(correlation_id, nonce, error = %fault, "Submission failed");
                            transaction.fail(fault.clone());
                            self.emit(DispatchEvent::Failed(transaction));
                            return Err(fault);
                        }
                    },
                }
            };

            let (transaction_count, pending_count) = match fault {
                NonceFault::Expired | NonceFault::ReplacementUnderpriced => {
                    let (latest, pending) = tokio::try_join!(
                        self.transaction_count(BlockTag::Latest),
                        self.transaction_count(BlockTag::Pending),
                    )?;
                    (latest, Some(pending))
                }
                NonceFault::Incorrect => (self.transaction_count(BlockTag::Latest).await?, None),
            };
            let local_nonce = signer.local_nonce;
            resolution = signer.resolver.resolve(&NonceInput {
                attempted: &attempted,
                transaction_count,
                pending_count,
                local_nonce,
                fault: Some(fault),
            });
        }

        if !accepted {
            error!(correlation_id, ?attempted, "No submission accepted");
            return Err(DispatchError::InitialSubmitFailure(format!(
                "no submission accepted after {} attempts on chain {}, nonces tried {:?}",
                attempts, self.config.chain_id, attempted
            )));
        }

        let nonce = transaction.nonce;
        let snapshot = transaction.clone();
        let shared = transaction.shared();
        self.inflight.push(nonce, shared.clone()).await?;
        signer.local_nonce = nonce + 1;
        drop(signer);

        info!(
            correlation_id,
            tx_id = %snapshot.id,
            nonce,
            hash = ?snapshot.last_hash(),
            "Transaction submitted"
        );
        self.emit(DispatchEvent::Submitted(snapshot));
        Ok(shared)
    }

    async fn wait_until_finished(&self, transaction: &SharedTransaction) -> OnchainTransaction {
        let poll = Duration::from_millis(self.config.completion_poll_interval_ms);
        loop {
            {
                let transaction = transaction.read().await;
                if transaction.lifecycle.finished || transaction.error.is_some() {
                    return transaction.clone();
                }
            }
            sleep(poll).await;
        }
    }

    async fn rewind_nonce(&self, nonce: u64) {
        let mut signer = self.signer.lock().await;
        if signer.local_nonce > nonce {
            info!(
                chain_id = self.config.chain_id,
                from = signer.local_nonce,
                to = nonce,
                "Rewinding local nonce after failure"
            );
            signer.local_nonce = nonce;
        }
    }

    async fn nonce_in_use(&self, nonce: u64) -> bool {
        if self.inflight.get_by_nonce(nonce).await.is_some()
            || self.mined.get_by_nonce(nonce).await.is_some()
        {
            return true;
        }
        let mining = self.mining.lock().await.clone();
        match mining {
            Some(transaction) => transaction.read().await.nonce == nonce,
            None => false,
        }
    }

    async fn mine_loop(self: Arc<Self>) {
        let period = Duration::from_millis(self.config.mine_interval_ms);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            while let Some(transaction) = self.inflight.shift().await {
                *self.mining.lock().await = Some(transaction.clone());
                self.mine(&transaction).await;
                *self.mining.lock().await = None;
            }
        }
    }

    /// Drives one transaction to its first confirmation or a terminal error.
    async fn mine(&self, transaction: &SharedTransaction) {
        let mut resubmit = false;
        let mut bump = false;

        loop {
            let nonce = {
                let transaction = transaction.read().await;
                if transaction.is_settled() {
                    return;
                }
                transaction.nonce
            };

            if resubmit {
                resubmit = false;
                if bump {
                    bump = false;
                    self.bump_gas(transaction).await;
                }

                match self.resubmit(transaction).await {
                    Ok(()) => {}
                    Err(err) if err.is_insufficient_funds() => {
                        error!(
                            chain_id = self.config.chain_id,
                            nonce,
                            error = %err,
                            "INSUFFICIENT FUNDS: top up the signer balance, not resubmitting"
                        );
                    }
                    Err(err) if err.is_bad_nonce() => {
                        warn!(nonce, error = %err, "Resubmission rejected for nonce");
                    }
                    Err(err) => {
                        self.fail(transaction, err).await;
                        return;
                    }
                }
            }

            let last_hash = transaction.read().await.last_hash();
            let Some(hash) = last_hash else {
                self.fail(
                    transaction,
                    DispatchError::TransactionProcessingError(
                        "inflight transaction has no submission".to_string(),
                    ),
                )
                .await;
                return;
            };

            let outcome = self
                .provider
                .wait_for_confirmations(hash, 1, self.config.confirmation_timeout())
                .await;

            match outcome {
                Ok(receipt) => self.on_mined(transaction, receipt).await,
                Err(WaitError::Timeout) => {
                    debug!(nonce, %hash, "Timed out waiting for first confirmation");
                    (resubmit, bump) = self.after_stall(transaction).await;
                }
                Err(WaitError::Replaced {
                    replacement,
                    receipt,
                }) => {
                    if transaction.read().await.has_submitted(&replacement) {
                        self.on_mined(transaction, receipt).await;
                    } else {
                        self.fail(
                            transaction,
                            DispatchError::foreign_replacement(hash, replacement),
                        )
                        .await;
                    }
                }
                Err(WaitError::Provider(err)) => match classify(&err) {
                    Classification::Fault(fault) if fault.is_bad_nonce() => {
                        (resubmit, bump) = self.after_stall(transaction).await;
                    }
                    Classification::Fault(fault) if fault.is_insufficient_funds() => {
                        error!(nonce, error = %fault, "INSUFFICIENT FUNDS while waiting to mine");
                        sleep(Duration::from_millis(self.config.mine_interval_ms)).await;
                    }
                    Classification::Fault(fault) => {
                        self.fail(transaction, fault).await;
                    }
                    Classification::AlreadyKnown => {
                        sleep(Duration::from_millis(self.config.mine_interval_ms)).await;
                    }
                },
            }
        }
    }

    /// Inspects the chain after a stalled wait and returns `(resubmit, bump)`.
    async fn after_stall(&self, transaction: &SharedTransaction) -> (bool, bool) {
        let check = match self.check_chain(transaction).await {
            Ok(check) => check,
            Err(err) => {
                warn!(error = %err, "Failed to inspect chain, waiting again");
                return (false, false);
            }
        };

        let nonce = transaction.read().await.nonce;
        match check {
            ChainCheck::Mined(receipt) => {
                self.on_mined(transaction, receipt).await;
                (false, false)
            }
            ChainCheck::Confirming => (false, false),
            ChainCheck::Pending => {
                info!(nonce, "Transaction stuck in pool, resubmitting with more gas");
                (true, true)
            }
            ChainCheck::Missing => {
                info!(nonce, "Transaction dropped, resubmitting");
                (true, false)
            }
            ChainCheck::Backfilled(transaction_count) => {
                self.fail(
                    transaction,
                    DispatchError::TransactionBackfilled(format!(
                        "transaction count {transaction_count} moved past nonce {nonce} without any of our attempts"
                    )),
                )
                .await;
                (false, false)
            }
        }
    }

    async fn check_chain(&self, transaction: &SharedTransaction) -> Result<ChainCheck, DispatchError> {
        let (hashes, nonce) = {
            let transaction = transaction.read().await;
            (transaction.hashes(), transaction.nonce)
        };

        let mut pending = false;
        let mut confirming = false;
        for hash in hashes {
            let receipt = self
                .call(self.provider.get_transaction_receipt(hash))
                .await
                .map_err(read_error)?;
            if let Some(receipt) = receipt {
                return Ok(ChainCheck::Mined(receipt));
            }

            let found = self
                .call(self.provider.get_transaction(hash))
                .await
                .map_err(read_error)?;
            if let Some(found) = found {
                if found.block_number.is_some() {
                    confirming = true;
                } else {
                    pending = true;
                }
            }
        }

        if confirming {
            return Ok(ChainCheck::Confirming);
        }
        if pending {
            return Ok(ChainCheck::Pending);
        }

        let transaction_count = self.transaction_count(BlockTag::Latest).await?;
        if transaction_count > nonce {
            Ok(ChainCheck::Backfilled(transaction_count))
        } else {
            Ok(ChainCheck::Missing)
        }
    }

    async fn bump_gas(&self, transaction: &SharedTransaction) {
        if !self.escalator.can_bump(&*transaction.read().await) {
            debug!("Gas bump skipped");
            return;
        }

        match self.fetch_pricing().await {
            Ok(baseline) => {
                self.escalator
                    .apply(&mut *transaction.write().await, baseline);
            }
            Err(err) => warn!(error = %err, "Failed to fetch baseline gas price, resubmitting without a bump"),
        }
    }

    /// Sends another attempt at the transaction's nonce with its current gas.
    async fn resubmit(&self, transaction: &SharedTransaction) -> Result<(), DispatchError> {
        let prepared = transaction.read().await.prepared();

        let hash = match self.call(self.provider.send_transaction(&prepared)).await {
            Ok(hash) => hash,
            Err(err) => match classify(&err) {
                Classification::AlreadyKnown => match err.hash {
                    Some(hash) => hash,
                    None => return Ok(()),
                },
                Classification::Fault(fault) => return Err(fault),
            },
        };

        let snapshot = {
            let mut transaction = transaction.write().await;
            transaction.record_submission(hash);
            transaction.clone()
        };
        info!(
            tx_id = %snapshot.id,
            nonce = snapshot.nonce,
            %hash,
            attempts = snapshot.submissions.len(),
            "Transaction resubmitted"
        );
        self.emit(DispatchEvent::Submitted(snapshot));
        Ok(())
    }

    async fn on_mined(&self, transaction: &SharedTransaction, receipt: TxReceipt) {
        let reverted = !receipt.status;
        let block_number = receipt.block_number;
        let (snapshot, nonce) = {
            let mut transaction = transaction.write().await;
            transaction.mark_mined(receipt);
            (transaction.clone(), transaction.nonce)
        };

        if reverted {
            self.fail(
                transaction,
                DispatchError::TransactionReverted(
                    RevertCause::CallException,
                    format!("reverted on chain in block {block_number}"),
                ),
            )
            .await;
            return;
        }

        info!(tx_id = %snapshot.id, nonce, block_number, "Transaction mined");
        if let Err(err) = self.mined.push(nonce, transaction.clone()).await {
            self.fail(transaction, err).await;
            return;
        }
        self.emit(DispatchEvent::Mined(snapshot));
    }

    async fn confirm_loop(self: Arc<Self>) {
        let period = Duration::from_millis(self.config.confirm_interval_ms);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut confirmations = JoinSet::new();

        loop {
            ticker.tick().await;
            while confirmations.try_join_next().is_some() {}

            for transaction in self.mined.drain().await {
                let dispatcher = self.clone();
                confirmations.spawn(async move { dispatcher.confirm(&transaction).await });
            }
        }
    }

    async fn confirm(&self, transaction: &SharedTransaction) {
        let hash = {
            let transaction = transaction.read().await;
            if transaction.lifecycle.finished {
                return;
            }
            transaction
                .receipt
                .as_ref()
                .map(|receipt| receipt.transaction_hash)
                .or_else(|| transaction.last_hash())
        };
        let Some(hash) = hash else {
            self.fail(
                transaction,
                DispatchError::TransactionProcessingError(
                    "mined transaction has no hash".to_string(),
                ),
            )
            .await;
            return;
        };

        let outcome = self
            .provider
            .wait_for_confirmations(
                hash,
                self.config.confirmations_required,
                self.config.depth_timeout(),
            )
            .await;

        match outcome {
            Ok(receipt) => self.on_confirmed(transaction, receipt).await,
            Err(WaitError::Replaced {
                replacement,
                receipt,
            }) => {
                if transaction.read().await.has_submitted(&replacement) {
                    info!(%hash, %replacement, "Mined attempt replaced by another of our attempts");
                    self.on_confirmed(transaction, receipt).await;
                } else {
                    self.fail(
                        transaction,
                        DispatchError::foreign_replacement(hash, replacement),
                    )
                    .await;
                }
            }
            Err(WaitError::Timeout) => {
                self.fail(
                    transaction,
                    DispatchError::NotEnoughConfirmations(format!(
                        "{} confirmations not reached for {hash} within {:?}",
                        self.config.confirmations_required,
                        self.config.depth_timeout()
                    )),
                )
                .await;
            }
            Err(WaitError::Provider(err)) => {
                self.fail(transaction, read_error(err)).await;
            }
        }
    }

    async fn on_confirmed(&self, transaction: &SharedTransaction, receipt: TxReceipt) {
        let snapshot = {
            let mut transaction = transaction.write().await;
            transaction.mark_confirmed(receipt);
            transaction.clone()
        };
        info!(
            tx_id = %snapshot.id,
            nonce = snapshot.nonce,
            confirmations = self.config.confirmations_required,
            "Transaction confirmed"
        );
        self.emit(DispatchEvent::Confirmed(snapshot));
    }

    async fn provider_sync_loop(self: Arc<Self>) {
        let period = Duration::from_millis(self.config.provider_sync_interval_ms);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Ok(mut signer) = self.signer.try_lock() else {
                continue;
            };
            if !self.inflight.is_empty().await {
                continue;
            }

            match self.transaction_count(BlockTag::Latest).await {
                Ok(transaction_count) if transaction_count > signer.local_nonce => {
                    info!(
                        chain_id = self.config.chain_id,
                        from = signer.local_nonce,
                        to = transaction_count,
                        "Local nonce behind chain, advancing"
                    );
                    signer.local_nonce = transaction_count;
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "Provider sync failed"),
            }
        }
    }

    async fn fail(&self, transaction: &SharedTransaction, err: DispatchError) {
        let snapshot = {
            let mut transaction = transaction.write().await;
            let err = err.with_context(&transaction.context());
            error!(
                tx_id = %transaction.id,
                correlation_id = %transaction.correlation_id,
                nonce = transaction.nonce,
                error = %err,
                "Transaction failed"
            );
            transaction.fail(err);
            transaction.clone()
        };
        self.emit(DispatchEvent::Failed(snapshot));
    }

    fn emit(&self, event: DispatchEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Runs a provider call under the RPC timeout.
    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match timeout(self.config.rpc_timeout(), request).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::new(format!(
                "provider call timed out after {:?}",
                self.config.rpc_timeout()
            ))),
        }
    }

    async fn estimate_gas(&self, estimate_request: &PreparedTransaction) -> Result<u64, DispatchError> {
        self.call(self.provider.estimate_gas(estimate_request))
            .await
            .map_err(|err| classify_estimate(&err))
    }

    async fn fetch_pricing(&self) -> Result<GasPricing, DispatchError> {
        match self.config.fee_mode {
            FeeMode::Legacy => self
                .call(self.provider.get_gas_price())
                .await
                .map(|gas_price| GasPricing::Legacy { gas_price })
                .map_err(read_error),
            FeeMode::Eip1559 => self
                .call(self.provider.estimate_eip1559_fees())
                .await
                .map_err(read_error),
        }
    }

    async fn transaction_count(&self, tag: BlockTag) -> Result<u64, DispatchError> {
        self.call(self.provider.get_transaction_count(tag))
            .await
            .map_err(read_error)
    }
}

/// Classifies an error from a read-only call.
fn read_error(err: ProviderError) -> DispatchError {
    into_fault(classify(&err)).unwrap_or_else(|| DispatchError::Rpc(err.to_string()))
}
