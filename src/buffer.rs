use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::errors::DispatchError;
use crate::models::SharedTransaction;

#[derive(Default)]
struct BufferInner {
    queue: VecDeque<(u64, SharedTransaction)>,
    by_nonce: HashMap<u64, SharedTransaction>,
}

/// FIFO of transactions with an optional capacity and a lookup by nonce.
///
/// The inflight buffer is bounded and applies back-pressure to `send`; the
/// mined buffer is unbounded.
pub(crate) struct TransactionBuffer {
    inner: Mutex<BufferInner>,
    capacity: Option<usize>,
    slot_freed: Notify,
}

impl TransactionBuffer {
    pub(crate) fn bounded(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BufferInner::default()),
            capacity: Some(capacity),
            slot_freed: Notify::new(),
        }
    }

    pub(crate) fn unbounded() -> Self {
        Self {
            inner: Mutex::new(BufferInner::default()),
            capacity: None,
            slot_freed: Notify::new(),
        }
    }

    pub(crate) fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub(crate) async fn is_empty(&self) -> bool {
        self.inner.lock().await.queue.is_empty()
    }

    pub(crate) async fn is_full(&self) -> bool {
        match self.capacity {
            Some(capacity) => self.inner.lock().await.queue.len() >= capacity,
            None => false,
        }
    }

    /// Waits until there is room for one more transaction.
    ///
    /// Only correct with a single waiter; the submission queue guarantees that.
    pub(crate) async fn wait_for_slot(&self) {
        while self.is_full().await {
            self.slot_freed.notified().await;
        }
    }

    /// Appends at the tail. Fails instead of overfilling a bounded buffer.
    pub(crate) async fn push(
        &self,
        nonce: u64,
        transaction: SharedTransaction,
    ) -> Result<(), DispatchError> {
        let mut inner = self.inner.lock().await;
        if let Some(capacity) = self.capacity {
            if inner.queue.len() >= capacity {
                return Err(DispatchError::TransactionProcessingError(format!(
                    "buffer full ({capacity}) while pushing nonce {nonce}"
                )));
            }
        }
        inner.by_nonce.insert(nonce, transaction.clone());
        inner.queue.push_back((nonce, transaction));
        Ok(())
    }

    /// Removes and returns the head.
    pub(crate) async fn shift(&self) -> Option<SharedTransaction> {
        let shifted = {
            let mut inner = self.inner.lock().await;
            let (nonce, transaction) = inner.queue.pop_front()?;
            if inner
                .by_nonce
                .get(&nonce)
                .is_some_and(|indexed| Arc::ptr_eq(indexed, &transaction))
            {
                inner.by_nonce.remove(&nonce);
            }
            transaction
        };
        self.slot_freed.notify_one();
        Some(shifted)
    }

    /// Removes and returns everything, head first.
    pub(crate) async fn drain(&self) -> Vec<SharedTransaction> {
        let drained: Vec<SharedTransaction> = {
            let mut inner = self.inner.lock().await;
            inner.by_nonce.clear();
            inner.queue.drain(..).map(|(_, tx)| tx).collect()
        };
        if !drained.is_empty() {
            self.slot_freed.notify_one();
        }
        drained
    }

    pub(crate) async fn get_by_nonce(&self, nonce: u64) -> Option<SharedTransaction> {
        self.inner.lock().await.by_nonce.get(&nonce).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::primitives::{Address, Bytes};
    use tokio::time::timeout;

    use super::*;
    use crate::models::{GasParams, GasPricing, OnchainTransaction, WriteRequest};

    fn shared(nonce: u64) -> SharedTransaction {
        OnchainTransaction::new(
            WriteRequest::new(Address::ZERO, Bytes::new(), 1),
            "buffer-test",
            nonce,
            GasParams {
                pricing: GasPricing::Legacy { gas_price: 1 },
                limit: 21_000,
            },
        )
        .shared()
    }

    #[tokio::test]
    async fn test_fifo_order_and_nonce_index() {
        let buffer = TransactionBuffer::unbounded();
        for nonce in [3, 4, 5] {
            buffer.push(nonce, shared(nonce)).await.unwrap();
        }
        assert_eq!(buffer.len().await, 3);
        assert!(buffer.get_by_nonce(4).await.is_some());

        let head = buffer.shift().await.unwrap();
        assert_eq!(head.read().await.nonce, 3);
        assert!(buffer.get_by_nonce(3).await.is_none());
        assert!(buffer.get_by_nonce(5).await.is_some());

        let rest = buffer.drain().await;
        assert_eq!(rest.len(), 2);
        assert!(buffer.is_empty().await);
        assert!(buffer.get_by_nonce(5).await.is_none());
        assert!(buffer.shift().await.is_none());
    }

    #[tokio::test]
    async fn test_bounded_buffer_rejects_overflow() {
        let buffer = TransactionBuffer::bounded(1);
        buffer.push(1, shared(1)).await.unwrap();
        assert!(buffer.is_full().await);
        assert!(matches!(
            buffer.push(2, shared(2)).await,
            Err(DispatchError::TransactionProcessingError(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_slot_blocks_until_shift() {
        let buffer = Arc::new(TransactionBuffer::bounded(2));
        buffer.push(1, shared(1)).await.unwrap();
        buffer.push(2, shared(2)).await.unwrap();

        assert!(timeout(Duration::from_secs(5), buffer.wait_for_slot())
            .await
            .is_err());

        let waiter = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.wait_for_slot().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        buffer.shift().await.unwrap();
        timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
