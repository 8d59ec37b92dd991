//! Nonce selection for one signer.
//!
//! The resolver assumes it is the only writer for its signer. Two dispatchers
//! sharing a key would race on the last-observed transaction count.

use std::cmp::max;

use crate::errors::NonceFault;

/// Inputs to one resolution.
#[derive(Clone, Copy, Debug)]
pub struct NonceInput<'a> {
    /// Nonces already tried for this logical transaction, oldest first.
    pub attempted: &'a [u64],
    /// Provider "latest" transaction count.
    pub transaction_count: u64,
    /// Provider "pending" transaction count, when it was fetched.
    pub pending_count: Option<u64>,
    /// Next nonce this process intends to use.
    pub local_nonce: u64,
    /// Classified error from the previous attempt.
    pub fault: Option<NonceFault>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NonceResolution {
    pub nonce: u64,
    /// The nonce fills a gap left by an earlier send that never landed.
    pub backfill: bool,
    pub transaction_count: u64,
}

#[derive(Debug, Default)]
pub struct NonceResolver {
    last_observed_count: Option<u64>,
}

impl NonceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_observed_count(&self) -> Option<u64> {
        self.last_observed_count
    }

    /// Picks the nonce for the next attempt.
    ///
    /// Deterministic; the only side effect is remembering `transaction_count`
    /// for regression detection on the next call.
    pub fn resolve(&mut self, input: &NonceInput<'_>) -> NonceResolution {
        let count = input.transaction_count;
        let mut nonce = match input.attempted.last() {
            Some(last) => *last,
            None => max(input.local_nonce, count),
        };

        let backfill = self.last_observed_count.is_some_and(|last| count < last);

        if backfill {
            nonce = count;
        } else {
            match input.fault {
                Some(NonceFault::Expired | NonceFault::ReplacementUnderpriced) => {
                    nonce = untried_nonce(input);
                }
                Some(NonceFault::Incorrect) => nonce = count,
                None => {}
            }
        }

        self.last_observed_count = Some(count);

        NonceResolution {
            nonce,
            backfill,
            transaction_count: count,
        }
    }
}

fn untried_nonce(input: &NonceInput<'_>) -> u64 {
    let tried = |nonce: u64| input.attempted.contains(&nonce);

    if !tried(input.transaction_count) {
        return input.transaction_count;
    }
    if let Some(pending) = input.pending_count {
        if !tried(pending) {
            return pending;
        }
    }

    let mut nonce = input
        .attempted
        .iter()
        .copied()
        .min()
        .unwrap_or(input.transaction_count);
    while tried(nonce) {
        nonce += 1;
    }
    nonce
}
