//! Fee escalation for stuck transactions.

use tracing::{debug, info};

use crate::models::{GasPricing, OnchainTransaction};

/// `max(baseline, current) * (100 + percent) / 100`, rounded up, plus one wei.
///
/// The extra wei keeps the result strictly above both inputs even when the
/// percentage rounds to nothing.
pub fn escalate_price(current: u128, baseline: u128, bump_percent: u128) -> u128 {
    let base = current.max(baseline);
    let Some(scaled) = base.checked_mul(100 + bump_percent) else {
        return u128::MAX;
    };
    (scaled / 100 + u128::from(scaled % 100 != 0)).saturating_add(1)
}

#[derive(Clone, Copy, Debug)]
pub struct GasEscalator {
    bump_percent: u128,
    ceiling: Option<u128>,
}

impl GasEscalator {
    pub fn new(bump_percent: u128, ceiling: Option<u128>) -> Self {
        Self {
            bump_percent,
            ceiling,
        }
    }

    /// Whether `transaction` may be bumped right now.
    ///
    /// No more bumps than submissions, and nothing at or above the ceiling.
    pub fn can_bump(&self, transaction: &OnchainTransaction) -> bool {
        if transaction.bumps >= transaction.submissions.len() {
            return false;
        }
        match self.ceiling {
            Some(ceiling) => transaction.gas.pricing.price() < ceiling,
            None => true,
        }
    }

    /// Applies one bump against `baseline` (a freshly fetched network price).
    ///
    /// Returns whether the fee changed.
    pub fn apply(&self, transaction: &mut OnchainTransaction, baseline: GasPricing) -> bool {
        if !self.can_bump(transaction) {
            debug!(
                tx_id = %transaction.id,
                nonce = transaction.nonce,
                bumps = transaction.bumps,
                "Gas bump skipped"
            );
            return false;
        }

        let cap = |price: u128| match self.ceiling {
            Some(ceiling) => price.min(ceiling),
            None => price,
        };

        let previous = transaction.gas.pricing;
        transaction.gas.pricing = match (previous, baseline) {
            (GasPricing::Legacy { gas_price }, baseline) => GasPricing::Legacy {
                gas_price: cap(escalate_price(
                    gas_price,
                    baseline.price(),
                    self.bump_percent,
                )),
            },
            (
                GasPricing::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                },
                GasPricing::Eip1559 {
                    max_fee_per_gas: base_fee,
                    max_priority_fee_per_gas: base_tip,
                },
            ) => {
                let max_fee_per_gas =
                    cap(escalate_price(max_fee_per_gas, base_fee, self.bump_percent));
                let max_priority_fee_per_gas =
                    escalate_price(max_priority_fee_per_gas, base_tip, self.bump_percent)
                        .min(max_fee_per_gas);
                GasPricing::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                }
            }
            (
                GasPricing::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                },
                GasPricing::Legacy { gas_price },
            ) => {
                let max_fee_per_gas =
                    cap(escalate_price(max_fee_per_gas, gas_price, self.bump_percent));
                let max_priority_fee_per_gas =
                    escalate_price(max_priority_fee_per_gas, 0, self.bump_percent)
                        .min(max_fee_per_gas);
                GasPricing::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                }
            }
        };
        transaction.bumps += 1;

        info!(
            tx_id = %transaction.id,
            nonce = transaction.nonce,
            bumps = transaction.bumps,
            from = previous.price(),
            to = transaction.gas.pricing.price(),
            "Gas bumped"
        );
        true
    }
}
