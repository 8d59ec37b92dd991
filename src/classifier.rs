//! Maps raw provider errors onto the dispatcher's typed failure kinds.

use crate::errors::{DispatchError, NonceFault, RevertCause};
use crate::provider::ProviderError;

/// Result of classifying a provider error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The provider already holds this exact signed transaction. Treated as a
    /// successful submission.
    AlreadyKnown,
    Fault(DispatchError),
}

const ALREADY_KNOWN: &[&str] = &[
    "already known",
    "known transaction",
    "already imported",
    "transaction already exists",
];

const REPLACEMENT_UNDERPRICED: &[&str] = &[
    "replacement transaction underpriced",
    "replacement fee too low",
    "replacement_underpriced",
];

const NONCE_EXPIRED: &[&str] = &[
    "nonce too low",
    "nonce has already been used",
    "nonce_expired",
    "oldnonce",
];

const NONCE_INCORRECT: &[&str] = &[
    "nonce too high",
    "invalid nonce",
    "incorrect nonce",
    "nonce gap",
];

const INSUFFICIENT_FUNDS: &[&str] = &[
    "insufficient funds",
    "insufficient balance",
    "insufficient_funds",
];

const ALWAYS_FAILING: &[&str] = &[
    "always failing transaction",
    "gas required exceeds allowance",
    "exceeds block gas limit",
];

const ESTIMATE_FAILED: &[&str] = &["cannot estimate gas", "unpredictable_gas_limit"];

const CALL_EXCEPTION: &[&str] = &["execution reverted", "call_exception", "reverted"];

const TIMEOUT: &[&str] = &["timed out", "timeout", "deadline exceeded"];

/// JSON-RPC codes consulted when the message itself is not recognised.
const CODE_EXECUTION_REVERTED: i64 = 3;
const CODE_VM_EXECUTION_ERROR: i64 = -32015;
const CODE_TRANSACTION_REJECTED: i64 = -32003;
const CODE_TRANSACTION_ERROR: i64 = -32010;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classifies an error returned while sending a transaction.
pub fn classify(err: &ProviderError) -> Classification {
    let message = err.message.to_lowercase();
    let context = err.to_string();

    if contains_any(&message, ALREADY_KNOWN) {
        return Classification::AlreadyKnown;
    }

    let fault = if contains_any(&message, REPLACEMENT_UNDERPRICED) {
        DispatchError::BadNonce(NonceFault::ReplacementUnderpriced, context)
    } else if contains_any(&message, NONCE_EXPIRED) {
        DispatchError::BadNonce(NonceFault::Expired, context)
    } else if contains_any(&message, NONCE_INCORRECT) {
        DispatchError::BadNonce(NonceFault::Incorrect, context)
    } else if contains_any(&message, INSUFFICIENT_FUNDS) {
        DispatchError::TransactionReverted(RevertCause::InsufficientFunds, context)
    } else if contains_any(&message, ALWAYS_FAILING) {
        DispatchError::TransactionReverted(RevertCause::AlwaysFailing, context)
    } else if contains_any(&message, ESTIMATE_FAILED) {
        DispatchError::TransactionReverted(RevertCause::EstimateFailed, context)
    } else if contains_any(&message, CALL_EXCEPTION) {
        DispatchError::TransactionReverted(RevertCause::CallException, context)
    } else if contains_any(&message, TIMEOUT) {
        DispatchError::OperationTimeout(context)
    } else {
        match err.code {
            Some(CODE_EXECUTION_REVERTED | CODE_VM_EXECUTION_ERROR) => {
                DispatchError::TransactionReverted(RevertCause::CallException, context)
            }
            // Rejected without a reason we know; re-read the count and retry.
            Some(CODE_TRANSACTION_REJECTED | CODE_TRANSACTION_ERROR) => {
                DispatchError::BadNonce(NonceFault::Incorrect, context)
            }
            _ => DispatchError::Rpc(context),
        }
    };

    Classification::Fault(fault)
}

/// Classifies an error returned by gas estimation.
///
/// Any failure that points at the call itself becomes
/// `TransactionReverted(EstimateFailed)`; connectivity problems stay as they are.
pub fn classify_estimate(err: &ProviderError) -> DispatchError {
    match classify(err) {
        Classification::Fault(DispatchError::TransactionReverted(RevertCause::InsufficientFunds, msg)) => {
            DispatchError::TransactionReverted(RevertCause::InsufficientFunds, msg)
        }
        Classification::Fault(DispatchError::TransactionReverted(_, msg)) => {
            DispatchError::TransactionReverted(RevertCause::EstimateFailed, msg)
        }
        Classification::Fault(fault) => fault,
        Classification::AlreadyKnown => DispatchError::Rpc(err.to_string()),
    }
}

/// Extracts the error, mapping `AlreadyKnown` to `None`.
pub fn into_fault(classification: Classification) -> Option<DispatchError> {
    match classification {
        Classification::AlreadyKnown => None,
        Classification::Fault(fault) => Some(fault),
    }
}
