use std::fmt;

use alloy::primitives::B256;
use thiserror::Error;

/// Errors surfaced by the dispatcher.
///
/// `send` resolves with a receipt or with exactly one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Bad nonce ({0}). Error: {1}")]
    BadNonce(NonceFault, String),
    #[error("Transaction reverted ({0}). Error: {1}")]
    TransactionReverted(RevertCause, String),
    #[error("Transaction replaced by {0}. Error: {1}")]
    TransactionReplaced(B256, String),
    #[error("Transaction nonce taken by another transaction. Error: {0}")]
    TransactionBackfilled(String),
    #[error("Not enough confirmations, possible reorg. Error: {0}")]
    NotEnoughConfirmations(String),
    #[error("Operation timed out. Error: {0}")]
    OperationTimeout(String),
    #[error("Initial submission failure. Error: {0}")]
    InitialSubmitFailure(String),
    #[error("Transaction processing error. Error: {0}")]
    TransactionProcessingError(String),
    #[error("RPC error. Error: {0}")]
    Rpc(String),
}

impl DispatchError {
    /// Appends transaction context (chain id, nonce, attempts) to the error message.
    pub(crate) fn with_context(self, context: &str) -> Self {
        let join = |msg: String| {
            if msg.is_empty() {
                context.to_string()
            } else {
                format!("{msg} [{context}]")
            }
        };

        match self {
            Self::BadNonce(fault, msg) => Self::BadNonce(fault, join(msg)),
            Self::TransactionReverted(cause, msg) => Self::TransactionReverted(cause, join(msg)),
            Self::TransactionReplaced(hash, msg) => Self::TransactionReplaced(hash, join(msg)),
            Self::TransactionBackfilled(msg) => Self::TransactionBackfilled(join(msg)),
            Self::NotEnoughConfirmations(msg) => Self::NotEnoughConfirmations(join(msg)),
            Self::OperationTimeout(msg) => Self::OperationTimeout(join(msg)),
            Self::InitialSubmitFailure(msg) => Self::InitialSubmitFailure(join(msg)),
            Self::TransactionProcessingError(msg) => Self::TransactionProcessingError(join(msg)),
            Self::Rpc(msg) => Self::Rpc(join(msg)),
        }
    }

    /// A mined replacement none of our attempts account for. Only our own
    /// replacements are recoverable, so this surfaces as a processing error.
    pub(crate) fn foreign_replacement(hash: B256, replacement: B256) -> Self {
        let replaced = Self::TransactionReplaced(
            replacement,
            format!("attempt {hash} lost to a transaction we did not send"),
        );
        Self::TransactionProcessingError(replaced.to_string())
    }

    pub fn is_bad_nonce(&self) -> bool {
        matches!(self, Self::BadNonce(..))
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            Self::TransactionReverted(RevertCause::InsufficientFunds, _)
        )
    }
}

/// Which way a nonce was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceFault {
    /// Nonce already consumed on chain ("nonce too low").
    Expired,
    /// Same nonce is pending with a fee we did not outbid.
    ReplacementUnderpriced,
    /// Provider could not say whether it was too high or too low.
    Incorrect,
}

impl fmt::Display for NonceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "nonce expired"),
            Self::ReplacementUnderpriced => write!(f, "replacement underpriced"),
            Self::Incorrect => write!(f, "nonce incorrect"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertCause {
    EstimateFailed,
    InsufficientFunds,
    CallException,
    AlwaysFailing,
}

impl fmt::Display for RevertCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EstimateFailed => write!(f, "gas estimate failed"),
            Self::InsufficientFunds => write!(f, "insufficient funds"),
            Self::CallException => write!(f, "call exception"),
            Self::AlwaysFailing => write!(f, "always failing transaction"),
        }
    }
}

/// Errors raised while building a dispatcher or its provider.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Invalid RPC URL. Error: {0}")]
    InvalidRpcUrl(String),
    #[error("Invalid private signer. Error: {0}")]
    InvalidPrivateSigner(String),
    #[error("Invalid configuration. Error: {0}")]
    InvalidConfig(String),
    #[error("Failed to load configuration. Error: {0}")]
    Config(#[from] config::ConfigError),
}
