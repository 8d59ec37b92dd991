pub(crate) mod buffer;
pub mod classifier;
pub mod config;
pub(crate) mod constants;
pub mod dispatcher;
pub mod errors;
pub mod gas;
pub mod http_provider;
pub mod models;
pub mod nonce;
pub mod provider;
pub(crate) mod utils;

#[cfg(test)]
mod test_util;

pub use crate::config::{ConfigManager, DispatcherConfig, FeeMode};
pub use crate::dispatcher::Dispatcher;
pub use crate::errors::{DispatchError, NonceFault, RevertCause, SetupError};
pub use crate::http_provider::HttpChainProvider;
pub use crate::models::{
    DispatchEvent, GasParams, GasPricing, Lifecycle, OnchainTransaction, PreparedTransaction,
    Submission, TxReceipt, WriteRequest,
};
pub use crate::provider::{BlockTag, ChainProvider, ChainTransaction, ProviderError, WaitError};
