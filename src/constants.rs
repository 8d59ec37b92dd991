pub(crate) const DEFAULT_INFLIGHT_CAPACITY: usize = 64;
pub(crate) const DEFAULT_CONFIRMATIONS_REQUIRED: u64 = 1;
pub(crate) const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 60_000;
pub(crate) const RESEND_GAS_PRICE_INCREMENT_PERCENT: u128 = 10;
pub(crate) const GAS_INCREMENT_AMOUNT: u64 = 20_000;

pub(crate) const MINE_INTERVAL_MS: u64 = 2_000;
pub(crate) const CONFIRM_INTERVAL_MS: u64 = 2_000;
pub(crate) const COMPLETION_POLL_INTERVAL_MS: u64 = 1_000;
pub(crate) const PROVIDER_SYNC_INTERVAL_MS: u64 = 10_000;
pub(crate) const RPC_TIMEOUT_MS: u64 = 30_000;
pub(crate) const MAX_CONFIRMATIONS_REQUIRED: u64 = 1_000;
pub(crate) const MAX_DURATION_MS: u64 = 7 * 24 * 3_600_000;
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

// Receipt polling inside the HTTP provider
pub(crate) const HTTP_SLEEP_TIME_MS: u64 = 1_000;
