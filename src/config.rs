use config::{self, File};
use serde::Deserialize;
use std::time::Duration;

use crate::constants::{
    COMPLETION_POLL_INTERVAL_MS, CONFIRM_INTERVAL_MS, DEFAULT_CONFIRMATIONS_REQUIRED,
    DEFAULT_CONFIRMATION_TIMEOUT_MS, DEFAULT_INFLIGHT_CAPACITY, EVENT_CHANNEL_CAPACITY,
    GAS_INCREMENT_AMOUNT, MAX_CONFIRMATIONS_REQUIRED, MAX_DURATION_MS, MINE_INTERVAL_MS,
    PROVIDER_SYNC_INTERVAL_MS, RPC_TIMEOUT_MS, RESEND_GAS_PRICE_INCREMENT_PERCENT,
};
use crate::errors::SetupError;

pub struct ConfigManager {
    path: String,
}

impl ConfigManager {
    pub fn new(path: &str) -> ConfigManager {
        ConfigManager {
            path: path.to_string(),
        }
    }

    pub fn load_config(&self) -> Result<DispatcherConfig, SetupError> {
        let settings = config::Config::builder()
            .add_source(File::with_name(self.path.as_str()))
            .build()?;
        let config: DispatcherConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
    #[default]
    Legacy,
    Eip1559,
}

/// Per-signer dispatcher settings. Every field has a default.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatcherConfig {
    pub chain_id: u64,
    pub inflight_capacity: usize,
    pub confirmations_required: u64,
    /// How long to wait for one confirmation before inspecting the chain.
    pub confirmation_timeout_ms: u64,
    pub gas_bump_percent: u64,
    /// No bumps once the gas price (or max fee) reaches this value.
    pub gas_price_ceiling: Option<u64>,
    /// Added on top of every gas estimate.
    pub gas_limit_increment_amount: u64,
    pub fee_mode: FeeMode,
    pub mine_interval_ms: u64,
    pub confirm_interval_ms: u64,
    pub completion_poll_interval_ms: u64,
    pub provider_sync_interval_ms: u64,
    pub rpc_timeout_ms: u64,
    pub event_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            inflight_capacity: DEFAULT_INFLIGHT_CAPACITY,
            confirmations_required: DEFAULT_CONFIRMATIONS_REQUIRED,
            confirmation_timeout_ms: DEFAULT_CONFIRMATION_TIMEOUT_MS,
            gas_bump_percent: RESEND_GAS_PRICE_INCREMENT_PERCENT as u64,
            gas_price_ceiling: None,
            gas_limit_increment_amount: GAS_INCREMENT_AMOUNT,
            fee_mode: FeeMode::Legacy,
            mine_interval_ms: MINE_INTERVAL_MS,
            confirm_interval_ms: CONFIRM_INTERVAL_MS,
            completion_poll_interval_ms: COMPLETION_POLL_INTERVAL_MS,
            provider_sync_interval_ms: PROVIDER_SYNC_INTERVAL_MS,
            rpc_timeout_ms: RPC_TIMEOUT_MS,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    pub fn for_chain(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        let positive = [
            ("inflight_capacity", self.inflight_capacity as u64),
            ("confirmations_required", self.confirmations_required),
            ("confirmation_timeout_ms", self.confirmation_timeout_ms),
            ("mine_interval_ms", self.mine_interval_ms),
            ("confirm_interval_ms", self.confirm_interval_ms),
            ("completion_poll_interval_ms", self.completion_poll_interval_ms),
            ("provider_sync_interval_ms", self.provider_sync_interval_ms),
            ("rpc_timeout_ms", self.rpc_timeout_ms),
            ("event_capacity", self.event_capacity as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SetupError::InvalidConfig(format!("{name} must be positive")));
            }
        }

        if self.confirmations_required > MAX_CONFIRMATIONS_REQUIRED {
            return Err(SetupError::InvalidConfig(format!(
                "confirmations_required must be at most {MAX_CONFIRMATIONS_REQUIRED}"
            )));
        }
        let durations = [
            ("confirmation_timeout_ms", self.confirmation_timeout_ms),
            ("mine_interval_ms", self.mine_interval_ms),
            ("confirm_interval_ms", self.confirm_interval_ms),
            ("completion_poll_interval_ms", self.completion_poll_interval_ms),
            ("provider_sync_interval_ms", self.provider_sync_interval_ms),
            ("rpc_timeout_ms", self.rpc_timeout_ms),
        ];
        for (name, value) in durations {
            if value > MAX_DURATION_MS {
                return Err(SetupError::InvalidConfig(format!(
                    "{name} must be at most {MAX_DURATION_MS}"
                )));
            }
        }
        Ok(())
    }

    /// Iteration budget of the initial submission loop.
    pub fn submission_attempts(&self) -> usize {
        self.inflight_capacity + 2
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    /// Deadline for reaching the full confirmation depth.
    pub fn depth_timeout(&self) -> Duration {
        let factor = u32::try_from(self.confirmations_required.saturating_mul(2)).unwrap_or(u32::MAX);
        self.confirmation_timeout().saturating_mul(factor)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DispatcherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.inflight_capacity, 64);
        assert_eq!(config.submission_attempts(), 66);
        assert_eq!(config.mine_interval_ms, 2_000);
    }

    #[test]
    fn test_depth_timeout_scales_with_confirmations() {
        let config = DispatcherConfig {
            confirmation_timeout_ms: 1_000,
            confirmations_required: 3,
            ..DispatcherConfig::default()
        };
        assert_eq!(config.depth_timeout(), Duration::from_secs(6));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = DispatcherConfig {
            inflight_capacity: 0,
            ..DispatcherConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SetupError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = DispatcherConfig {
            confirmations_required: MAX_CONFIRMATIONS_REQUIRED + 1,
            ..DispatcherConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SetupError::InvalidConfig(_))
        ));

        let config = DispatcherConfig {
            confirmation_timeout_ms: u64::MAX,
            ..DispatcherConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SetupError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_depth_timeout_saturates() {
        let config = DispatcherConfig {
            confirmation_timeout_ms: u64::MAX,
            confirmations_required: u64::MAX,
            ..DispatcherConfig::default()
        };
        assert_eq!(config.depth_timeout(), Duration::MAX);

        let config = DispatcherConfig {
            confirmation_timeout_ms: 1_000,
            confirmations_required: 1 << 40,
            ..DispatcherConfig::default()
        };
        assert_eq!(config.depth_timeout(), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!(
            "dispatcher-config-{}.toml",
            uuid::Uuid::new_v4()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "chain_id = 421614\ninflight_capacity = 8\nfee_mode = \"eip1559\"\ngas_price_ceiling = 50000000000"
        )
        .unwrap();

        let config = ConfigManager::new(path.to_str().unwrap())
            .load_config()
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.chain_id, 421614);
        assert_eq!(config.inflight_capacity, 8);
        assert_eq!(config.fee_mode, FeeMode::Eip1559);
        assert_eq!(config.gas_price_ceiling, Some(50_000_000_000));
        assert_eq!(config.confirmations_required, 1);
    }
}
