//! Node configuration. Every field can be overridden at startup by an
//! environment variable of the same name.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Block subsidy paid to the coinbase output of every mined block.
    pub fixed_reward: u64,
    /// Difficulty: the target is `1 << (256 - difficulty_bits)`.
    pub difficulty_bits: u32,
    /// Fee assumed for transactions that don't specify one explicitly.
    pub default_fee: u64,
    /// Whether unconfirmed-but-pending UTXOs may be spent by new transactions.
    pub allow_utxo_from_pool: bool,
    /// Seconds of silence before a peer moves from KNOWN to SILENT.
    pub alive_timeout_secs: u64,
    /// Seconds between heartbeat sweeps of the peer table.
    pub update_interval_secs: u64,
    /// Address of a seed peer to bootstrap from, if any.
    pub seed_addr: Option<String>,
    /// UDP port this node listens on.
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fixed_reward: 500,
            difficulty_bits: 18,
            default_fee: 0,
            allow_utxo_from_pool: true,
            alive_timeout_secs: 30,
            update_interval_secs: 10,
            seed_addr: None,
            port: 5000,
        }
    }
}

impl Config {
    pub fn alive_timeout(&self) -> Duration {
        Duration::from_secs(self.alive_timeout_secs)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Build a config from defaults, then apply any environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_u64("FIXED_REWARD") {
            self.fixed_reward = v;
        }
        if let Some(v) = env_u32("DIFFICULTY_BITS") {
            self.difficulty_bits = v;
        }
        if let Some(v) = env_u64("DEFAULT_FEE") {
            self.default_fee = v;
        }
        if let Some(v) = env_bool("ALLOW_UTXO_FROM_POOL") {
            self.allow_utxo_from_pool = v;
        }
        if let Some(v) = env_u64("ALIVE_TIMEOUT") {
            self.alive_timeout_secs = v;
        }
        if let Some(v) = env_u64("UPDATE_INTERVAL") {
            self.update_interval_secs = v;
        }
        if let Ok(v) = std::env::var("SEED_ADDR") {
            self.seed_addr = Some(v);
        }
        if let Some(v) = env_u16("PORT") {
            self.port = v;
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u16(name: &str) -> Option<u16> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| match v.as_str() {
        "1" | "true" | "TRUE" | "yes" => Some(true),
        "0" | "false" | "FALSE" | "no" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.fixed_reward, 500);
        assert_eq!(cfg.difficulty_bits, 18);
        assert_eq!(cfg.default_fee, 0);
        assert!(cfg.allow_utxo_from_pool);
        assert_eq!(cfg.port, 5000);
    }

    #[test]
    fn env_bool_parses_common_spellings() {
        assert_eq!(env_bool("NONEXISTENT_VAR_XYZ"), None);
    }
}
