//! Simulator configuration

use crate::error::{SimResult, SimulationError};
use forksim_evm::BlockContext;
use forksim_primitives::{Address, H256, U256};
use forksim_rpc::{BlockTag, RpcConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable that overrides `rpc.endpoint`
pub const RPC_URL_ENV: &str = "FORKSIM_RPC_URL";

/// Simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Remote node
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Block environment simulations run in
    #[serde(default)]
    pub block: BlockConfig,

    /// Gas limit for simulations that do not set one
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
}

/// Block environment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockConfig {
    /// Chain ID
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Block gas limit
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Base fee in wei
    #[serde(default = "default_base_fee")]
    pub base_fee: u64,

    /// Coinbase
    #[serde(default)]
    pub coinbase: Address,

    /// Timestamp
    #[serde(default)]
    pub timestamp: u64,
}

fn default_chain_id() -> u64 {
    1
}

fn default_gas_limit() -> u64 {
    30_000_000
}

fn default_base_fee() -> u64 {
    1_000_000_000
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            block: BlockConfig::default(),
            default_gas_limit: default_gas_limit(),
        }
    }
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            gas_limit: default_gas_limit(),
            base_fee: default_base_fee(),
            coinbase: Address::ZERO,
            timestamp: 0,
        }
    }
}

impl BlockConfig {
    /// Block context for a simulation at `block`; `latest` runs as block 0
    pub fn context(&self, block: BlockTag) -> BlockContext {
        let number = match block {
            BlockTag::Number(n) => n,
            BlockTag::Latest => 0,
        };
        BlockContext {
            number,
            timestamp: self.timestamp,
            gas_limit: self.gas_limit,
            coinbase: self.coinbase,
            prevrandao: H256::ZERO,
            chain_id: self.chain_id,
            base_fee: U256::from(self.base_fee),
        }
    }
}

impl SimulatorConfig {
    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> SimResult<Self> {
        toml::from_str(content).map_err(|e| SimulationError::Config(e.to_string()))
    }

    /// Load from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimulationError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        info!(endpoint = %config.rpc.endpoint, "loaded simulator config");
        Ok(config)
    }

    /// Apply overrides looked up by variable name
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(RPC_URL_ENV).filter(|url| !url.is_empty()) {
            self.rpc.endpoint = url;
        }
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> SimResult<String> {
        toml::to_string_pretty(self).map_err(|e| SimulationError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SimulatorConfig::default();
        assert_eq!(config.rpc.endpoint, "http://localhost:8545");
        assert_eq!(config.block.chain_id, 1);
        assert_eq!(config.block.base_fee, 1_000_000_000);
        assert_eq!(config.default_gas_limit, 30_000_000);
    }

    #[test]
    fn test_config_serialize() {
        let config = SimulatorConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("endpoint"));
        assert!(toml_str.contains("chain_id"));
        assert_eq!(SimulatorConfig::from_toml_str(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
            default_gas_limit = 8000000

            [rpc]
            endpoint = "https://eth.example.org"

            [block]
            chain_id = 5
            coinbase = "0x00000000000000000000000000000000000000c0"
        "#;

        let config = SimulatorConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.rpc.endpoint, "https://eth.example.org");
        assert_eq!(config.rpc.timeout_secs, 30);
        assert_eq!(config.block.chain_id, 5);
        assert_eq!(config.block.coinbase, Address::from_low_u64_be(0xc0));
        assert_eq!(config.block.gas_limit, 30_000_000);
        assert_eq!(config.default_gas_limit, 8_000_000);
    }

    #[test]
    fn test_config_rejects_garbage() {
        let err = SimulatorConfig::from_toml_str("default_gas_limit = \"lots\"").unwrap_err();
        assert!(matches!(err, SimulationError::Config(_)));
    }

    #[test]
    fn test_endpoint_override() {
        let mut config = SimulatorConfig::default();
        config.apply_overrides(|key| {
            (key == RPC_URL_ENV).then(|| "http://10.0.0.7:8545".to_string())
        });
        assert_eq!(config.rpc.endpoint, "http://10.0.0.7:8545");

        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config.rpc.endpoint, "http://10.0.0.7:8545");
    }

    #[test]
    fn test_block_context() {
        let block = BlockConfig::default();
        let ctx = block.context(BlockTag::Number(17_000_000));
        assert_eq!(ctx.number, 17_000_000);
        assert_eq!(ctx.base_fee, U256::from(1_000_000_000u64));
        assert_eq!(block.context(BlockTag::Latest).number, 0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SimulatorConfig::load("/nonexistent/forksim.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/forksim.toml"));
    }
}
