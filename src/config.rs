//! Connector configuration - passed from higher layers

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PROTOCOL: &str = "cardano-connector";
pub const DEFAULT_PORT: u16 = 8915;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Preprod,
    Preview,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Preprod => "preprod",
            Network::Preview => "preview",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Some(Network::Mainnet),
            "preprod" | "testnet" => Some(Network::Preprod),
            "preview" => Some(Network::Preview),
            _ => None,
        }
    }

    /// Network id carried in address headers.
    pub fn network_id(&self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Preprod | Network::Preview => 0,
        }
    }
}

/// Ledger constants the selection and collateral engines work against.
/// All amounts in lovelace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolParams {
    pub min_utxo_value: u64,
    pub max_collateral: u64,
    pub default_collateral: u64,
    /// Collateral candidates may exceed the required amount by at most this much.
    pub collateral_surplus: u64,
    pub fee_a: u64,
    pub fee_b: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_utxo_value: 1_000_000,
            max_collateral: 5_000_000,
            default_collateral: 2_000_000,
            collateral_surplus: 2_000_000,
            fee_a: 44,
            fee_b: 155_381,
        }
    }
}

impl ProtocolParams {
    pub fn linear_fee(&self, size: u64) -> u64 { self.fee_a.saturating_mul(size).saturating_add(self.fee_b) }
}

/// Connector configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub app: String,
    pub protocol: String,
    pub network: Network,
    pub params: ProtocolParams,
    pub data_dir: Option<PathBuf>,
    pub port: u16,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            app: "dapp-connector".into(),
            protocol: DEFAULT_PROTOCOL.into(),
            network: Network::default(),
            params: ProtocolParams::default(),
            data_dir: None,
            port: DEFAULT_PORT,
        }
    }
}

impl ConnectorConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }
    pub fn with_network(mut self, network: Network) -> Self { self.network = network; self }
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self { self.protocol = protocol.into(); self }
    pub fn with_params(mut self, params: ProtocolParams) -> Self { self.params = params; self }
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self { self.data_dir = Some(path.into()); self }
    pub fn with_port(mut self, port: u16) -> Self { self.port = port; self }

    /// `<data_dir>` if set, else `$DAPP_CONNECTOR_ROOT/<app>`, else the
    /// platform local data dir.
    pub fn data_root(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        let root = std::env::var("DAPP_CONNECTOR_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")));
        root.join(&self.app)
    }

    pub fn storage_dir(&self) -> PathBuf { self.data_root().join("state") }

    pub fn wallets_dir(&self) -> PathBuf { self.data_root().join("wallets") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert_eq!(Network::from_str(" Mainnet "), Some(Network::Mainnet));
        assert_eq!(Network::from_str("preview").map(|n| n.network_id()), Some(0));
        assert_eq!(Network::Mainnet.network_id(), 1);
        assert!(Network::from_str("regtest").is_none());
    }

    #[test]
    fn test_builder_and_fee() {
        let cfg = ConnectorConfig::new("app").with_protocol("p").with_data_dir("/tmp/x").with_port(1);
        assert_eq!(cfg.data_root(), PathBuf::from("/tmp/x"));
        assert_eq!(cfg.storage_dir(), PathBuf::from("/tmp/x/state"));
        assert_eq!(cfg.protocol, "p");
        assert_eq!(ProtocolParams::default().linear_fee(100), 44 * 100 + 155_381);
    }
}
