//! Configuration for a Post Fiat node.
//!
//! Two layers: `NetworkConfig` describes an XRPL network (endpoints, PFT
//! issuer), `NodeConfig` describes the operator's node (addresses, names,
//! auto-handshake set) and is loaded from a JSON file in the config
//! directory. `RuntimeConfig` carries process-level flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub mod constants;
pub mod requirements;

pub use constants::*;
pub use requirements::{AddressType, TransactionRequirements};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration file found at {0}")]
    MissingConfigFile(PathBuf),

    #[error("invalid node configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for an XRPL network (mainnet or testnet)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    /// PFT issuing account for this network
    pub issuer_address: String,
    /// WebSocket endpoints, tried in listed order
    pub websockets: Vec<String>,
    /// Public HTTPS JSON-RPC endpoint for one-shot queries
    pub public_rpc_url: String,
    pub local_rpc_url: Option<String>,
    pub local_ws_url: Option<String>,
    /// Explorer URL with a `{hash}` placeholder
    pub explorer_tx_url_mask: String,
}

impl NetworkConfig {
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            issuer_address: "rnQUEEg8yyjrwk9FhyXpKavHyCRJM9BDMW".to_string(),
            websockets: vec![
                "wss://xrpl.postfiat.org:6007".to_string(),
                "wss://xrplcluster.com".to_string(),
                "wss://xrpl.ws/".to_string(),
                "wss://s1.ripple.com/".to_string(),
                "wss://s2.ripple.com/".to_string(),
            ],
            public_rpc_url: "https://s2.ripple.com:51234".to_string(),
            local_rpc_url: Some("http://127.0.0.1:5005".to_string()),
            local_ws_url: None,
            explorer_tx_url_mask: "https://livenet.xrpl.org/transactions/{hash}/detailed"
                .to_string(),
        }
    }

    pub fn testnet() -> Self {
        Self {
            name: "testnet".to_string(),
            issuer_address: "rLX2tgumpiUE6kjr757Ao8HWiJzC8uuBSN".to_string(),
            websockets: vec!["wss://s.altnet.rippletest.net:51233".to_string()],
            public_rpc_url: "https://s.altnet.rippletest.net:51234".to_string(),
            local_rpc_url: None,
            local_ws_url: None,
            explorer_tx_url_mask: "https://testnet.xrpl.org/transactions/{hash}/detailed"
                .to_string(),
        }
    }

    /// Preferred JSON-RPC endpoint: the local node when available, else public.
    pub fn rpc_url(&self, has_local_node: bool) -> &str {
        match (&self.local_rpc_url, has_local_node) {
            (Some(local), true) => local,
            _ => &self.public_rpc_url,
        }
    }

    pub fn explorer_url(&self, tx_hash: &str) -> String {
        self.explorer_tx_url_mask.replace("{hash}", tx_hash)
    }
}

/// Configuration for a Post Fiat node, loaded from
/// `pft_node_{mainnet|testnet}_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_name: String,
    pub node_address: String,
    #[serde(default)]
    pub remembrancer_name: Option<String>,
    #[serde(default)]
    pub remembrancer_address: Option<String>,
    /// Addresses that auto-respond to handshakes
    #[serde(default)]
    pub auto_handshake_addresses: BTreeSet<String>,
    /// Schema extension plug-in identifiers, applied after core DDL
    #[serde(default)]
    pub schema_extensions: Vec<String>,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::MissingConfigFile(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        // The node's own address always auto-responds, as does the
        // remembrancer when configured.
        config.auto_handshake_addresses.insert(config.node_address.clone());
        if let (Some(addr), Some(_)) = (&config.remembrancer_address, &config.remembrancer_name) {
            config.auto_handshake_addresses.insert(addr.clone());
        }
        Ok(config)
    }

    /// Default config path for the given network under the config directory.
    pub fn default_path(network_name: &str) -> PathBuf {
        config_dir().join(format!("pft_node_{network_name}_config.json"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !is_classic_address(&self.node_address) {
            return Err(ConfigError::Invalid(format!(
                "node_address is not a classic address: {}",
                self.node_address
            )));
        }
        if let Some(addr) = &self.remembrancer_address {
            if !is_classic_address(addr) {
                return Err(ConfigError::Invalid(format!(
                    "remembrancer_address is not a classic address: {addr}"
                )));
            }
        }
        if self.node_name.trim().is_empty() {
            return Err(ConfigError::Invalid("node_name is empty".to_string()));
        }
        Ok(())
    }

    /// Credential key for the node wallet seed.
    pub fn node_seed_key(&self) -> String {
        format!("{}__v1xrpsecret", self.node_name)
    }

    /// Credential key for the remembrancer wallet seed, if configured.
    pub fn remembrancer_seed_key(&self) -> Option<String> {
        self.remembrancer_name
            .as_ref()
            .map(|name| format!("{name}_remembrancer__v1xrpsecret"))
    }

    /// Credential key for the PostgreSQL connection string.
    pub fn postgres_key(&self) -> String {
        format!("{}_postgresconnstring", self.node_name)
    }
}

/// Runtime configuration settings
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub use_testnet: bool,
    pub has_local_node: bool,
    /// Testnet only
    pub enable_reinitiations: bool,
    /// Testnet only
    pub use_openrouter_autorouter: bool,
    pub disable_pft_requirements: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            use_testnet: false,
            has_local_node: false,
            enable_reinitiations: false,
            use_openrouter_autorouter: false,
            disable_pft_requirements: false,
        }
    }
}

impl RuntimeConfig {
    pub fn network(&self) -> NetworkConfig {
        if self.use_testnet {
            NetworkConfig::testnet()
        } else {
            NetworkConfig::mainnet()
        }
    }

    /// Reinitiations are a testnet-only affordance.
    pub fn reinitiations_enabled(&self) -> bool {
        self.use_testnet && self.enable_reinitiations
    }
}

const XRPL_BASE58_ALPHABET: &str = "rpshnaf39wBUDNEGHJKLM4PQRST7VWXYZ2bcdeCg65jkm8oFqi1tuvAxyz";

/// Whether a string looks like an XRPL classic address: 25-35 chars from the
/// XRPL base58 alphabet, starting with `r`.
pub fn is_classic_address(address: &str) -> bool {
    address.len() >= 25
        && address.len() <= 35
        && address.starts_with('r')
        && address.chars().all(|c| XRPL_BASE58_ALPHABET.contains(c))
}

/// Directory holding credentials and node config files.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("postfiatcreds")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_defaults() {
        let mainnet = NetworkConfig::mainnet();
        assert_eq!(mainnet.issuer_address, "rnQUEEg8yyjrwk9FhyXpKavHyCRJM9BDMW");
        assert_eq!(mainnet.websockets.len(), 5);
        assert!(NetworkConfig::testnet().local_rpc_url.is_none());
    }

    #[test]
    fn rpc_url_prefers_local_node() {
        let mainnet = NetworkConfig::mainnet();
        assert_eq!(mainnet.rpc_url(true), "http://127.0.0.1:5005");
        assert_eq!(mainnet.rpc_url(false), "https://s2.ripple.com:51234");
        // Testnet has no local node configured
        assert_eq!(
            NetworkConfig::testnet().rpc_url(true),
            "https://s.altnet.rippletest.net:51234"
        );
    }

    #[test]
    fn explorer_url_substitutes_hash() {
        let url = NetworkConfig::mainnet().explorer_url("ABC123");
        assert_eq!(url, "https://livenet.xrpl.org/transactions/ABC123/detailed");
    }

    #[test]
    fn classic_address_validation() {
        assert!(is_classic_address("r4yc85M1hwsegVGZ1pawpZPwj65SVs8PzD"));
        assert!(!is_classic_address("x4yc85M1hwsegVGZ1pawpZPwj65SVs8PzD"));
        assert!(!is_classic_address("r0"));
        // 0, O, I, l are not in the XRPL alphabet
        assert!(!is_classic_address("r0OIl5M1hwsegVGZ1pawpZPwj65SVs8PzD"));
    }

    #[test]
    fn node_config_roundtrip_adds_auto_handshake_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pft_node_testnet_config.json");
        let config = NodeConfig {
            node_name: "postfiatfoundation".to_string(),
            node_address: "r4yc85M1hwsegVGZ1pawpZPwj65SVs8PzD".to_string(),
            remembrancer_name: Some("postfiatremembrancer".to_string()),
            remembrancer_address: Some("rJ1mBMhEBKack5uTQvM8vWoAntbufyG9Yn".to_string()),
            auto_handshake_addresses: BTreeSet::new(),
            schema_extensions: vec![],
        };
        config.save(&path).unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert!(loaded
            .auto_handshake_addresses
            .contains("r4yc85M1hwsegVGZ1pawpZPwj65SVs8PzD"));
        assert!(loaded
            .auto_handshake_addresses
            .contains("rJ1mBMhEBKack5uTQvM8vWoAntbufyG9Yn"));
        assert_eq!(
            loaded.node_seed_key(),
            "postfiatfoundation__v1xrpsecret"
        );
        assert_eq!(
            loaded.remembrancer_seed_key().unwrap(),
            "postfiatremembrancer_remembrancer__v1xrpsecret"
        );
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NodeConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingConfigFile(_)));
    }

    #[test]
    fn reinitiations_require_testnet() {
        let config = RuntimeConfig {
            enable_reinitiations: true,
            ..Default::default()
        };
        assert!(!config.reinitiations_enabled());
        let config = RuntimeConfig {
            use_testnet: true,
            enable_reinitiations: true,
            ..Default::default()
        };
        assert!(config.reinitiations_enabled());
    }
}
