//! Node configuration: a TOML file with an in-code default and per-field
//! override, the same pattern the teacher uses for `MakerConfig`/
//! `TakerConfig` (spec.md 6 environment variables, SPEC_FULL.md 2).

use std::path::{Path, PathBuf};

use crate::{
    identity::DEFAULT_SESSION_TTL_SECS,
    settlement::{DEFAULT_MAKER_TTL_SECS, DEFAULT_SAFETY_GAP_SECS, DEFAULT_TAKER_TTL_SECS},
    utill::{get_data_dir, parse_field, parse_toml},
};

/// Node configuration. Every field has an environment-variable override
/// named in spec.md 6, falling back to the TOML file, falling back to the
/// compiled-in default.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Gossip/negotiation listening port.
    pub port: u16,
    /// HTTP/REST listening port (spec.md 6: 8080 Maker, 8081 Taker by
    /// convention, but not enforced — operators choose per instance).
    pub http_port: u16,
    /// Optional operator-supplied peer to dial at startup.
    pub bootstrap_peer: Option<String>,
    /// LAN discovery broadcast port, for local mDNS-like peer discovery
    /// (spec.md 4.5).
    pub discovery_port: u16,
    /// Message-bus connection string (spec.md 6); the in-process adapter is
    /// used regardless, since a NATS transport is out of scope (spec.md 1).
    pub bus_url: String,
    /// Root directory for node state.
    pub state_dir: PathBuf,
    pub session_ttl_secs: u64,
    pub maker_ttl_secs: u64,
    pub taker_ttl_secs: u64,
    pub safety_gap_secs: u64,
    /// Chain name this node locks funds on when it plays the maker role in
    /// a settlement (SPEC_FULL.md supplement: lets the HTTP wallet/lock
    /// routes resolve a request's `chain` string to a connector).
    pub maker_chain: String,
    /// Chain name this node locks funds on when it plays the taker role.
    pub taker_chain: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: 9000,
            http_port: 8080,
            bootstrap_peer: None,
            discovery_port: 9090,
            bus_url: "inprocess://local".to_string(),
            state_dir: get_data_dir(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            maker_ttl_secs: DEFAULT_MAKER_TTL_SECS,
            taker_ttl_secs: DEFAULT_TAKER_TTL_SECS,
            safety_gap_secs: DEFAULT_SAFETY_GAP_SECS,
            maker_chain: "zcash".to_string(),
            taker_chain: "starknet".to_string(),
        }
    }
}

impl NodeConfig {
    /// Loads config from `config_path` (default: `<state_dir>/config.toml`),
    /// creating a default file if none exists, then layers environment
    /// variables named in spec.md 6 on top (`PORT`, `BOOTSTRAP_PEER`,
    /// `BUS_URL`, `STATE_DIR`).
    pub fn load(config_path: Option<&Path>) -> std::io::Result<Self> {
        let default_config = Self::default();
        let default_path = default_config.state_dir.join("config.toml");
        let config_path = config_path.unwrap_or(&default_path);

        if !config_path.exists() || std::fs::metadata(config_path)?.len() == 0 {
            log::warn!(
                "node config file not found, creating default config file at path: {}",
                config_path.display()
            );
            default_config.write_to_file(config_path)?;
        }

        let config_map = parse_toml(config_path)?;
        let mut config = Self {
            port: parse_field(config_map.get("port"), default_config.port),
            http_port: parse_field(config_map.get("http_port"), default_config.http_port),
            bootstrap_peer: config_map.get("bootstrap_peer").cloned().or(default_config.bootstrap_peer),
            discovery_port: parse_field(config_map.get("discovery_port"), default_config.discovery_port),
            bus_url: config_map
                .get("bus_url")
                .cloned()
                .unwrap_or(default_config.bus_url.clone()),
            state_dir: default_config.state_dir.clone(),
            session_ttl_secs: parse_field(config_map.get("session_ttl_secs"), default_config.session_ttl_secs),
            maker_ttl_secs: parse_field(config_map.get("maker_ttl_secs"), default_config.maker_ttl_secs),
            taker_ttl_secs: parse_field(config_map.get("taker_ttl_secs"), default_config.taker_ttl_secs),
            safety_gap_secs: parse_field(config_map.get("safety_gap_secs"), default_config.safety_gap_secs),
            maker_chain: config_map
                .get("maker_chain")
                .cloned()
                .unwrap_or(default_config.maker_chain.clone()),
            taker_chain: config_map
                .get("taker_chain")
                .cloned()
                .unwrap_or(default_config.taker_chain.clone()),
        };

        if let Ok(port) = std::env::var("PORT") {
            config.port = parse_field(Some(&port), config.port);
        }
        if let Ok(peer) = std::env::var("BOOTSTRAP_PEER") {
            config.bootstrap_peer = Some(peer);
        }
        if let Ok(bus_url) = std::env::var("BUS_URL") {
            config.bus_url = bus_url;
        }
        if let Ok(state_dir) = std::env::var("STATE_DIR") {
            config.state_dir = PathBuf::from(state_dir);
        }

        Ok(config)
    }

    pub fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        let toml_data = format!(
            "port = {}\nhttp_port = {}\ndiscovery_port = {}\nbus_url = \"{}\"\nsession_ttl_secs = {}\nmaker_ttl_secs = {}\ntaker_ttl_secs = {}\nsafety_gap_secs = {}\nmaker_chain = \"{}\"\ntaker_chain = \"{}\"\n",
            self.port,
            self.http_port,
            self.discovery_port,
            self.bus_url,
            self.session_ttl_secs,
            self.maker_ttl_secs,
            self.taker_ttl_secs,
            self.safety_gap_secs,
            self.maker_chain,
            self.taker_chain,
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = NodeConfig::load(Some(Path::new("/nonexistent/otcswap-node-test.toml"))).unwrap();
        assert_eq!(config.port, NodeConfig::default().port);
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let dir = std::env::temp_dir();
        let path = dir.join("otcswap_node_config_test.toml");
        std::fs::write(&path, "port = 9500\n").unwrap();
        let config = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.port, 9500);
        assert_eq!(config.http_port, NodeConfig::default().http_port);
        std::fs::remove_file(&path).unwrap();
    }
}
