use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;

use crate::error::ConfigError;
use crate::wallet::Account;

pub const DEFAULT_ENV_FILE: &str = ".env.emu";
pub const LOCALNET_NODE_URL: &str = "http://127.0.0.1:8080";

pub const NETWORK: &str = "NETWORK";
pub const NODE_URL: &str = "NODE_URL";
pub const ACCOUNT_SECRET: &str = "ACCOUNT_SECRET";
pub const CREATOR: &str = "CREATOR";
pub const APP_ID: &str = "APP_ID";
pub const APP_ADDRESS: &str = "APP_ADDRESS";
pub const ASSET_ID: &str = "ASSET_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Localnet,
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Localnet => "localnet",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "localnet" => Ok(Network::Localnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(ConfigError::InvalidNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value settings persisted in `.env.emu`, loaded once at startup.
#[derive(Debug, Clone)]
pub struct EmuConfig {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl EmuConfig {
    /// Reads `path`; a missing file is an empty config.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let mut values = BTreeMap::new();
        if path.exists() {
            for item in dotenvy::from_path_iter(&path)? {
                let (key, value) = item?;
                values.insert(key, value);
            }
        }
        debug!("loaded {} keys from {}", values.len(), path.display());
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Sets `key` and rewrites the file.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value.into());
        self.save()
    }

    fn save(&self) -> Result<(), ConfigError> {
        let mut out = String::new();
        for (key, value) in &self.values {
            out.push_str(&format!("{key}='{}'\n", value.replace('\'', "")));
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, out)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn require(&self, key: &'static str) -> Result<&str, ConfigError> {
        self.get(key).ok_or(ConfigError::MissingKey(key))
    }

    fn require_u64(&self, key: &'static str) -> Result<u64, ConfigError> {
        let raw = self.require(key)?;
        raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        })
    }

    pub fn network(&self) -> Result<Network, ConfigError> {
        self.require(NETWORK)?.parse()
    }

    /// `NODE_URL`, defaulting to the local node on localnet.
    pub fn node_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = self.get(NODE_URL) {
            return Ok(url.trim_end_matches('/').to_string());
        }
        match self.network()? {
            Network::Localnet => Ok(LOCALNET_NODE_URL.to_string()),
            _ => Err(ConfigError::MissingKey(NODE_URL)),
        }
    }

    pub fn account(&self) -> Result<Account, ConfigError> {
        let secret = self.require(ACCOUNT_SECRET)?;
        Account::from_secret_hex(secret).map_err(|_| ConfigError::InvalidValue {
            key: ACCOUNT_SECRET,
            value: "<redacted>".to_string(),
        })
    }

    pub fn app_id(&self) -> Result<u64, ConfigError> {
        self.require_u64(APP_ID)
    }

    pub fn asset_id(&self) -> Result<u64, ConfigError> {
        self.require_u64(ASSET_ID)
    }

    pub fn creator(&self) -> Result<&str, ConfigError> {
        self.require(CREATOR)
    }

    pub fn app_address(&self) -> Result<&str, ConfigError> {
        self.require(APP_ADDRESS)
    }

    /// Fails if an app has already been deployed from this config.
    pub fn ensure_not_deployed(&self) -> Result<(), ConfigError> {
        match self.get(APP_ID) {
            Some(_) => Err(ConfigError::AlreadyDeployed(self.app_id()?)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn temp_path() -> PathBuf {
        static N: AtomicU32 = AtomicU32::new(0);
        std::env::temp_dir().join(format!(
            "emu-config-{}-{}.env",
            std::process::id(),
            N.fetch_add(1, Ordering::SeqCst)
        ))
    }

    #[test]
    fn network_names() {
        assert_eq!("localnet".parse::<Network>().unwrap(), Network::Localnet);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert!(matches!(
            "devnet".parse::<Network>(),
            Err(ConfigError::InvalidNetwork(n)) if n == "devnet"
        ));
        assert_eq!(Network::Testnet.to_string(), "testnet");
    }

    #[test]
    fn missing_file_is_empty() {
        let config = EmuConfig::load(temp_path()).unwrap();
        assert!(config.get(APP_ID).is_none());
        assert!(matches!(config.app_id(), Err(ConfigError::MissingKey(APP_ID))));
        assert!(matches!(config.network(), Err(ConfigError::MissingKey(NETWORK))));
    }

    #[test]
    fn set_persists_and_reloads() {
        let path = temp_path();
        let mut config = EmuConfig::load(&path).unwrap();
        config.set(NETWORK, "localnet").unwrap();
        config.set(APP_ID, "1001").unwrap();
        config.set(APP_ADDRESS, "ab12").unwrap();

        let reloaded = EmuConfig::load(&path).unwrap();
        assert_eq!(reloaded.network().unwrap(), Network::Localnet);
        assert_eq!(reloaded.app_id().unwrap(), 1001);
        assert_eq!(reloaded.app_address().unwrap(), "ab12");
        assert!(matches!(
            reloaded.ensure_not_deployed(),
            Err(ConfigError::AlreadyDeployed(1001))
        ));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn node_url_defaults_only_on_localnet() {
        let path = temp_path();
        let mut config = EmuConfig::load(&path).unwrap();
        config.set(NETWORK, "localnet").unwrap();
        assert_eq!(config.node_url().unwrap(), LOCALNET_NODE_URL);

        config.set(NETWORK, "testnet").unwrap();
        assert!(matches!(config.node_url(), Err(ConfigError::MissingKey(NODE_URL))));

        config.set(NODE_URL, "http://node.example:9000/").unwrap();
        assert_eq!(config.node_url().unwrap(), "http://node.example:9000");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn bad_numbers_and_secrets() {
        let path = temp_path();
        let mut config = EmuConfig::load(&path).unwrap();
        config.set(ASSET_ID, "abc").unwrap();
        assert!(matches!(
            config.asset_id(),
            Err(ConfigError::InvalidValue { key: ASSET_ID, .. })
        ));

        config.set(ACCOUNT_SECRET, "not-hex").unwrap();
        assert!(config.account().is_err());

        let account = Account::generate();
        config.set(ACCOUNT_SECRET, account.secret_hex()).unwrap();
        assert_eq!(config.account().unwrap().address(), account.address());

        fs::remove_file(&path).unwrap();
    }
}
