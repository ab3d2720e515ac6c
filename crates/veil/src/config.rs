//! Deployment configuration.
//!
//! Loaded from a TOML file, then overridden from the environment:
//!
//! ```toml
//! [security]
//! system_key = "<64 hex chars>"
//!
//! [payments]
//! subscription = { months = 1 }
//! tier_policy = "exact_match"
//! intent_ttl_secs = 1800
//!
//! [monitor]
//! poll_interval_secs = 10
//! min_confirmations = 1
//! fetch_timeout_secs = 15
//!
//! [rpc]
//! url = "http://127.0.0.1:8232"
//! username = "zcashrpc"
//! password = "..."
//! timeout_secs = 15
//!
//! [storage]
//! db_path = "veil.db"
//! ```

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use veil_monitor::{MonitorConfig, RpcConfig};
use veil_perms::{SubscriptionPeriod, SystemKey, TierAccessPolicy};

use crate::processor::ProcessorConfig;
use crate::service::ServiceConfig;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VeilConfig {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub rpc: RpcSection,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Hex-encoded 32-byte key that seals every creator's master key.
    #[serde(default)]
    pub system_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default)]
    pub subscription: SubscriptionPeriod,
    #[serde(default)]
    pub tier_policy: TierAccessPolicy,
    #[serde(default = "default_intent_ttl")]
    pub intent_ttl_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            subscription: SubscriptionPeriod::default(),
            tier_policy: TierAccessPolicy::default(),
            intent_ttl_secs: default_intent_ttl(),
        }
    }
}

fn default_intent_ttl() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u32,
    #[serde(default = "default_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            min_confirmations: default_min_confirmations(),
            fetch_timeout_secs: default_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}

fn default_min_confirmations() -> u32 {
    1
}

fn default_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSection {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8232".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "veil.db".to_string()
}

impl VeilConfig {
    /// Load `path`, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading config");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides();
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Check values that parse but cannot run.
    pub fn validate(&self) -> Result<()> {
        self.monitor_config().validate()?;
        if self.rpc.timeout_secs == 0 {
            anyhow::bail!("rpc.timeout_secs must be non-zero");
        }
        Ok(())
    }

    /// Parse TOML without touching the environment.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("VEIL_SYSTEM_KEY") {
            self.security.system_key = Some(v);
        }
        if let Ok(v) = env::var("VEIL_RPC_URL") {
            self.rpc.url = v;
        }
        if let Ok(v) = env::var("VEIL_RPC_USER") {
            self.rpc.username = v;
        }
        if let Ok(v) = env::var("VEIL_RPC_PASSWORD") {
            self.rpc.password = v;
        }
        if let Ok(v) = env::var("VEIL_DB_PATH") {
            self.storage.db_path = v;
        }
    }

    /// Decode the configured system key.
    pub fn system_key(&self) -> Result<SystemKey> {
        let hex = self
            .security
            .system_key
            .as_deref()
            .context("security.system_key is not set")?;
        SystemKey::from_hex(hex).context("security.system_key is not a 32-byte hex key")
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            period: self.payments.subscription,
            intent_ttl: Duration::from_secs(self.payments.intent_ttl_secs),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.monitor.poll_interval_secs),
            min_confirmations: self.monitor.min_confirmations,
            fetch_timeout: Duration::from_secs(self.monitor.fetch_timeout_secs),
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            processor: self.processor_config(),
            tier_policy: self.payments.tier_policy,
            monitor: self.monitor_config(),
        }
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            url: self.rpc.url.clone(),
            username: self.rpc.username.clone(),
            password: self.rpc.password.clone(),
            timeout: Duration::from_secs(self.rpc.timeout_secs),
        }
    }
}
