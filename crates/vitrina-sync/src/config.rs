//! # Shop Configuration
//!
//! Configuration for a Vitrina client, customer storefront or staff desk.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VITRINA_BACKEND_URL=https://api.example.com                        │
//! │     VITRINA_ROLE=staff                                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/vitrina/vitrina.toml (Linux)                             │
//! │     ~/Library/Application Support/shop.vitrina.vitrina/vitrina.toml    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     customer role, localhost backend, generated device id              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Front desk"
//! role = "staff"
//!
//! [backend]
//! base_url = "https://api.example.com/"
//! api_token = "..."
//! request_timeout_secs = 15
//!
//! [polling]
//! stock_refresh_secs = 5
//! confirmation_poll_secs = 4
//! queue_refresh_secs = 10
//! proof_retry_secs = 15
//!
//! [proof]
//! max_bytes = 5242880
//!
//! [store]
//! utc_offset_minutes = -300
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Local, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Role
// =============================================================================

/// Which side of the protocol this device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// Storefront: cart, checkout, proof upload, confirmation polling.
    #[default]
    Customer,

    /// Operations desk: pending-payment queue, confirm/reject.
    Staff,
}

impl DeviceRole {
    pub fn is_staff(&self) -> bool {
        matches!(self, DeviceRole::Staff)
    }
}

impl std::fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRole::Customer => write!(f, "customer"),
            DeviceRole::Staff => write!(f, "staff"),
        }
    }
}

impl std::str::FromStr for DeviceRole {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customer" | "shop" | "storefront" => Ok(DeviceRole::Customer),
            "staff" | "desk" | "operator" => Ok(DeviceRole::Staff),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown role: '{}'. Valid options: customer, staff",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4). Generated on first run.
    pub id: String,

    #[serde(default = "default_device_name")]
    pub name: String,

    #[serde(default)]
    pub role: DeviceRole,
}

fn default_device_name() -> String {
    "Vitrina".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
            role: DeviceRole::default(),
        }
    }
}

// =============================================================================
// Backend Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the REST API. Endpoint paths are joined onto it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for the staff endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    /// Parsed base URL, always ending in `/` so relative joins keep the
    /// path prefix.
    pub fn url(&self) -> SyncResult<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SyncError::InvalidUrl(format!(
                "Backend URL must use http or https, got: {}",
                other
            ))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Polling Settings
// =============================================================================

/// Timer intervals for the background tasks, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_stock_refresh")]
    pub stock_refresh_secs: u64,

    #[serde(default = "default_confirmation_poll")]
    pub confirmation_poll_secs: u64,

    #[serde(default = "default_queue_refresh")]
    pub queue_refresh_secs: u64,

    #[serde(default = "default_proof_retry")]
    pub proof_retry_secs: u64,
}

fn default_stock_refresh() -> u64 {
    5
}
fn default_confirmation_poll() -> u64 {
    4
}
fn default_queue_refresh() -> u64 {
    10
}
fn default_proof_retry() -> u64 {
    15
}

impl Default for PollingSettings {
    fn default() -> Self {
        PollingSettings {
            stock_refresh_secs: default_stock_refresh(),
            confirmation_poll_secs: default_confirmation_poll(),
            queue_refresh_secs: default_queue_refresh(),
            proof_retry_secs: default_proof_retry(),
        }
    }
}

impl PollingSettings {
    pub fn stock_refresh(&self) -> Duration {
        Duration::from_secs(self.stock_refresh_secs)
    }

    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_secs(self.confirmation_poll_secs)
    }

    pub fn queue_refresh(&self) -> Duration {
        Duration::from_secs(self.queue_refresh_secs)
    }

    pub fn proof_retry(&self) -> Duration {
        Duration::from_secs(self.proof_retry_secs)
    }
}

// =============================================================================
// Proof / Store / Database
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofSettings {
    #[serde(default = "default_max_proof_bytes")]
    pub max_bytes: usize,
}

fn default_max_proof_bytes() -> usize {
    vitrina_core::DEFAULT_MAX_PROOF_BYTES
}

impl Default for ProofSettings {
    fn default() -> Self {
        ProofSettings {
            max_bytes: default_max_proof_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Offset that defines the store's business day. Host offset if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

impl StoreSettings {
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .unwrap_or_else(|| Local::now().offset().fix())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Platform data dir if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub polling: PollingSettings,

    #[serde(default)]
    pub proof: ProofSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl ShopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (vitrina.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns the defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("device.id must not be empty".into()));
        }

        self.backend.url()?;

        if self.backend.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "backend.request_timeout_secs must be greater than 0".into(),
            ));
        }

        let p = &self.polling;
        for (name, secs) in [
            ("stock_refresh_secs", p.stock_refresh_secs),
            ("confirmation_poll_secs", p.confirmation_poll_secs),
            ("queue_refresh_secs", p.queue_refresh_secs),
            ("proof_retry_secs", p.proof_retry_secs),
        ] {
            if secs == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "polling.{name} must be greater than 0"
                )));
            }
        }

        if self.proof.max_bytes == 0 {
            return Err(SyncError::InvalidConfig(
                "proof.max_bytes must be greater than 0".into(),
            ));
        }

        if let Some(minutes) = self.store.utc_offset_minutes {
            if FixedOffset::east_opt(minutes * 60).is_none() {
                return Err(SyncError::InvalidConfig(format!(
                    "store.utc_offset_minutes out of range: {minutes}"
                )));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("VITRINA_BACKEND_URL") {
            debug!(url = %url, "Overriding backend URL from environment");
            self.backend.base_url = url;
        }

        if let Ok(token) = std::env::var("VITRINA_API_TOKEN") {
            self.backend.api_token = Some(token).filter(|t| !t.is_empty());
        }

        if let Ok(path) = std::env::var("VITRINA_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(role) = std::env::var("VITRINA_ROLE") {
            match role.parse() {
                Ok(parsed) => self.device.role = parsed,
                Err(_) => warn!(role = %role, "Unknown role in environment"),
            }
        }

        if let Ok(secs) = std::env::var("VITRINA_STOCK_REFRESH_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.polling.stock_refresh_secs = s;
            }
        }

        if let Ok(secs) = std::env::var("VITRINA_POLL_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.polling.confirmation_poll_secs = s;
            }
        }

        if let Ok(minutes) = std::env::var("VITRINA_UTC_OFFSET_MINUTES") {
            if let Ok(m) = minutes.parse::<i32>() {
                self.store.utc_offset_minutes = Some(m);
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("shop", "vitrina", "vitrina")
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("vitrina.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn role(&self) -> DeviceRole {
        self.device.role
    }

    /// Configured database path, or `vitrina.db` in the platform data dir.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("vitrina.db"))
                .unwrap_or_else(|| PathBuf::from("vitrina.db"))
        })
    }

    /// Current instant in the store's offset.
    pub fn store_now(&self) -> chrono::DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.store.offset())
    }
}
