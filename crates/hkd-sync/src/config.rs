//! # Sync Configuration
//!
//! Configuration for the sync engine, loaded from a TOML file with serde
//! defaults for every field.
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Quầy chính"
//!
//! # Omit owner_id on the admin/managing device to sync every owner
//! owner_id = "owner-uuid"
//!
//! [sync]
//! interval_secs = 30
//! batch_size = 100
//! max_attempts = 10
//! backoff_base_ms = 2000
//! backoff_cap_ms = 300000
//! retention_days = 7
//! tombstone_ttl_days = 30
//! product_layout = "nested"   # nested | flat
//!
//! [remote]
//! base_url = "https://hkd-pos.example.firebaseio.com"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Product Layout
// =============================================================================

/// How products are addressed on the remote side.
///
/// Nested (the default) addresses a product *through its owning category*;
/// a product write without a known category id must fail fast rather than
/// land on a wrong path. Flat keeps products in their own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductLayout {
    #[default]
    Nested,
    Flat,
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Identity of this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4), auto-generated on first run.
    pub id: String,

    /// Human-readable device name.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "HKD Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between periodic sync passes (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Maximum outbox entries drained per push phase.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Push attempts per outbox entry before it moves to the dead letter.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Base delay for the capped exponential retry backoff (milliseconds).
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: i64,

    /// Cap for the retry backoff (milliseconds).
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: i64,

    /// How long synced outbox entries are retained before cleanup (days).
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Remote tombstones older than this are purged by whichever device
    /// observes them during pull. `None` disables garbage collection.
    #[serde(default = "default_tombstone_ttl")]
    pub tombstone_ttl_days: Option<u32>,

    /// Remote product addressing layout.
    #[serde(default)]
    pub product_layout: ProductLayout,
}

fn default_interval() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    100
}

fn default_max_attempts() -> i64 {
    10
}

fn default_backoff_base() -> i64 {
    2_000
}

fn default_backoff_cap() -> i64 {
    300_000
}

fn default_retention_days() -> u32 {
    7
}

fn default_tombstone_ttl() -> Option<u32> {
    Some(30)
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            retention_days: default_retention_days(),
            tombstone_ttl_days: default_tombstone_ttl(),
            product_layout: ProductLayout::default(),
        }
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Remote store connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the hosted realtime database (REST transport).
    /// Absent when the remote store is injected directly (tests, embedded).
    #[serde(default)]
    pub base_url: Option<String>,
}

// =============================================================================
// Sync Config
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    /// Owner scope: an HKD storefront device syncs one owner; the
    /// admin/managing device leaves this unset and syncs all owners.
    #[serde(default)]
    pub owner_id: Option<String>,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub remote: RemoteSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            device: DeviceConfig::default(),
            owner_id: None,
            sync: SyncSettings::default(),
            remote: RemoteSettings::default(),
        }
    }
}

impl SyncConfig {
    /// Loads config from the given path, falling back to the platform config
    /// directory, falling back to defaults. A missing file is not an error.
    pub fn load_or_default(path: Option<PathBuf>) -> Self {
        let path = path.or_else(Self::default_config_path);

        let Some(path) = path else {
            return SyncConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded sync config");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Bad sync config, using defaults");
                    SyncConfig::default()
                }
            },
            Err(_) => SyncConfig::default(),
        }
    }

    /// Saves the config as TOML to the given path (parent directories are
    /// created as needed).
    pub fn save(&self, path: &PathBuf) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(path = %path.display(), "Saved sync config");
        Ok(())
    }

    /// Platform config file location (`.../hkd-pos/sync.toml`).
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("vn", "hkd", "hkd-pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be positive".into(),
            ));
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig("batch_size must be positive".into()));
        }

        if self.sync.max_attempts <= 0 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be positive".into(),
            ));
        }

        if let Some(url) = &self.remote.base_url {
            url::Url::parse(url)?;
        }

        Ok(())
    }

    /// Capped exponential backoff delay for the given attempt count.
    ///
    /// attempt 0 → base, attempt 1 → 2×base, … capped at `backoff_cap_ms`.
    pub fn backoff_ms(&self, attempts: i64) -> i64 {
        let shift = attempts.clamp(0, 30) as u32;
        self.sync
            .backoff_base_ms
            .saturating_mul(1_i64 << shift)
            .min(self.sync.backoff_cap_ms)
    }

    /// Retention cutoff in milliseconds for synced outbox entries.
    pub fn retention_ms(&self) -> i64 {
        i64::from(self.sync.retention_days) * 24 * 60 * 60 * 1_000
    }

    /// Tombstone TTL in milliseconds, if garbage collection is enabled.
    pub fn tombstone_ttl_ms(&self) -> Option<i64> {
        self.sync
            .tombstone_ttl_days
            .map(|days| i64::from(days) * 24 * 60 * 60 * 1_000)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync.interval_secs, 30);
        assert_eq!(config.sync.max_attempts, 10);
        assert_eq!(config.sync.product_layout, ProductLayout::Nested);
        assert!(config.owner_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = SyncConfig::default();
        assert_eq!(config.backoff_ms(0), 2_000);
        assert_eq!(config.backoff_ms(1), 4_000);
        assert_eq!(config.backoff_ms(2), 8_000);
        assert_eq!(config.backoff_ms(20), 300_000);
        assert_eq!(config.backoff_ms(62), 300_000); // no overflow
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SyncConfig::default();
        config.sync.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.remote.base_url = Some("not a url".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_with_partial_file() {
        let parsed: SyncConfig = toml::from_str(
            r#"
            owner_id = "o-1"

            [sync]
            interval_secs = 5
            product_layout = "flat"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.owner_id.as_deref(), Some("o-1"));
        assert_eq!(parsed.sync.interval_secs, 5);
        assert_eq!(parsed.sync.product_layout, ProductLayout::Flat);
        // Unspecified fields take defaults
        assert_eq!(parsed.sync.batch_size, 100);
    }
}
