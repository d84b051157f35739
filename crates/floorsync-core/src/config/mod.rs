//! Store configuration.
//!
//! `StoreConfig` is consumed once at construction. Values can come from code
//! (builder methods), from a serialized document, or from `FLOORSYNC_*`
//! environment variables.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::normalize_text_option;
use crate::{Error, Result};

const DEFAULT_STORAGE_KEY: &str = "floorsync.records";
const DEFAULT_MAX_STORAGE_SIZE_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;
const DEFAULT_RETRY_THRESHOLD: u32 = 3;
const DEFAULT_EVICTION_PERCENT: u8 = 10;

/// Configuration for an offline store instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Key the serialized store is persisted under
    pub storage_key: String,
    /// Serialized size ceiling enforced by the quota guard
    pub max_storage_size_bytes: usize,
    /// Interval between scheduled sync passes while online
    pub sync_interval_ms: u64,
    /// Consecutive delivery failures before a record becomes conflicted
    pub retry_threshold: u32,
    /// Share of records (oldest first) evicted when over the ceiling
    pub eviction_percent: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            max_storage_size_bytes: DEFAULT_MAX_STORAGE_SIZE_BYTES,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            retry_threshold: DEFAULT_RETRY_THRESHOLD,
            eviction_percent: DEFAULT_EVICTION_PERCENT,
        }
    }
}

impl StoreConfig {
    /// Set the storage key
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Set the quota ceiling in bytes
    #[must_use]
    pub const fn with_max_storage_size_bytes(mut self, bytes: usize) -> Self {
        self.max_storage_size_bytes = bytes;
        self
    }

    /// Set the scheduled sync interval
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the retry threshold
    #[must_use]
    pub const fn with_retry_threshold(mut self, threshold: u32) -> Self {
        self.retry_threshold = threshold;
        self
    }

    /// Set the eviction percentage
    #[must_use]
    pub const fn with_eviction_percent(mut self, percent: u8) -> Self {
        self.eviction_percent = percent;
        self
    }

    /// Scheduled sync interval as a `Duration`
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if normalize_text_option(Some(self.storage_key.clone())).is_none() {
            return Err(Error::Config("storage_key must not be empty".to_string()));
        }
        if self.max_storage_size_bytes == 0 {
            return Err(Error::Config(
                "max_storage_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.sync_interval_ms == 0 {
            return Err(Error::Config(
                "sync_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.retry_threshold == 0 {
            return Err(Error::Config(
                "retry_threshold must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.eviction_percent) {
            return Err(Error::Config(
                "eviction_percent must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a configuration from `FLOORSYNC_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            storage_key: normalize_text_option(lookup("FLOORSYNC_STORAGE_KEY"))
                .unwrap_or(defaults.storage_key),
            max_storage_size_bytes: parse_or_default(
                &lookup,
                "FLOORSYNC_MAX_STORAGE_BYTES",
                defaults.max_storage_size_bytes,
            )?,
            sync_interval_ms: parse_or_default(
                &lookup,
                "FLOORSYNC_SYNC_INTERVAL_MS",
                defaults.sync_interval_ms,
            )?,
            retry_threshold: parse_or_default(
                &lookup,
                "FLOORSYNC_RETRY_THRESHOLD",
                defaults.retry_threshold,
            )?,
            eviction_percent: parse_or_default(
                &lookup,
                "FLOORSYNC_EVICTION_PERCENT",
                defaults.eviction_percent,
            )?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_or_default<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T> {
    match normalize_text_option(lookup(name)) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}
