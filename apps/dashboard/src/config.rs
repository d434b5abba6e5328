use std::{fs, time::Duration};

use client_core::DEFAULT_SNAPSHOT_SLOT;
use serde::Deserialize;
use storage::normalize_database_url;

const SETTINGS_FILE: &str = "dashboard.toml";
const DEFAULT_CACHE_URL: &str = "sqlite://./data/dashboard-cache.db";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSettings {
    /// Record service base url; `None` runs purely against the local cache.
    pub server_url: Option<String>,
    pub cache_url: String,
    pub cache_slot: String,
    pub request_timeout_secs: u64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            cache_url: DEFAULT_CACHE_URL.into(),
            cache_slot: DEFAULT_SNAPSHOT_SLOT.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl DashboardSettings {
    pub fn cache_database_url(&self) -> String {
        normalize_database_url(&self.cache_url, DEFAULT_CACHE_URL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Values given on the command line; they win over every other source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub cache_url: Option<String>,
    pub offline: bool,
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    cache_url: Option<String>,
    cache_slot: Option<String>,
    request_timeout_secs: Option<u64>,
}

pub fn load_settings(overrides: &CliOverrides) -> DashboardSettings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    resolve_settings(file.as_deref(), |key| std::env::var(key).ok(), overrides)
}

/// Defaults, then `dashboard.toml`, then environment, then flags.
fn resolve_settings(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
    overrides: &CliOverrides,
) -> DashboardSettings {
    let mut settings = DashboardSettings::default();

    if let Some(raw) = file {
        match toml::from_str::<FileSettings>(raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.server_url {
                    settings.server_url = Some(v);
                }
                if let Some(v) = file_cfg.cache_url {
                    settings.cache_url = v;
                }
                if let Some(v) = file_cfg.cache_slot {
                    settings.cache_slot = v;
                }
                if let Some(v) = file_cfg.request_timeout_secs {
                    settings.request_timeout_secs = v;
                }
            }
            Err(error) => tracing::warn!(%error, "ignoring malformed {SETTINGS_FILE}"),
        }
    }

    if let Some(v) = env("PURIFIER_SERVER_URL") {
        settings.server_url = Some(v);
    }
    if let Some(v) = env("PURIFIER_CACHE_URL") {
        settings.cache_url = v;
    }
    if let Some(v) = env("PURIFIER_CACHE_SLOT") {
        settings.cache_slot = v;
    }
    if let Some(raw) = env("PURIFIER_TIMEOUT_SECS") {
        match raw.trim().parse() {
            Ok(v) => settings.request_timeout_secs = v,
            Err(error) => tracing::warn!(%error, value = %raw, "ignoring PURIFIER_TIMEOUT_SECS"),
        }
    }

    if let Some(v) = &overrides.server_url {
        settings.server_url = Some(v.clone());
    }
    if let Some(v) = &overrides.cache_url {
        settings.cache_url = v.clone();
    }

    // A blank url disables the record service just like --offline.
    settings.server_url = settings
        .server_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty() && !overrides.offline);
    if settings.cache_slot.trim().is_empty() {
        settings.cache_slot = DEFAULT_SNAPSHOT_SLOT.into();
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
