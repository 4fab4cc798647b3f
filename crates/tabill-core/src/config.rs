//! Application configuration management.
//!
//! Configuration holds the hosted backend location, the application origin
//! fronted by the offline shell, and the last used sign-in email.
//!
//! Configuration is stored at `~/.config/tabill/config.json`. Environment
//! variables override the stored values.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tabill";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_SUPABASE_URL: &str = "https://tabill.supabase.co";
const DEFAULT_APP_ORIGIN: &str = "https://app.tabill.in";

const ENV_SUPABASE_URL: &str = "TABILL_SUPABASE_URL";
const ENV_SUPABASE_ANON_KEY: &str = "TABILL_SUPABASE_ANON_KEY";
const ENV_APP_ORIGIN: &str = "TABILL_APP_ORIGIN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: Option<String>,
    /// Origin the offline shell fronts; only its responses are cached.
    pub app_origin: String,
    pub last_email: Option<String>,
    /// Store shell buckets on disk instead of in memory.
    pub shell_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: DEFAULT_SUPABASE_URL.to_string(),
            supabase_anon_key: None,
            app_origin: DEFAULT_APP_ORIGIN.to_string(),
            last_email: None,
            shell_cache: true,
        }
    }
}

impl Config {
    /// Load the stored config and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_SUPABASE_URL) {
            debug!(url = %url, "Supabase URL overridden from environment");
            self.supabase_url = url;
        }
        if let Some(key) = lookup(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = Some(key);
        }
        if let Some(origin) = lookup(ENV_APP_ORIGIN) {
            debug!(origin = %origin, "App origin overridden from environment");
            self.app_origin = origin;
        }
        self.supabase_url = self.supabase_url.trim_end_matches('/').to_string();
        self.app_origin = self.app_origin.trim_end_matches('/').to_string();
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Directory holding local persistent storage.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides_and_trims_trailing_slash() {
        let env: HashMap<&str, &str> = [
            (ENV_SUPABASE_URL, "http://localhost:54321/"),
            (ENV_APP_ORIGIN, "http://localhost:5173/"),
            (ENV_SUPABASE_ANON_KEY, "anon"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.supabase_url, "http://localhost:54321");
        assert_eq!(config.app_origin, "http://localhost:5173");
        assert_eq!(config.supabase_anon_key.as_deref(), Some("anon"));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"last_email":"a@b.in"}"#)
            .expect("Failed to parse partial config");
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
        assert!(config.shell_cache);
        assert_eq!(config.last_email.as_deref(), Some("a@b.in"));
    }
}
