use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

/// Port used when `TABILL_PORT` is unset
const DEFAULT_PORT: &str = "8787";

pub struct ServerConfig {
    pub port: u16,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
    /// Gateway base URL override, e.g. a local mock
    pub razorpay_api_url: Option<String>,
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            port: try_load("TABILL_PORT", DEFAULT_PORT)?,
            razorpay_key_id: var("RAZORPAY_KEY_ID"),
            razorpay_key_secret: var("RAZORPAY_KEY_SECRET"),
            razorpay_api_url: optional_var("RAZORPAY_API_URL"),
        })
    }

    /// Gateway credentials, when both halves are configured.
    pub fn gateway_keys(&self) -> Option<(String, String)> {
        match (&self.razorpay_key_id, &self.razorpay_key_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }
}

fn var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            warn!("Environment variable {key} not found");
            None
        }
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_keys_need_both_halves() {
        let config = ServerConfig {
            port: 8787,
            razorpay_key_id: Some("rzp_test_x".to_string()),
            razorpay_key_secret: None,
            razorpay_api_url: None,
        };
        assert_eq!(config.gateway_keys(), None);

        let config = ServerConfig {
            razorpay_key_secret: Some("secret".to_string()),
            ..config
        };
        assert_eq!(
            config.gateway_keys(),
            Some(("rzp_test_x".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_try_load_default_and_parse_error() {
        let port: u16 = try_load("TABILL_TEST_UNSET_PORT_VAR", "8787").expect("default");
        assert_eq!(port, 8787);
        assert!(try_load::<u16>("TABILL_TEST_UNSET_PORT_VAR", "not-a-port").is_err());
    }
}
