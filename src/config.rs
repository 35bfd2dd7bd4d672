use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub zeropush_api_url: String,
    pub zeropush_auth_token: String,
    pub zeropush_channel: Option<String>,
    pub zeropush_timeout: Duration,
    pub api_bind_address: String,
    pub api_max_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            zeropush_api_url: lookup("ZEROPUSH_API_URL")
                .unwrap_or_else(|| "https://api.zeropush.com".to_string()),
            zeropush_auth_token: lookup("ZEROPUSH_AUTH_TOKEN")
                .context("ZEROPUSH_AUTH_TOKEN must be set")?,
            zeropush_channel: lookup("ZEROPUSH_CHANNEL").filter(|c| !c.trim().is_empty()),
            zeropush_timeout: Duration::from_secs(parse_or(&lookup, "ZEROPUSH_TIMEOUT_SECS", 10)?),
            api_bind_address: lookup("API_BIND_ADDRESS")
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            api_max_concurrency: parse_or(&lookup, "API_MAX_CONCURRENCY", 256)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/push"),
            ("ZEROPUSH_AUTH_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.zeropush_api_url, "https://api.zeropush.com");
        assert_eq!(config.zeropush_channel, None);
        assert_eq!(config.zeropush_timeout, Duration::from_secs(10));
        assert_eq!(config.api_bind_address, "0.0.0.0:8080");
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.api_max_concurrency, 256);
    }

    #[test]
    fn missing_auth_token_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[(
            "DATABASE_URL",
            "postgres://localhost/push",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("ZEROPUSH_AUTH_TOKEN"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/push"),
            ("ZEROPUSH_AUTH_TOKEN", "secret"),
            ("ZEROPUSH_CHANNEL", "likes-app"),
            ("ZEROPUSH_TIMEOUT_SECS", "3"),
            ("DATABASE_MAX_CONNECTIONS", "20"),
        ]))
        .unwrap();

        assert_eq!(config.zeropush_channel.as_deref(), Some("likes-app"));
        assert_eq!(config.zeropush_timeout, Duration::from_secs(3));
        assert_eq!(config.database_max_connections, 20);
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/push"),
            ("ZEROPUSH_AUTH_TOKEN", "secret"),
            ("DATABASE_MAX_CONNECTIONS", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));
    }
}
