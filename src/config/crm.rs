//! CRM connection settings loaded from environment variables.
//!
//! The access token is only ever read from the environment (or `.env`), never
//! from the metrics TOML file.

use crate::errors::{Error, Result};

/// Default base URL of the CRM REST API.
pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

/// Connection settings for the CRM gateway.
#[derive(Debug, Clone)]
pub struct CrmConfig {
    /// Base URL of the CRM API, without trailing slash
    pub base_url: String,
    /// Bearer token for the private app
    pub access_token: String,
    /// How many times a rate-limited request is retried
    pub max_retries: u32,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

/// Gets the CRM base URL from `CRM_API_BASE_URL` or falls back to the default.
#[must_use]
pub fn get_base_url() -> String {
    std::env::var("CRM_API_BASE_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| Error::Config {
            message: format!("{name} must be a number, got {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Loads the CRM settings from the environment.
///
/// `CRM_ACCESS_TOKEN` is required; `CRM_API_BASE_URL`, `CRM_MAX_RETRIES` and
/// `CRM_REQUEST_TIMEOUT_SECS` are optional.
///
/// # Errors
/// Returns `Error::Config` if the token is missing or a numeric variable
/// does not parse.
pub fn load_crm_config() -> Result<CrmConfig> {
    let access_token = std::env::var("CRM_ACCESS_TOKEN").map_err(|_| Error::Config {
        message: "CRM_ACCESS_TOKEN is not set".to_string(),
    })?;
    if access_token.trim().is_empty() {
        return Err(Error::Config {
            message: "CRM_ACCESS_TOKEN is empty".to_string(),
        });
    }

    Ok(CrmConfig {
        base_url: get_base_url(),
        access_token,
        max_retries: parse_env_or("CRM_MAX_RETRIES", 3)?,
        request_timeout_secs: parse_env_or("CRM_REQUEST_TIMEOUT_SECS", 30)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_or_uses_default_when_unset() -> Result<()> {
        let value: u32 = parse_env_or("CRM_METRICS_TEST_UNSET_VARIABLE", 7)?;
        assert_eq!(value, 7);
        Ok(())
    }
}
