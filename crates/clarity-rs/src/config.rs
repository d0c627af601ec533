//! Environment configuration with fail-fast validation.
//!
//! [`ClarityConfig`] gathers the Azure OpenAI connection settings and the two
//! on-disk roots the resolver reads from. A `.env` file in the working
//! directory is loaded first when present, so local development works without
//! exporting variables by hand.

use std::path::PathBuf;
use std::time::Duration;

pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_API_KEY: &str = "AZURE_OPENAI_KEY";
pub const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
pub const ENV_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";
pub const ENV_MODULES_DIR: &str = "CLARITY_MODULES_DIR";
pub const ENV_PROMPTS_DIR: &str = "CLARITY_PROMPTS_DIR";
pub const ENV_TIMEOUT_SECS: &str = "CLARITY_REQUEST_TIMEOUT_SECS";

/// Configuration problem detected at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {key}")]
    Missing { key: &'static str },
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Settings for one host process.
#[derive(Debug, Clone)]
pub struct ClarityConfig {
    /// Azure resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    pub api_key: String,
    /// REST API version sent as the `api-version` query parameter.
    pub api_version: String,
    /// Deployment (model) name requests are routed to.
    pub deployment: String,
    /// Root for numeric modules. Default: `modules`.
    pub modules_dir: PathBuf,
    /// Root for dotted-path prompt fragments. Default: `prompts`.
    pub prompts_dir: PathBuf,
    /// Per-request timeout. Default: none.
    pub request_timeout: Option<Duration>,
}

impl ClarityConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case outside local development.
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing { key })
        };
        let optional = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let endpoint = required(ENV_ENDPOINT)?;
        let api_key = required(ENV_API_KEY)?;
        let api_version = required(ENV_API_VERSION)?;
        let deployment = required(ENV_DEPLOYMENT)?;

        let request_timeout = match optional(ENV_TIMEOUT_SECS) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: ENV_TIMEOUT_SECS,
                        value: raw,
                    });
                }
            },
            None => None,
        };

        let (modules_dir, prompts_dir) = data_dirs(&lookup);
        Ok(Self {
            endpoint,
            api_key,
            api_version,
            deployment,
            modules_dir,
            prompts_dir,
            request_timeout,
        })
    }
}

/// Module and prompt roots from the environment, without requiring any
/// Azure settings. Used by commands that only read local files.
pub fn data_dirs_from_env() -> (PathBuf, PathBuf) {
    dotenv::dotenv().ok();
    data_dirs(|key| std::env::var(key).ok())
}

fn data_dirs(lookup: impl Fn(&str) -> Option<String>) -> (PathBuf, PathBuf) {
    let dir = |key: &str, default: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from(default), PathBuf::from)
    };
    (
        dir(ENV_MODULES_DIR, "modules"),
        dir(ENV_PROMPTS_DIR, "prompts"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_ENDPOINT, "https://example.openai.azure.com"),
            (ENV_API_KEY, "secret"),
            (ENV_API_VERSION, "2024-06-01"),
            (ENV_DEPLOYMENT, "gpt-4o"),
        ]
    }

    #[test]
    fn defaults_applied_for_optional_values() {
        let config = ClarityConfig::from_lookup(lookup_from(&required_pairs())).unwrap();
        assert_eq!(config.deployment, "gpt-4o");
        assert_eq!(config.modules_dir, PathBuf::from("modules"));
        assert_eq!(config.prompts_dir, PathBuf::from("prompts"));
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn missing_required_value_names_the_key() {
        let pairs: Vec<_> = required_pairs()
            .into_iter()
            .filter(|(k, _)| *k != ENV_API_VERSION)
            .collect();
        let err = ClarityConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing { key: ENV_API_VERSION });
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: AZURE_OPENAI_API_VERSION"
        );
    }

    #[test]
    fn blank_required_value_counts_as_missing() {
        let mut pairs = required_pairs();
        pairs[1] = (ENV_API_KEY, "   ");
        let err = ClarityConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing { key: ENV_API_KEY });
    }

    #[test]
    fn optional_overrides_are_read() {
        let mut pairs = required_pairs();
        pairs.push((ENV_MODULES_DIR, "/srv/modules"));
        pairs.push((ENV_PROMPTS_DIR, "/srv/prompts"));
        pairs.push((ENV_TIMEOUT_SECS, "45"));
        let config = ClarityConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.modules_dir, PathBuf::from("/srv/modules"));
        assert_eq!(config.prompts_dir, PathBuf::from("/srv/prompts"));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let mut pairs = required_pairs();
        pairs.push((ENV_TIMEOUT_SECS, "soon"));
        let err = ClarityConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_TIMEOUT_SECS, .. }));
    }
}
