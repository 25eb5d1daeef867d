// Provider Bootstrap Configuration
// Every field is required: the provider cannot be constructed without a
// complete configuration, and there are no defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable carrying the provider API key.
pub const ENV_API_KEY: &str = "AUTHSESSION_API_KEY";
/// Environment variable carrying the provider project identifier.
pub const ENV_PROJECT_ID: &str = "AUTHSESSION_PROJECT_ID";
/// Environment variable carrying the provider endpoint base URL.
pub const ENV_ENDPOINT: &str = "AUTHSESSION_ENDPOINT";

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Provider bootstrap failed: {0}")]
    Bootstrap(String),
}

/// Connection settings for the identity provider backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API key
    pub api_key: String,

    /// Provider project identifier
    pub project_id: String,

    /// Provider endpoint base URL
    pub endpoint: String,
}

impl ProviderConfig {
    /// Load the configuration from the environment. Fails on the first
    /// missing variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration through a variable lookup. Factored out of
    /// `from_env` so tests can drive it without touching the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let config = Self {
            api_key: require(&lookup, ENV_API_KEY)?,
            project_id: require(&lookup, ENV_PROJECT_ID)?,
            endpoint: require(&lookup, ENV_ENDPOINT)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Missing(ENV_API_KEY));
        }

        if self.project_id.is_empty() {
            return Err(ConfigError::Missing(ENV_PROJECT_ID));
        }

        if self.endpoint.is_empty() {
            return Err(ConfigError::Missing(ENV_ENDPOINT));
        }

        // The endpoint must be a well-formed absolute URL
        url::Url::parse(&self.endpoint).map_err(|e| ConfigError::Invalid {
            key: "endpoint",
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

fn require<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}
