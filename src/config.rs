//! Client configuration
//!
//! Both remote clients are constructed from an explicit [`Config`] built once
//! at startup and threaded through; there is no process-global auth state.

use crate::error::{Error, Result};
use std::env;

/// Default catalog base URL for the staging environment
pub const STAGING_API_URL: &str = "https://staging-api.globalforestwatch.org/v1";
/// Catalog base URL for the production environment
pub const PRODUCTION_API_URL: &str = "https://api.resourcewatch.org/v1";

/// Connection settings for the catalog and execution-engine APIs
#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog API base URL
    pub api_url: String,
    /// Catalog API bearer token
    pub token: String,
    /// Execution-engine API base URL
    pub exec_url: String,
    /// Execution-engine account name
    pub exec_user: String,
    /// Execution-engine API key
    pub exec_key: String,
}

impl Config {
    /// Build a configuration from the environment.
    ///
    /// `LF_API_URL` overrides the catalog base URL (staging by default,
    /// production when `production` is set). `LF_API_TOKEN`, `LF_EXEC_USER`
    /// and `LF_EXEC_KEY` supply credentials; `LF_EXEC_URL` overrides the
    /// execution-engine base URL derived from the account name.
    pub fn from_env(production: bool) -> Result<Self> {
        let default_url = if production {
            PRODUCTION_API_URL
        } else {
            STAGING_API_URL
        };
        let api_url = env::var("LF_API_URL").unwrap_or_else(|_| default_url.to_string());
        let token = env::var("LF_API_TOKEN")
            .map_err(|_| Error::Configuration("LF_API_TOKEN is not set".to_string()))?;
        let exec_user = env::var("LF_EXEC_USER")
            .map_err(|_| Error::Configuration("LF_EXEC_USER is not set".to_string()))?;
        let exec_key = env::var("LF_EXEC_KEY")
            .map_err(|_| Error::Configuration("LF_EXEC_KEY is not set".to_string()))?;
        let exec_url = env::var("LF_EXEC_URL")
            .unwrap_or_else(|_| format!("https://{}.carto.com/api", exec_user));

        Ok(Self {
            api_url,
            token,
            exec_url,
            exec_user,
            exec_key,
        })
    }
}
