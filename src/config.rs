use std::{path::PathBuf, time::Duration};

use crate::{
    error::ConfigError,
    signer::{check_secret, parse_host, Secret},
};

pub const EMBED_HOST: &str = "LOOKER_EMBED_HOST";
pub const EMBED_SECRET: &str = "LOOKER_EMBED_SECRET";
pub const DEMO_HOST: &str = "LOOKER_DEMO_HOST";
pub const DEMO_PORT: &str = "LOOKER_DEMO_PORT";
pub const DEMO_USER_FILE: &str = "LOOKER_DEMO_USER_FILE";
pub const DEMO_STATIC_DIR: &str = "LOOKER_DEMO_STATIC_DIR";
pub const REQUEST_TIMEOUT_SECS: &str = "LOOKER_REQUEST_TIMEOUT_SECS";

/// Server configuration. Host and secret are checked here so a bad value
/// stops the server at startup instead of failing the first `/auth` call.
#[derive(Clone, Debug)]
pub struct Config {
    pub embed_host: String,
    pub embed_secret: Secret,
    pub demo_host: String,
    pub demo_port: u16,
    pub demo_user_file: PathBuf,
    pub static_dir: PathBuf,
    pub request_timeout: Duration,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a local `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let embed_host = get(EMBED_HOST).ok_or(ConfigError::Missing(EMBED_HOST))?;
        parse_host(&embed_host).map_err(|e| ConfigError::Invalid {
            key: EMBED_HOST,
            reason: e.to_string(),
        })?;

        let embed_secret = Secret::new(get(EMBED_SECRET).ok_or(ConfigError::Missing(EMBED_SECRET))?);
        check_secret(&embed_secret).map_err(|e| ConfigError::Invalid {
            key: EMBED_SECRET,
            reason: e.to_string(),
        })?;

        let demo_port: u16 = match get(DEMO_PORT) {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: DEMO_PORT,
                reason: format!("{v:?} is not a port number"),
            })?,
            None => 8080,
        };
        let timeout_secs: u64 = match get(REQUEST_TIMEOUT_SECS) {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: REQUEST_TIMEOUT_SECS,
                reason: format!("{v:?} is not a number of seconds"),
            })?,
            None => 10,
        };

        Ok(Self {
            embed_host,
            embed_secret,
            demo_host: get(DEMO_HOST).unwrap_or_else(|| "localhost".to_string()),
            demo_port,
            demo_user_file: get(DEMO_USER_FILE)
                .unwrap_or_else(|| "demo/demo_user.json".to_string())
                .into(),
            static_dir: get(DEMO_STATIC_DIR).unwrap_or_else(|| "demo".to_string()).into(),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
