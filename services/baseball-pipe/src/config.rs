//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The account password is loaded from MLBTV_PASSWORD or password_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub account: AccountConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Local HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Base URL players use to reach this service. Defaults to
    /// `http://{Host header}/` per request.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// MLB.TV account
#[derive(Debug, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to MLBTV_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

/// Outbound request limits
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Negotiated stream session cache
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

fn default_timeout() -> u64 {
    20
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_max_connections() -> usize {
    256
}

fn default_max_sessions() -> u64 {
    64
}

fn default_session_ttl() -> u64 {
    4 * 60 * 60
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. MLBTV_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(username) = std::env::var("MLBTV_USERNAME") {
            config.account.username = username;
        }
        if config.account.username.trim().is_empty() {
            return Err(common::Error::Config(
                "account.username is required (or set MLBTV_USERNAME)".into(),
            ));
        }

        if let Some(public_url) = &mut config.server.public_url {
            if !public_url.starts_with("http://") && !public_url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "public_url must start with http:// or https://, got: {public_url}"
                )));
            }
            if !public_url.ends_with('/') {
                public_url.push('/');
            }
        }

        if config.upstream.timeout_secs == 0 || config.upstream.connect_timeout_secs == 0 {
            return Err(common::Error::Config(
                "upstream timeouts must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.cache.max_sessions == 0 || config.cache.session_ttl_secs == 0 {
            return Err(common::Error::Config(
                "cache.max_sessions and cache.session_ttl_secs must be greater than 0".into(),
            ));
        }

        // Resolve password: env var takes precedence over file
        if let Ok(password) = std::env::var("MLBTV_PASSWORD") {
            config.account.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = config.account.password_file {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
            let password = password.trim_end_matches(['\r', '\n']).to_owned();
            if !password.is_empty() {
                config.account.password = Some(Secret::new(password));
            }
        }

        if config.account.password.is_none() {
            return Err(common::Error::Config(
                "no account password: set MLBTV_PASSWORD or account.password_file".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("baseball-pipe.toml")
    }
}
