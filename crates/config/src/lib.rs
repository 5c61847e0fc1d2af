use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "huddle.toml",
    "config/huddle.toml",
    "crates/config/huddle.toml",
    "../huddle.toml",
    "../config/huddle.toml",
    "../crates/config/huddle.toml",
];

/// Signing secret used when nothing else is configured. Only suitable for local development.
pub const DEVELOPMENT_JWT_SECRET: &str = "default_secret_change_in_production";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://huddle.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Token signing and lifetime settings.
///
/// ```
/// use huddle_config::AuthConfig;
///
/// let auth = AuthConfig::default();
/// assert_eq!(auth.access_token_ttl_seconds, 300);
/// assert_eq!(auth.refresh_token_ttl_seconds, 7 * 24 * 60 * 60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_secret")]
    pub jwt_secret: String,
    #[serde(default = "AuthConfig::default_access_ttl")]
    pub access_token_ttl_seconds: u64,
    #[serde(default = "AuthConfig::default_refresh_ttl")]
    pub refresh_token_ttl_seconds: u64,
}

impl AuthConfig {
    fn default_secret() -> String {
        DEVELOPMENT_JWT_SECRET.to_string()
    }

    const fn default_access_ttl() -> u64 {
        300
    }

    const fn default_refresh_ttl() -> u64 {
        7 * 24 * 60 * 60
    }

    pub fn uses_development_secret(&self) -> bool {
        self.jwt_secret == DEVELOPMENT_JWT_SECRET
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: Self::default_secret(),
            access_token_ttl_seconds: Self::default_access_ttl(),
            refresh_token_ttl_seconds: Self::default_refresh_ttl(),
        }
    }
}

/// Limits applied to live chat connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Frames that may wait in a session's outbound queue before the session is dropped.
    #[serde(default = "RealtimeConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "RealtimeConfig::default_max_message_length")]
    pub max_message_length: usize,
}

impl RealtimeConfig {
    const fn default_outbound_buffer() -> usize {
        256
    }

    const fn default_max_message_length() -> usize {
        4096
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: Self::default_outbound_buffer(),
            max_message_length: Self::default_max_message_length(),
        }
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use huddle_config::load;
///
/// std::env::remove_var("HUDDLE_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret.clone())?
        .set_default(
            "auth.access_token_ttl_seconds",
            clamp_to_i64(defaults.auth.access_token_ttl_seconds),
        )?
        .set_default(
            "auth.refresh_token_ttl_seconds",
            clamp_to_i64(defaults.auth.refresh_token_ttl_seconds),
        )?
        .set_default(
            "realtime.outbound_buffer",
            clamp_to_i64(defaults.realtime.outbound_buffer as u64),
        )?
        .set_default(
            "realtime.max_message_length",
            clamp_to_i64(defaults.realtime.max_message_length as u64),
        )?;

    let environment_overrides = config::Environment::with_prefix("HUDDLE").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("HUDDLE_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via HUDDLE_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    // Token expiry is computed in signed seconds.
    let max_ttl = i64::MAX as u64;
    config.auth.access_token_ttl_seconds = config.auth.access_token_ttl_seconds.min(max_ttl);
    config.auth.refresh_token_ttl_seconds = config.auth.refresh_token_ttl_seconds.min(max_ttl);

    if config.realtime.outbound_buffer == 0 {
        anyhow::bail!("invalid configuration: realtime.outbound_buffer must be at least 1");
    }

    debug!(
        http = ?config.http,
        database = ?config.database,
        realtime = ?config.realtime,
        "loaded backend configuration"
    );
    Ok(config)
}
