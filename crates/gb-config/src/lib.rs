//! # gb-config
//!
//! Layered settings: `config/default.toml` (optional), then `GB__*`
//! environment variables, then `UID_SECRET`. A `.env` file is read first
//! when present.
//!
//! Loading runs before the tracing subscriber exists, so nothing here logs;
//! the binary reports the outcome once logging is up.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use gb_core::board::{BoardConfig, BoardRegistry};
use gb_core::lifecycle::DEFAULT_MAX_POSTS;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Environment variable holding the identity secret.
pub const UID_SECRET_VAR: &str = "UID_SECRET";

/// Board created when the configuration names none.
pub const DEFAULT_BOARD: &str = "poverty";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("UID_SECRET is not set")]
    MissingSecret,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    pub version: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "goblin-board".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite:goblin_board.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    pub max_posts_per_thread: usize,
    pub banned_words: Vec<String>,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            max_posts_per_thread: DEFAULT_MAX_POSTS,
            banned_words: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SecuritySettings {
    uid_secret: Option<String>,
}

/// Shape of the merged sources before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    app: AppSettings,
    server: ServerSettings,
    database: DatabaseSettings,
    log: LogSettings,
    security: SecuritySettings,
    moderation: ModerationSettings,
    boards: BTreeMap<String, BoardConfig>,
}

/// Validated settings handed to the binary.
#[derive(Debug)]
pub struct Settings {
    pub app: AppSettings,
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub log: LogSettings,
    pub uid_secret: SecretString,
    pub moderation: ModerationSettings,
    pub boards: BTreeMap<String, BoardConfig>,
}

impl Settings {
    pub fn registry(&self) -> BoardRegistry {
        BoardRegistry::new(self.boards.clone())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

/// Loads settings from the default file and process environment.
pub fn load() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix("GB").separator("__").try_parsing(true))
        .set_override_option("security.uid_secret", std::env::var(UID_SECRET_VAR).ok())?;

    from_builder(builder)
}

/// Builds and validates settings from an arbitrary source stack.
pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    let raw: RawSettings = builder.build()?.try_deserialize()?;
    validate(raw)
}

fn validate(raw: RawSettings) -> Result<Settings, ConfigError> {
    let uid_secret = raw
        .security
        .uid_secret
        .filter(|secret| !secret.trim().is_empty())
        .map(SecretString::from)
        .ok_or(ConfigError::MissingSecret)?;

    if raw.moderation.max_posts_per_thread == 0 {
        return Err(ConfigError::Invalid(
            "moderation.max_posts_per_thread must be at least 1".to_string(),
        ));
    }
    if let Some(board) = raw.boards.keys().find(|key| !is_board_key(key)) {
        return Err(ConfigError::Invalid(format!("board key {board:?} is not a path segment")));
    }

    let mut boards = raw.boards;
    if boards.is_empty() {
        boards.insert(DEFAULT_BOARD.to_string(), BoardConfig::default());
    }

    Ok(Settings {
        app: raw.app,
        server: raw.server,
        database: raw.database,
        log: raw.log,
        uid_secret,
        moderation: raw.moderation,
        boards,
    })
}

// Board keys appear in URLs and in `bbs=` form fields.
fn is_board_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
