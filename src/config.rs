use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::db::Platform;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("connection {connection} references unknown {kind} {name}")]
    UnknownReference {
        connection: String,
        kind: &'static str,
        name: String,
    },
    #[error("target {target}: missing {field} for platform {platform}")]
    MissingField {
        target: String,
        field: &'static str,
        platform: Platform,
    },
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

/// Application configuration, loaded once per process from a TOML file and
/// passed around as an immutable snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_web_host")]
    pub web_host: String,
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// Seconds between automatic backfill passes; absent disables the loop
    /// (the admin trigger still works).
    pub backfill_interval_secs: Option<u64>,
    /// Seconds between like-count fetch passes; absent disables the loop
    /// (the admin trigger still works).
    pub interactions_interval_secs: Option<u64>,

    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// A feed the companion publishes from.
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    pub name: String,
    pub feed_url: String,
}

/// A platform account the companion publishes to.
#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    pub name: String,
    pub platform: Platform,
    /// Instance or API base URL; defaults per platform.
    pub instance: Option<String>,
    /// Account handle; required for bluesky login.
    pub username: Option<String>,
    /// Bearer token, app password or personal access token.
    pub access_token: String,
    /// Numeric account id; required for instagram.
    pub account_id: Option<String>,
}

impl Target {
    /// The API base URL for this target.
    #[must_use]
    pub fn instance_url(&self) -> &str {
        self.instance.as_deref().unwrap_or(match self.platform {
            Platform::Bluesky => "https://bsky.social",
            Platform::Pixelfed => "https://pixelfed.social",
            Platform::Instagram => "https://graph.instagram.com/v22.0",
        })
    }
}

/// A pairing of one source feed with one publish target.
#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    pub name: String,
    pub source: String,
    pub target: String,
    /// Caption prefix for every post on this connection.
    pub caption: String,
    /// Seconds between scheduled publish cycles; absent means the
    /// connection is only driven by the admin trigger.
    pub interval_secs: Option<u64>,
}

/// A connection with its source and target resolved.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedConnection<'a> {
    pub connection: &'a Connection,
    pub source: &'a Source,
    pub target: &'a Target,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-references and platform-required fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection references an unknown source or
    /// target, or a target is missing a field its platform needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for connection in &self.connections {
            if !self.sources.iter().any(|s| s.name == connection.source) {
                return Err(ConfigError::UnknownReference {
                    connection: connection.name.clone(),
                    kind: "source",
                    name: connection.source.clone(),
                });
            }
            if !self.targets.iter().any(|t| t.name == connection.target) {
                return Err(ConfigError::UnknownReference {
                    connection: connection.name.clone(),
                    kind: "target",
                    name: connection.target.clone(),
                });
            }
        }

        for target in &self.targets {
            match target.platform {
                Platform::Bluesky if target.username.is_none() => {
                    return Err(ConfigError::MissingField {
                        target: target.name.clone(),
                        field: "username",
                        platform: target.platform,
                    });
                }
                Platform::Instagram if target.account_id.is_none() => {
                    return Err(ConfigError::MissingField {
                        target: target.name.clone(),
                        field: "account_id",
                        platform: target.platform,
                    });
                }
                _ => {}
            }
            if target.access_token.is_empty() {
                return Err(ConfigError::InvalidValue {
                    name: format!("targets.{}.access_token", target.name),
                    message: "cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Resolve one connection by name.
    #[must_use]
    pub fn connection(&self, name: &str) -> Option<ResolvedConnection<'_>> {
        let connection = self.connections.iter().find(|c| c.name == name)?;
        self.resolve(connection)
    }

    /// Resolve every configured connection, in declaration order.
    #[must_use]
    pub fn resolved_connections(&self) -> Vec<ResolvedConnection<'_>> {
        self.connections
            .iter()
            .filter_map(|c| self.resolve(c))
            .collect()
    }

    fn resolve<'a>(&'a self, connection: &'a Connection) -> Option<ResolvedConnection<'a>> {
        let source = self.sources.iter().find(|s| s.name == connection.source)?;
        let target = self.targets.iter().find(|t| t.name == connection.target)?;
        Some(ResolvedConnection {
            connection,
            source,
            target,
        })
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/companion.sqlite")
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}
