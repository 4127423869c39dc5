//! Configuration loading and validation.
//!
//! Global settings and the ordered list of source queries live in one TOML
//! file. Credentials never appear there; they are read from the environment.

use crate::error::ConfigError;
use crate::types::{FilterType, QuerySpec, TimeFilter};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_USER_AGENT: &str = "skyrelay/0.1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub output_dir: PathBuf,
    pub default_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub default_batch_size: usize,
    pub harvest_interval_secs: u64,
    pub publish_interval_secs: u64,
    pub summary_max_chars: usize,
    pub max_media_bytes: u64,
    pub max_posts_per_publish_run: Option<usize>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            default_timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 5,
            default_batch_size: 5,
            harvest_interval_secs: 3600,
            publish_interval_secs: 1800,
            summary_max_chars: 250,
            // Bluesky rejects image blobs above ~976KB.
            max_media_bytes: 976_560,
            max_posts_per_publish_run: None,
        }
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "settings.output_dir".to_string(),
            });
        }
        if self.default_batch_size < 1 {
            return Err(invalid("settings.default_batch_size", self.default_batch_size));
        }
        if self.default_timeout_secs < 1 {
            return Err(invalid("settings.default_timeout_secs", self.default_timeout_secs));
        }
        if self.harvest_interval_secs < 1 {
            return Err(invalid("settings.harvest_interval_secs", self.harvest_interval_secs));
        }
        if self.publish_interval_secs < 1 {
            return Err(invalid("settings.publish_interval_secs", self.publish_interval_secs));
        }
        if self.summary_max_chars < 10 {
            return Err(invalid("settings.summary_max_chars", self.summary_max_chars));
        }
        if self.max_posts_per_publish_run == Some(0) {
            return Err(invalid("settings.max_posts_per_publish_run", 0));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn harvest_interval(&self) -> Duration {
        Duration::from_secs(self.harvest_interval_secs)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }
}

/// A `[[sources]]` entry as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub filter_type: FilterType,
    pub time_filter: Option<TimeFilter>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub download_comments: bool,
    #[serde(default = "default_max_comments")]
    pub max_comments: usize,
    #[serde(default = "default_skip_no_media")]
    pub skip_no_media: bool,
    pub batch_size: Option<usize>,
    pub timeout_secs: Option<u64>,
}

fn default_limit() -> u32 {
    10
}

fn default_max_comments() -> usize {
    5
}

fn default_skip_no_media() -> bool {
    true
}

impl SourceEntry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_source_name(&self.name)?;

        match (self.filter_type, self.time_filter) {
            (FilterType::Top, None) => {
                return Err(ConfigError::MissingField {
                    field: format!("sources.{}.time_filter", self.name),
                })
            }
            (FilterType::Top, Some(_)) | (_, None) => {}
            (other, Some(time_filter)) => {
                return Err(ConfigError::ValidationFailed {
                    reason: format!(
                        "time_filter '{}' is only valid for top queries, not '{}'",
                        time_filter.as_str(),
                        other.as_str()
                    ),
                })
            }
        }

        if !(1..=100).contains(&self.limit) {
            return Err(invalid("limit", self.limit));
        }
        if let Some(batch_size) = self.batch_size {
            if !(1..=100).contains(&batch_size) {
                return Err(invalid("batch_size", batch_size));
            }
        }
        if let Some(timeout) = self.timeout_secs {
            if !(1..=300).contains(&timeout) {
                return Err(invalid("timeout_secs", timeout));
            }
        }
        Ok(())
    }

    /// Fills unset per-source options from the global defaults.
    pub fn resolve(&self, global: &GlobalConfig) -> QuerySpec {
        QuerySpec {
            source_name: self.name.clone(),
            filter_type: self.filter_type,
            time_filter: self.time_filter,
            limit: self.limit,
            download_comments: self.download_comments,
            max_comments: self.max_comments,
            skip_no_media: self.skip_no_media,
            batch_size: self.batch_size.unwrap_or(global.default_batch_size),
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(global.default_timeout_secs)),
        }
    }
}

/// Subreddit naming rule: 3-21 chars, alphanumeric first, then alphanumerics or `_`.
pub fn validate_source_name(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    let len = name.chars().count();
    if first_ok && rest_ok && (3..=21).contains(&len) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: "name".to_string(),
            value: name.to_string(),
        })
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: GlobalConfig,
    #[serde(default)]
    sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: GlobalConfig,
    pub queries: Vec<QuerySpec>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::InvalidFormat {
                details: format!("{}: {}", path.display(), e),
            },
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a config document.
    ///
    /// Invalid `[[sources]]` entries are logged and dropped; invalid global
    /// settings, or no usable source at all, are errors.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        raw.settings.validate()?;

        let mut queries = Vec::with_capacity(raw.sources.len());
        for entry in &raw.sources {
            match entry.validate() {
                Ok(()) => {
                    info!("Configuration for source {} is valid", entry.name);
                    queries.push(entry.resolve(&raw.settings));
                }
                Err(e) => {
                    error!("Invalid configuration for source {}: {}", entry.name, e);
                }
            }
        }

        if queries.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "no valid [[sources]] entries".to_string(),
            });
        }

        Ok(Self {
            settings: raw.settings,
            queries,
        })
    }
}

/// Creates the output directory if needed and checks that it is writable.
pub fn prepare_output_dir(dir: &Path) -> Result<(), ConfigError> {
    let fail = |reason: String| ConfigError::OutputDirectory {
        path: dir.display().to_string(),
        reason,
    };
    std::fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;
    let probe = dir.join(".write-test");
    std::fs::write(&probe, b"test").map_err(|e| fail(e.to_string()))?;
    std::fs::remove_file(&probe).map_err(|e| fail(e.to_string()))?;
    Ok(())
}

/// Secrets for the external collaborators, taken from the process environment.
#[derive(Clone)]
pub struct Credentials {
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub bluesky_identifier: String,
    pub bluesky_app_password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("reddit_client_id", &self.reddit_client_id)
            .field("reddit_user_agent", &self.reddit_user_agent)
            .field("openai_model", &self.openai_model)
            .field("bluesky_identifier", &self.bluesky_identifier)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds credentials from an arbitrary key lookup; empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: key.to_string(),
            })
        };

        Ok(Self {
            reddit_client_id: require("REDDIT_CLIENT_ID")?,
            reddit_client_secret: require("REDDIT_CLIENT_SECRET")?,
            reddit_user_agent: get("REDDIT_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            bluesky_identifier: require("BLUESKY_IDENTIFIER")?,
            bluesky_app_password: require("BLUESKY_APP_PASSWORD")?,
        })
    }
}
