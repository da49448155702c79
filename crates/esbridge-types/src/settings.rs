//! Configuration loading for esbridge.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/esbridge/config.toml`
//! (platform equivalent via `directories`). Environment variables use the
//! `ESBRIDGE_` prefix with `__` between sections, e.g.
//! `ESBRIDGE_CONNECTION__HOST` or `ESBRIDGE_SOURCE__INDEXES=orders,users`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Upper bound for page and bulk sizes.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Major version of the search engine being talked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineVersion {
    V5,
    V6,
    V7,
    #[default]
    V8,
}

impl EngineVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineVersion::V5 => "5",
            EngineVersion::V6 => "6",
            EngineVersion::V7 => "7",
            EngineVersion::V8 => "8",
        }
    }
}

impl std::fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineVersion {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "5" => Ok(EngineVersion::V5),
            "6" => Ok(EngineVersion::V6),
            "7" => Ok(EngineVersion::V7),
            "8" => Ok(EngineVersion::V8),
            other => Err(SettingsError::invalid(
                "connection.version",
                format!("unsupported version: {other} (expected one of 5, 6, 7, 8)"),
            )),
        }
    }
}

impl TryFrom<String> for EngineVersion {
    type Error = SettingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EngineVersion> for String {
    fn from(version: EngineVersion) -> Self {
        version.as_str().to_string()
    }
}

/// Sort direction used when paging through an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// How to reach the search engine.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    /// Base URL including scheme and port (e.g. `http://127.0.0.1:9200`)
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub version: EngineVersion,

    /// Username for HTTP basic authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for HTTP basic authentication
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Base64-encoded API key; overrides the service token and basic auth
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Service account token; overrides basic auth
    #[serde(default)]
    pub service_token: Option<SecretString>,

    /// Upper bound for every search/bulk call (ms)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "http://127.0.0.1:9200".to_string()
}

fn default_request_timeout() -> u64 {
    5_000
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            version: EngineVersion::default(),
            username: None,
            password: None,
            api_key: None,
            service_token: None,
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ConnectionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate connection values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::invalid("connection.host", "must not be empty"));
        }
        if self.request_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.request_timeout_ms",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

/// One index monitored by the reader.
///
/// Accepts either a bare index name or a table with sort overrides:
///
/// ```toml
/// [source]
/// indexes = ["orders", { name = "users", sort_by = "updated_at" }]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexSettingsRepr")]
pub struct IndexSettings {
    pub name: String,

    /// Field the index is paged by; must be strictly increasing for
    /// gap-free resumption
    pub sort_by: String,

    pub sort_order: SortOrder,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexSettingsRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default = "default_sort_by")]
        sort_by: String,
        #[serde(default)]
        sort_order: SortOrder,
    },
}

impl From<IndexSettingsRepr> for IndexSettings {
    fn from(repr: IndexSettingsRepr) -> Self {
        match repr {
            IndexSettingsRepr::Name(name) => IndexSettings::new(name),
            IndexSettingsRepr::Full {
                name,
                sort_by,
                sort_order,
            } => IndexSettings {
                name,
                sort_by,
                sort_order,
            },
        }
    }
}

fn default_sort_by() -> String {
    "_seq_no".to_string()
}

impl IndexSettings {
    /// Index paged by the engine's sequence number, ascending.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort_by: default_sort_by(),
            sort_order: SortOrder::Asc,
        }
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by.into();
        self.sort_order = sort_order;
        self
    }
}

/// Reader configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    /// Indexes to poll, one background poller each
    #[serde(default)]
    pub indexes: Vec<IndexSettings>,

    /// Page size per search and capacity of the record queue
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Wait between empty or failed polls (ms)
    #[serde(default = "default_polling_period")]
    pub polling_period_ms: u64,

    /// Consecutive search errors tolerated per index before its poller stops
    /// (0..=255)
    #[serde(default)]
    pub retries: u8,
}

fn default_batch_size() -> usize {
    1_000
}

fn default_polling_period() -> u64 {
    5_000
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            indexes: Vec::new(),
            batch_size: default_batch_size(),
            polling_period_ms: default_polling_period(),
            retries: 0,
        }
    }
}

impl SourceSettings {
    pub fn polling_period(&self) -> Duration {
        Duration::from_millis(self.polling_period_ms)
    }

    /// Validate reader values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.indexes.is_empty() {
            return Err(SettingsError::invalid(
                "source.indexes",
                "at least one index is required",
            ));
        }
        if self.indexes.iter().any(|i| i.name.trim().is_empty()) {
            return Err(SettingsError::invalid(
                "source.indexes",
                "index name must not be empty",
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.indexes.iter().find(|i| !seen.insert(i.name.as_str())) {
            return Err(SettingsError::invalid(
                "source.indexes",
                format!("index {} is listed more than once", dup.name),
            ));
        }
        validate_batch_size("source.batch_size", self.batch_size)?;
        if self.polling_period_ms == 0 {
            return Err(SettingsError::invalid(
                "source.polling_period_ms",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

/// Writer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationSettings {
    /// Static target index; when unset each record is written to the index
    /// named by its collection metadata
    #[serde(default)]
    pub index: Option<String>,

    /// Mapping type name, only sent to version 5 and 6 engines
    #[serde(default)]
    pub index_type: Option<String>,

    /// Records per bulk request when the host does not batch itself
    #[serde(default = "default_batch_size")]
    pub bulk_size: usize,
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            index: None,
            index_type: None,
            bulk_size: default_batch_size(),
        }
    }
}

impl DestinationSettings {
    /// Validate writer values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if matches!(&self.index, Some(index) if index.trim().is_empty()) {
            return Err(SettingsError::invalid(
                "destination.index",
                "must not be empty when set",
            ));
        }
        validate_batch_size("destination.bulk_size", self.bulk_size)
    }
}

fn validate_batch_size(field: &'static str, size: usize) -> Result<(), SettingsError> {
    if size == 0 {
        return Err(SettingsError::invalid(field, "must be at least 1"));
    }
    if size > MAX_BATCH_SIZE {
        return Err(SettingsError::invalid(
            field,
            format!("must be at most {MAX_BATCH_SIZE}, got {size}"),
        ));
    }
    Ok(())
}

/// Main application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub source: SourceSettings,

    #[serde(default)]
    pub destination: DestinationSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            source: SourceSettings::default(),
            destination: DestinationSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/esbridge/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (ESBRIDGE_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, SettingsError> {
        let config_dir = ProjectDirs::from("", "", "esbridge")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())?
            .set_default("connection.host", default_host())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("ESBRIDGE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("source.indexes")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.connection.validate()?;
        Ok(settings)
    }
}
