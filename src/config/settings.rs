//! TOML-based configuration for Tabula.
//!
//! Supports a config file (tabula.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [store]
//! driver = "postgres"
//! connection_string = "${WAREHOUSE_URL}"
//! worker_path = "/usr/local/bin/tabula-worker"
//!
//! [store.pool]
//! max_open_conns = 8
//! acquire_timeout = "5s"
//! query_timeout = "30s"
//!
//! [query]
//! max_limit = 1000
//! pivot_value_cap = 25
//! pivot_source_limit = 100000
//!
//! [mapping]
//! schema = "analytics"
//!
//! [mapping.tables]
//! inventory = "stock_levels"
//!
//! [mapping.fields.inventory]
//! unitCost = "unit_cost_usd"
//!
//! [[catalog.entities]]
//! id = "orders"
//! display_name = "Orders"
//! columns = [
//!   { field = "region" },
//!   { field = "total", type = "numeric" },
//!   { field = "placedAt", type = "date", label = "Placed" },
//! ]
//!
//! [[catalog.joins]]
//! source = "orders"
//! target = "inventory"
//! on = [{ left = "sku", right = "sku" }]
//! default_kind = "inner"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::connection::Driver;
use crate::catalog::{ColumnMapper, ColumnRef, EntityInfo, JoinKey, SemanticType, StaticCatalog};
use crate::compile::DEFAULT_PIVOT_SOURCE_LIMIT;
use crate::engine::EngineOptions;
use crate::executor::PoolOptions;
use crate::pivot::DEFAULT_VALUE_CAP;
use crate::spec::{Comparator, FieldPair, JoinKind};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Where statements run.
    pub store: StoreSettings,

    /// Query limits.
    pub query: QuerySettings,

    /// Physical name overrides.
    pub mapping: MappingSettings,

    /// Static catalog and join registry.
    pub catalog: CatalogSettings,
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Store driver (sqlite, postgres, duckdb).
    pub driver: String,

    /// Connection string (supports ${ENV_VAR} expansion). A file path for sqlite.
    pub connection_string: String,

    /// Path to the worker binary, for worker-backed drivers.
    pub worker_path: Option<String>,

    /// Connection pool settings.
    pub pool: PoolSettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            connection_string: "tabula.db".to_string(),
            worker_path: None,
            pool: PoolSettings::default(),
        }
    }
}

impl StoreSettings {
    /// Get the driver type.
    pub fn driver_type(&self) -> Result<Driver, SettingsError> {
        Driver::from_str(&self.driver)
            .map_err(|_| SettingsError::UnsupportedDriver(self.driver.clone()))
    }

    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }

    /// Worker binary path, expanded.
    ///
    /// Falls back to `tabula-worker` next to the current directory or on `PATH`.
    pub fn worker_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.worker_path {
            return Ok(PathBuf::from(expand_env_vars(path)?));
        }

        let local = PathBuf::from("./tabula-worker");
        if local.exists() {
            return Ok(local);
        }
        Ok(PathBuf::from("tabula-worker"))
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of statements in flight.
    pub max_open_conns: u32,

    /// How long a caller waits for a free connection (e.g., "5s").
    pub acquire_timeout: String,

    /// How long one statement may run (e.g., "30s", "2m").
    pub query_timeout: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_open_conns: 4,
            acquire_timeout: "5s".to_string(),
            query_timeout: "30s".to_string(),
        }
    }
}

impl PoolSettings {
    pub fn to_pool_options(&self) -> Result<PoolOptions, SettingsError> {
        if self.max_open_conns == 0 {
            return Err(SettingsError::InvalidConfig(
                "store.pool.max_open_conns must be at least 1".to_string(),
            ));
        }
        Ok(PoolOptions {
            max_open_conns: self.max_open_conns as usize,
            acquire_timeout: parse_duration(&self.acquire_timeout)?,
            query_timeout: parse_duration(&self.query_timeout)?,
        })
    }
}

/// Query limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Largest row limit a caller may ask for; larger ones are clamped.
    pub max_limit: u64,

    /// Distinct values kept per pivot axis.
    pub pivot_value_cap: usize,

    /// Row limit of the flat statement behind a pivot.
    pub pivot_source_limit: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_limit: 1000,
            pivot_value_cap: DEFAULT_VALUE_CAP,
            pivot_source_limit: DEFAULT_PIVOT_SOURCE_LIMIT,
        }
    }
}

impl QuerySettings {
    pub fn to_engine_options(&self) -> Result<EngineOptions, SettingsError> {
        if self.max_limit == 0 || self.pivot_value_cap == 0 || self.pivot_source_limit == 0 {
            return Err(SettingsError::InvalidConfig(
                "query limits must be positive".to_string(),
            ));
        }
        Ok(EngineOptions {
            max_limit: self.max_limit,
            pivot_value_cap: self.pivot_value_cap,
            pivot_source_limit: self.pivot_source_limit,
        })
    }
}

/// Physical name overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MappingSettings {
    /// Schema qualifying every table.
    pub schema: Option<String>,

    /// Entity id to table name.
    pub tables: HashMap<String, String>,

    /// Entity id to (field to column name).
    pub fields: HashMap<String, HashMap<String, String>>,
}

impl MappingSettings {
    pub fn to_mapper(&self) -> ColumnMapper {
        let mut mapper = ColumnMapper::new();
        if let Some(schema) = &self.schema {
            mapper = mapper.with_schema(schema.clone());
        }
        for (entity, table) in &self.tables {
            mapper = mapper.with_table(entity.clone(), table.clone());
        }
        for (entity, fields) in &self.fields {
            for (field, column) in fields {
                mapper = mapper.with_field(entity.clone(), field.clone(), column.clone());
            }
        }
        mapper
    }
}

/// Static catalog and join registry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub entities: Vec<EntitySettings>,
    pub joins: Vec<JoinSettings>,
}

/// One entity of the static catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntitySettings {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSettings>,
}

/// One column of a static entity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnSettings {
    pub field: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub semantic_type: SemanticType,
    /// Defaults to true for numeric columns.
    #[serde(default)]
    pub aggregatable: Option<bool>,
}

/// One join of the static registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JoinSettings {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub on: Vec<PairSettings>,
    #[serde(default)]
    pub default_kind: Option<JoinKind>,
    #[serde(default)]
    pub supported_kinds: Option<Vec<JoinKind>>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairSettings {
    pub left: String,
    pub right: String,
    #[serde(default)]
    pub comparator: Comparator,
}

impl CatalogSettings {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.joins.is_empty()
    }

    /// Build the static catalog. An empty section yields an empty catalog,
    /// which falls back to the built-in defaults when loaded.
    pub fn to_catalog(&self) -> StaticCatalog {
        let mut catalog = StaticCatalog::new();

        for entity in &self.entities {
            let mut info = EntityInfo::new(entity.id.clone());
            if let Some(name) = &entity.display_name {
                info = info.with_display_name(name.clone());
            }
            let columns = entity
                .columns
                .iter()
                .map(|c| {
                    ColumnRef {
                        semantic_type: c.semantic_type,
                        aggregatable: c
                            .aggregatable
                            .unwrap_or(c.semantic_type == SemanticType::Numeric),
                        label: c.label.clone().unwrap_or_default(),
                        ..ColumnRef::new(entity.id.clone(), c.field.clone())
                    }
                    .labeled()
                })
                .collect();
            catalog = catalog.with_entity(info, columns);
        }

        for join in &self.joins {
            let mut key = JoinKey::new(join.source.clone(), join.target.clone());
            for pair in &join.on {
                key = key.with_pair(
                    FieldPair::new(pair.left.clone(), pair.right.clone())
                        .with_comparator(pair.comparator),
                );
            }
            if let Some(kind) = join.default_kind {
                key.default_join_kind = kind;
            }
            if let Some(kinds) = &join.supported_kinds {
                key.supported_join_kinds = kinds.clone();
            }
            key.is_default = join.is_default;
            catalog = catalog.with_join(key);
        }

        catalog
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TABULA_CONFIG`
    /// 2. `./tabula.toml`
    /// 3. `~/.config/tabula/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TABULA_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("tabula.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tabula").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

/// Parse a duration such as `"250ms"`, `"5s"`, `"2m"` or `"1h"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, SettingsError> {
    let s = s.trim();
    let invalid = || SettingsError::InvalidDuration(s.to_string());

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(amount)),
        "" | "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        _ => Err(invalid()),
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // lone $
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
