//! Configuration module for Tabula.
//!
//! Handles the store driver, the settings file and environment expansion.

mod connection;
mod settings;

pub use connection::{ConnectionError, Driver};
pub use settings::{
    expand_env_vars, parse_duration, CatalogSettings, ColumnSettings, EntitySettings,
    JoinSettings, MappingSettings, PairSettings, PoolSettings, QuerySettings, Settings,
    SettingsError, StoreSettings,
};
