//! Closed `(entity, field)` to physical-name mapping.
//!
//! Lookups consult configured overrides first, then the built-in table, then
//! fall back to one normalization: lower-case and strip every character that
//! is not ASCII alphanumeric. Nothing else is guessed.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::defaults;

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]").expect("static pattern"));

static BUILTIN_TABLES: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| defaults::TABLES.iter().copied().collect());

static BUILTIN_FIELDS: Lazy<HashMap<(&'static str, &'static str), &'static str>> =
    Lazy::new(|| {
        defaults::FIELDS
            .iter()
            .map(|(entity, field, column)| ((*entity, *field), *column))
            .collect()
    });

/// Lower-case and drop non-alphanumerics: `"Unit Cost"` -> `"unitcost"`.
pub fn normalize_identifier(name: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(&name.to_lowercase(), "")
        .into_owned()
}

/// Maps logical entities and fields to physical tables and columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapper {
    schema: Option<String>,
    tables: HashMap<String, String>,
    fields: HashMap<(String, String), String>,
}

impl ColumnMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Qualify every table with `schema`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_table(mut self, entity: impl Into<String>, table: impl Into<String>) -> Self {
        self.tables.insert(entity.into(), table.into());
        self
    }

    pub fn with_field(
        mut self,
        entity: impl Into<String>,
        field: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.fields
            .insert((entity.into(), field.into()), column.into());
        self
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Physical table for an entity.
    pub fn table(&self, entity: &str) -> String {
        if let Some(table) = self.tables.get(entity) {
            return table.clone();
        }
        if let Some(table) = BUILTIN_TABLES.get(entity) {
            return (*table).to_string();
        }
        normalize_identifier(entity)
    }

    /// Physical column for a field of an entity.
    pub fn column(&self, entity: &str, field: &str) -> String {
        if let Some(column) = self.fields.get(&(entity.to_string(), field.to_string())) {
            return column.clone();
        }
        if let Some(column) = BUILTIN_FIELDS.get(&(entity, field)) {
            return (*column).to_string();
        }
        normalize_identifier(field)
    }
}
