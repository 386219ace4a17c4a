//! Column catalog and join registry.
//!
//! The catalog answers two questions for the validator and the compiler:
//! which fields does an entity expose (with semantic type and whether they
//! can be aggregated), and how may two entities be joined. Both are reached
//! through async traits so a catalog can live anywhere; [`StaticCatalog`]
//! serves one from memory or configuration.
//!
//! Lookups go through a [`CatalogSnapshot`], loaded once per execution. The
//! snapshot applies the built-in fallbacks from [`defaults`]: an empty
//! catalog serves the default entities, an entity without columns serves
//! its default columns, and an empty registry serves the default join.

pub mod defaults;
pub mod mapping;

use std::collections::HashMap;

use async_trait::async_trait;
use inflector::Inflector;
use serde::{Deserialize, Serialize};

use crate::spec::{FieldPair, JoinKind};

pub use mapping::ColumnMapper;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised while reading the catalog or the join registry.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("catalog entry invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// Types
// ============================================================================

/// How a field's values behave in comparisons and aggregations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    #[default]
    Text,
    Numeric,
    Date,
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SemanticType::Text => "text",
            SemanticType::Numeric => "numeric",
            SemanticType::Date => "date",
        })
    }
}

/// A field of an entity. Identity is `(entity, field)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRef {
    pub entity: String,
    pub field: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub aggregatable: bool,
}

impl ColumnRef {
    /// A reference by identity only, as a caller would send it.
    pub fn new(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
            label: String::new(),
            semantic_type: SemanticType::Text,
            aggregatable: false,
        }
    }

    pub fn text(entity: &str, field: &str) -> Self {
        Self::new(entity, field).labeled()
    }

    pub fn numeric(entity: &str, field: &str) -> Self {
        Self {
            semantic_type: SemanticType::Numeric,
            aggregatable: true,
            ..Self::new(entity, field)
        }
        .labeled()
    }

    pub fn date(entity: &str, field: &str) -> Self {
        Self {
            semantic_type: SemanticType::Date,
            ..Self::new(entity, field)
        }
        .labeled()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Fill an empty label from the field name ("unitCost" -> "Unit Cost").
    pub fn labeled(mut self) -> Self {
        if self.label.trim().is_empty() {
            self.label = self.field.to_title_case();
        }
        self
    }

    pub fn is_same(&self, other: &ColumnRef) -> bool {
        self.entity == other.entity && self.field == other.field
    }
}

/// An entity the catalog exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl EntityInfo {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.to_title_case(),
            id,
            visible: true,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

/// A registered way of joining two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinKey {
    pub source_entity: String,
    pub target_entity: String,
    #[serde(default)]
    pub field_pairs: Vec<FieldPair>,
    #[serde(default = "default_join_kind")]
    pub default_join_kind: JoinKind,
    #[serde(default = "JoinKind::all")]
    pub supported_join_kinds: Vec<JoinKind>,
    #[serde(default)]
    pub is_default: bool,
}

fn default_join_kind() -> JoinKind {
    JoinKind::Left
}

impl JoinKey {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_entity: source.into(),
            target_entity: target.into(),
            field_pairs: Vec::new(),
            default_join_kind: JoinKind::Left,
            supported_join_kinds: JoinKind::all(),
            is_default: false,
        }
    }

    pub fn with_pair(mut self, pair: FieldPair) -> Self {
        self.field_pairs.push(pair);
        self
    }

    pub fn supports(&self, kind: JoinKind) -> bool {
        self.supported_join_kinds.contains(&kind)
    }

    /// This key seen from `source`'s side, if it connects `source` and `target`.
    pub fn oriented(&self, source: &str, target: &str) -> Option<JoinKey> {
        if self.source_entity == source && self.target_entity == target {
            Some(self.clone())
        } else if self.source_entity == target && self.target_entity == source {
            Some(JoinKey {
                source_entity: source.to_string(),
                target_entity: target.to_string(),
                field_pairs: self.field_pairs.iter().map(FieldPair::flipped).collect(),
                ..self.clone()
            })
        } else {
            None
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Source of entities and their columns.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn list_entities(&self) -> CatalogResult<Vec<EntityInfo>>;

    /// Columns of one entity. Unknown entities yield an empty list.
    async fn list_columns(&self, entity: &str) -> CatalogResult<Vec<ColumnRef>>;
}

/// Read-only registry of join definitions.
#[async_trait]
pub trait JoinRegistry: Send + Sync {
    async fn list_join_keys(&self) -> CatalogResult<Vec<JoinKey>>;
}

// ============================================================================
// Static catalog
// ============================================================================

/// In-memory catalog and registry.
///
/// `StaticCatalog::default()` is empty, so every lookup falls back to the
/// built-in defaults once loaded into a snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entities: Vec<EntityInfo>,
    columns: HashMap<String, Vec<ColumnRef>>,
    joins: Vec<JoinKey>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in inventory/returns catalog.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for entity in defaults::entities() {
            let columns = defaults::columns(&entity.id);
            catalog = catalog.with_entity(entity, columns);
        }
        for join in defaults::join_keys() {
            catalog = catalog.with_join(join);
        }
        catalog
    }

    pub fn with_entity(mut self, entity: EntityInfo, columns: Vec<ColumnRef>) -> Self {
        self.columns.insert(entity.id.clone(), columns);
        self.entities.retain(|e| e.id != entity.id);
        self.entities.push(entity);
        self
    }

    pub fn with_join(mut self, join: JoinKey) -> Self {
        self.joins.push(join);
        self
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    async fn list_entities(&self) -> CatalogResult<Vec<EntityInfo>> {
        Ok(self.entities.clone())
    }

    async fn list_columns(&self, entity: &str) -> CatalogResult<Vec<ColumnRef>> {
        Ok(self.columns.get(entity).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl JoinRegistry for StaticCatalog {
    async fn list_join_keys(&self) -> CatalogResult<Vec<JoinKey>> {
        Ok(self.joins.clone())
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Everything one execution needs from the catalog, fetched up front.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    entities: Vec<EntityInfo>,
    columns: HashMap<String, Vec<ColumnRef>>,
    joins: Vec<JoinKey>,
}

impl CatalogSnapshot {
    /// Load entities, columns and join keys, applying built-in fallbacks.
    pub async fn load(
        catalog: &dyn CatalogProvider,
        registry: &dyn JoinRegistry,
    ) -> CatalogResult<Self> {
        let mut entities = catalog.list_entities().await?;
        if entities.is_empty() {
            tracing::debug!("catalog lists no entities, serving built-in defaults");
            entities = defaults::entities();
        }

        let futures: Vec<_> = entities
            .iter()
            .map(|e| catalog.list_columns(&e.id))
            .collect();
        let results = futures::future::join_all(futures).await;

        let mut columns = HashMap::with_capacity(entities.len());
        for (entity, result) in entities.iter().zip(results) {
            let mut list = result?;
            if list.is_empty() {
                list = defaults::columns(&entity.id);
            }
            let list = list
                .into_iter()
                .map(|c| {
                    ColumnRef {
                        entity: entity.id.clone(),
                        ..c
                    }
                    .labeled()
                })
                .collect();
            columns.insert(entity.id.clone(), list);
        }

        let mut joins = registry.list_join_keys().await?;
        if joins.is_empty() {
            joins = defaults::join_keys();
        }
        joins.retain(|j| {
            entities.iter().any(|e| e.id == j.source_entity)
                && entities.iter().any(|e| e.id == j.target_entity)
        });

        Ok(Self {
            entities,
            columns,
            joins,
        })
    }

    pub fn entities(&self) -> &[EntityInfo] {
        &self.entities
    }

    pub fn has_entity(&self, entity: &str) -> bool {
        self.entities.iter().any(|e| e.id == entity)
    }

    pub fn columns(&self, entity: &str) -> &[ColumnRef] {
        self.columns.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn column(&self, entity: &str, field: &str) -> Option<&ColumnRef> {
        self.columns(entity).iter().find(|c| c.field == field)
    }

    pub fn join_keys(&self) -> &[JoinKey] {
        &self.joins
    }

    /// The registered join between two entities, oriented `source -> target`.
    ///
    /// A key flagged `is_default` wins over other keys for the same pair.
    pub fn join_key(&self, source: &str, target: &str) -> Option<JoinKey> {
        let mut candidates = self.joins.iter().filter_map(|j| j.oriented(source, target));
        let first = candidates.next()?;
        if first.is_default {
            return Some(first);
        }
        Some(candidates.find(|j| j.is_default).unwrap_or(first))
    }
}
