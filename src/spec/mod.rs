//! Declarative query specification.
//!
//! A [`QuerySpec`] is what a caller sends: which entities, how to group,
//! what to aggregate, how to filter and sort, and at most one relationship
//! between two entities. It is plain data; nothing here touches the catalog
//! or the store. The [`validation`](crate::validation) module turns it into
//! something the compiler accepts.
//!
//! All structures deserialize from camelCase JSON:
//!
//! ```json
//! {
//!   "entities": ["inventory"],
//!   "dimensions": [{"column": {"entity": "inventory", "field": "category"}, "alias": "category"}],
//!   "measures": [{"column": {"entity": "inventory", "field": "revenue"}, "aggregation": "SUM", "alias": "revenue"}],
//!   "limit": 10
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub use crate::catalog::{ColumnRef, SemanticType};

/// Limit applied when a specification omits one.
pub const DEFAULT_LIMIT: u64 = 100;

// ============================================================================
// Projection
// ============================================================================

/// A grouping axis.
///
/// Listed under `dimensions` it groups rows; under `columnDimensions` it
/// becomes a pivot axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    #[serde(default)]
    pub id: String,
    pub column: ColumnRef,
    pub alias: String,
}

impl Dimension {
    pub fn new(column: ColumnRef, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self {
            id: alias.clone(),
            column,
            alias,
        }
    }
}

/// Aggregation function applied by a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    CountDistinct,
    Min,
    Max,
}

impl Aggregation {
    /// SUM, AVG, MIN and MAX only make sense over numeric, aggregatable columns.
    pub fn requires_numeric(&self) -> bool {
        matches!(
            self,
            Aggregation::Sum | Aggregation::Avg | Aggregation::Min | Aggregation::Max
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Avg => "AVG",
            Aggregation::Count => "COUNT",
            Aggregation::CountDistinct => "COUNT_DISTINCT",
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
        }
    }

    /// Human-readable prefix used in measure labels.
    pub fn label(&self) -> &'static str {
        match self {
            Aggregation::Sum => "Sum",
            Aggregation::Avg => "Average",
            Aggregation::Count => "Count",
            Aggregation::CountDistinct => "Distinct Count",
            Aggregation::Min => "Min",
            Aggregation::Max => "Max",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An aggregated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    #[serde(default)]
    pub id: String,
    pub column: ColumnRef,
    pub aggregation: Aggregation,
    pub alias: String,
}

impl Measure {
    pub fn new(column: ColumnRef, aggregation: Aggregation, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self {
            id: alias.clone(),
            column,
            aggregation,
            alias,
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Between,
    IsNull,
    IsNotNull,
    In,
    NotIn,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "starts_with",
            FilterOperator::EndsWith => "ends_with",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::LessThan => "less_than",
            FilterOperator::GreaterEqual => "greater_equal",
            FilterOperator::LessEqual => "less_equal",
            FilterOperator::Between => "between",
            FilterOperator::IsNull => "is_null",
            FilterOperator::IsNotNull => "is_not_null",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
        }
    }

    /// Operators that take no value.
    pub fn is_nullary(&self) -> bool {
        matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }

    /// Operators that take a list of values.
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            FilterOperator::In | FilterOperator::NotIn | FilterOperator::Between
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row predicate on one column.
///
/// `value` is kept as raw JSON: its expected shape depends on the operator
/// and on the column's semantic type, both of which validation checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub column: ColumnRef,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Filter {
    pub fn new(column: ColumnRef, operator: FilterOperator, value: serde_json::Value) -> Self {
        Self {
            column,
            operator,
            value: Some(value),
        }
    }

    pub fn nullary(column: ColumnRef, operator: FilterOperator) -> Self {
        Self {
            column,
            operator,
            value: None,
        }
    }
}

// ============================================================================
// Sorting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Ordering by a projected alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub reference_alias: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(alias: impl Into<String>) -> Self {
        Self {
            reference_alias: alias.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(alias: impl Into<String>) -> Self {
        Self {
            reference_alias: alias.into(),
            direction: SortDirection::Desc,
        }
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// How two entities are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    /// At most one matching right row per left row. Which one is unspecified.
    First,
    /// Keep left rows with at least one match. Projects nothing from the right.
    Exists,
}

impl JoinKind {
    /// Whether the join yields combined rows that can project both sides.
    pub fn projects_both(&self) -> bool {
        !matches!(self, JoinKind::Exists)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::First => "first",
            JoinKind::Exists => "exists",
        }
    }

    /// Every kind, in registry order.
    pub fn all() -> Vec<JoinKind> {
        vec![
            JoinKind::Inner,
            JoinKind::Left,
            JoinKind::Right,
            JoinKind::First,
            JoinKind::Exists,
        ]
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison between a left field and a right field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Comparator {
    #[default]
    #[serde(rename = "=", alias = "eq")]
    Eq,
    #[serde(rename = "<>", alias = "!=", alias = "ne")]
    Ne,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "lte")]
    Lte,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "gte")]
    Gte,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "<>",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One join condition: `left.leftField <comparator> right.rightField`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPair {
    #[serde(default)]
    pub left_field: String,
    #[serde(default)]
    pub right_field: String,
    #[serde(default)]
    pub comparator: Comparator,
}

impl FieldPair {
    pub fn new(left_field: impl Into<String>, right_field: impl Into<String>) -> Self {
        Self {
            left_field: left_field.into(),
            right_field: right_field.into(),
            comparator: Comparator::Eq,
        }
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Both sides named.
    pub fn is_complete(&self) -> bool {
        !self.left_field.trim().is_empty() && !self.right_field.trim().is_empty()
    }

    /// The same pair seen from the other side.
    pub fn flipped(&self) -> Self {
        let comparator = match self.comparator {
            Comparator::Lt => Comparator::Gt,
            Comparator::Lte => Comparator::Gte,
            Comparator::Gt => Comparator::Lt,
            Comparator::Gte => Comparator::Lte,
            other => other,
        };
        Self {
            left_field: self.right_field.clone(),
            right_field: self.left_field.clone(),
            comparator,
        }
    }
}

impl fmt::Display for FieldPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.left_field, self.comparator, self.right_field
        )
    }
}

fn default_enabled() -> bool {
    true
}

/// The caller's choice of how two entities combine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub left_entity: String,
    pub right_entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_kind: Option<JoinKind>,
    #[serde(default)]
    pub field_pairs: Vec<FieldPair>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Relationship {
    pub fn new(
        left_entity: impl Into<String>,
        right_entity: impl Into<String>,
        join_kind: JoinKind,
    ) -> Self {
        Self {
            left_entity: left_entity.into(),
            right_entity: right_entity.into(),
            join_kind: Some(join_kind),
            field_pairs: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_pair(mut self, pair: FieldPair) -> Self {
        self.field_pairs.push(pair);
        self
    }

    /// Whether this relationship connects exactly `a` and `b`, in either order.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.left_entity == a && self.right_entity == b)
            || (self.left_entity == b && self.right_entity == a)
    }

    pub fn touches(&self, entity: &str) -> bool {
        self.left_entity == entity || self.right_entity == entity
    }

    /// The same relationship with sides swapped, pairs flipped to match.
    pub fn reversed(&self) -> Self {
        Self {
            left_entity: self.right_entity.clone(),
            right_entity: self.left_entity.clone(),
            join_kind: self.join_kind,
            field_pairs: self.field_pairs.iter().map(FieldPair::flipped).collect(),
            enabled: self.enabled,
        }
    }
}

// ============================================================================
// Specification
// ============================================================================

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

/// A complete query request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub column_dimensions: Vec<Dimension>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sorts: Vec<Sort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            dimensions: Vec::new(),
            column_dimensions: Vec::new(),
            measures: Vec::new(),
            filters: Vec::new(),
            sorts: Vec::new(),
            relationship: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        let entity = entity.into();
        if !self.entities.contains(&entity) {
            self.entities.push(entity);
        }
        self
    }

    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn column_dimension(mut self, dimension: Dimension) -> Self {
        self.column_dimensions.push(dimension);
        self
    }

    pub fn measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationship = Some(relationship);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Entities touched by the projection and filters, in first-seen order.
    ///
    /// Sorts reference aliases and never add an entity.
    pub fn referenced_entities(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        let columns = self
            .dimensions
            .iter()
            .chain(&self.column_dimensions)
            .map(|d| &d.column)
            .chain(self.measures.iter().map(|m| &m.column))
            .chain(self.filters.iter().map(|f| &f.column));
        for column in columns {
            if !seen.contains(&column.entity.as_str()) {
                seen.push(column.entity.as_str());
            }
        }
        seen
    }

    /// Whether any row grouping or pivot axis is requested.
    pub fn is_grouped(&self) -> bool {
        !self.dimensions.is_empty() || !self.column_dimensions.is_empty()
    }

    pub fn is_pivot(&self) -> bool {
        !self.column_dimensions.is_empty()
    }
}
