//! Reference validation.
//!
//! Checks a [`QuerySpec`] against a [`CatalogSnapshot`] and produces a
//! [`ValidatedSpec`]: every column resolved to its catalog entry, every
//! filter value parsed for its column's semantic type, the anchored entity
//! chosen, and at most one join decided. The compiler only ever sees a
//! `ValidatedSpec`, so nothing unknown reaches SQL generation.
//!
//! Validation stops at the first problem it finds.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::catalog::{CatalogSnapshot, ColumnRef, SemanticType};
use crate::error::{JoinError, SpecError};
use crate::spec::{
    Aggregation, FieldPair, Filter, FilterOperator, JoinKind, QuerySpec, Relationship, Sort,
};

/// Accepted date literals: a calendar date, optionally followed by a time.
static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}([ T]\d{2}:\d{2}(:\d{2}(\.\d+)?)?)?$").expect("static pattern")
});

/// Either family of client error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Join(#[from] JoinError),
}

impl ValidationError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            ValidationError::Spec(e) => e.reason_code(),
            ValidationError::Join(e) => e.reason_code(),
        }
    }
}

impl From<ValidationError> for crate::error::EngineError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Spec(e) => crate::error::EngineError::Spec(e),
            ValidationError::Join(e) => crate::error::EngineError::Join(e),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

// ============================================================================
// Validated model
// ============================================================================

/// A dimension or column dimension bound to its catalog column.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDimension {
    pub alias: String,
    pub column: ColumnRef,
}

impl ResolvedDimension {
    pub fn label(&self) -> String {
        self.column.label.clone()
    }
}

/// A measure bound to its catalog column.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMeasure {
    pub alias: String,
    pub column: ColumnRef,
    pub aggregation: Aggregation,
}

impl ResolvedMeasure {
    pub fn label(&self) -> String {
        format!("{} of {}", self.aggregation.label(), self.column.label)
    }
}

/// A filter operand after parsing for the column's semantic type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Text(String),
    Number(f64),
    /// A validated `YYYY-MM-DD[ HH:MM[:SS]]` literal.
    Date(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// `is_null` / `is_not_null`.
    None,
    Scalar(TypedValue),
    Range(TypedValue, TypedValue),
    /// `in` / `not_in` members, compared case-insensitively as text.
    List(Vec<String>),
    /// A LIKE pattern with wildcards in the caller's value already escaped.
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    pub column: ColumnRef,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

/// The join the compiler will emit.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedJoin {
    pub left_entity: String,
    pub right_entity: String,
    pub kind: JoinKind,
    /// Complete pairs only; never empty.
    pub pairs: Vec<FieldPair>,
}

impl AppliedJoin {
    /// `"inventory.sku = returns.sku"`, for messages.
    pub fn describe_pairs(&self) -> String {
        self.pairs
            .iter()
            .map(|p| {
                format!(
                    "{}.{} {} {}.{}",
                    self.left_entity, p.left_field, p.comparator, self.right_entity, p.right_field
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A specification every part of which has been checked against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSpec {
    pub dimensions: Vec<ResolvedDimension>,
    pub column_dimensions: Vec<ResolvedDimension>,
    pub measures: Vec<ResolvedMeasure>,
    pub filters: Vec<ResolvedFilter>,
    pub sorts: Vec<Sort>,
    /// Entity the query reads from; aliased `l` in SQL.
    pub anchor: String,
    pub join: Option<AppliedJoin>,
    /// Entities touched by projection and filters, in first-seen order.
    pub referenced_entities: Vec<String>,
    /// Row limit after clamping.
    pub limit: u64,
    pub warnings: Vec<String>,
}

impl ValidatedSpec {
    pub fn is_pivot(&self) -> bool {
        !self.column_dimensions.is_empty()
    }

    pub fn is_grouped(&self) -> bool {
        !self.dimensions.is_empty() || !self.column_dimensions.is_empty()
    }

    /// Whether `alias` names a projected dimension, column dimension or measure.
    pub fn has_alias(&self, alias: &str) -> bool {
        self.dimensions
            .iter()
            .chain(&self.column_dimensions)
            .any(|d| d.alias == alias)
            || self.measures.iter().any(|m| m.alias == alias)
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Validate `spec` against `catalog`, clamping the limit to `max_limit`.
pub fn validate(
    spec: &QuerySpec,
    catalog: &CatalogSnapshot,
    max_limit: u64,
) -> ValidationResult<ValidatedSpec> {
    if spec.limit == 0 {
        return Err(SpecError::InvalidLimit(spec.limit).into());
    }
    if spec.dimensions.is_empty() && spec.column_dimensions.is_empty() && spec.measures.is_empty()
    {
        return Err(SpecError::EmptyProjection.into());
    }

    check_aliases(spec)?;

    for entity in &spec.entities {
        if !catalog.has_entity(entity) {
            return Err(SpecError::UnknownEntity(entity.clone()).into());
        }
    }

    let dimensions = spec
        .dimensions
        .iter()
        .map(|d| {
            Ok(ResolvedDimension {
                alias: d.alias.clone(),
                column: resolve_column(catalog, &d.column)?,
            })
        })
        .collect::<ValidationResult<Vec<_>>>()?;

    let column_dimensions = spec
        .column_dimensions
        .iter()
        .map(|d| {
            Ok(ResolvedDimension {
                alias: d.alias.clone(),
                column: resolve_column(catalog, &d.column)?,
            })
        })
        .collect::<ValidationResult<Vec<_>>>()?;

    let mut measures = Vec::with_capacity(spec.measures.len());
    for m in &spec.measures {
        let column = resolve_column(catalog, &m.column)?;
        if m.aggregation.requires_numeric()
            && !(column.semantic_type == SemanticType::Numeric && column.aggregatable)
        {
            return Err(SpecError::AggregationTypeMismatch {
                aggregation: m.aggregation,
                entity: column.entity.clone(),
                field: column.field.clone(),
                semantic_type: column.semantic_type,
            }
            .into());
        }
        measures.push(ResolvedMeasure {
            alias: m.alias.clone(),
            column,
            aggregation: m.aggregation,
        });
    }

    let filters = spec
        .filters
        .iter()
        .map(|f| resolve_filter(catalog, f))
        .collect::<ValidationResult<Vec<_>>>()?;

    let mut validated = ValidatedSpec {
        dimensions,
        column_dimensions,
        measures,
        filters,
        sorts: Vec::with_capacity(spec.sorts.len()),
        anchor: String::new(),
        join: None,
        referenced_entities: spec
            .referenced_entities()
            .into_iter()
            .map(String::from)
            .collect(),
        limit: spec.limit,
        warnings: Vec::new(),
    };

    for sort in &spec.sorts {
        if !validated.has_alias(&sort.reference_alias) {
            return Err(SpecError::UnknownSortAlias(sort.reference_alias.clone()).into());
        }
        validated.sorts.push(sort.clone());
    }

    resolve_relationship(spec, catalog, &mut validated)?;

    if spec.limit > max_limit {
        tracing::warn!(requested = spec.limit, max_limit, "clamping query limit");
        validated.limit = max_limit;
        validated.warnings.push(format!(
            "limit {} exceeds the maximum of {}; at most {} rows are returned",
            spec.limit, max_limit, max_limit
        ));
    }

    Ok(validated)
}

fn check_aliases(spec: &QuerySpec) -> ValidationResult<()> {
    let aliases = spec
        .dimensions
        .iter()
        .chain(&spec.column_dimensions)
        .map(|d| d.alias.as_str())
        .chain(spec.measures.iter().map(|m| m.alias.as_str()));

    let mut seen = HashSet::new();
    for alias in aliases {
        if alias.trim().is_empty() {
            return Err(SpecError::EmptyAlias.into());
        }
        if !seen.insert(alias) {
            return Err(SpecError::DuplicateAlias(alias.to_string()).into());
        }
    }
    Ok(())
}

/// Look a caller's column reference up in the catalog.
///
/// The catalog entry wins: semantic type and aggregatable flag sent by the
/// caller are ignored.
fn resolve_column(catalog: &CatalogSnapshot, column: &ColumnRef) -> ValidationResult<ColumnRef> {
    if !catalog.has_entity(&column.entity) {
        return Err(SpecError::UnknownEntity(column.entity.clone()).into());
    }
    catalog
        .column(&column.entity, &column.field)
        .cloned()
        .ok_or_else(|| {
            SpecError::UnknownField {
                entity: column.entity.clone(),
                field: column.field.clone(),
            }
            .into()
        })
}

fn check_field(catalog: &CatalogSnapshot, entity: &str, field: &str) -> ValidationResult<()> {
    if catalog.column(entity, field).is_none() {
        return Err(SpecError::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// Filters
// ============================================================================

fn resolve_filter(catalog: &CatalogSnapshot, filter: &Filter) -> ValidationResult<ResolvedFilter> {
    let column = resolve_column(catalog, &filter.column)?;
    let invalid = |reason: &str| -> ValidationError {
        SpecError::InvalidFilterValue {
            field: format!("{}.{}", column.entity, column.field),
            operator: filter.operator,
            reason: reason.to_string(),
        }
        .into()
    };

    let raw = filter.value.as_ref().filter(|v| !v.is_null());

    let value = match filter.operator {
        FilterOperator::IsNull | FilterOperator::IsNotNull => FilterValue::None,

        FilterOperator::In | FilterOperator::NotIn => {
            let raw = raw.ok_or_else(|| invalid("a list of values is required"))?;
            let items = list_texts(raw).ok_or_else(|| invalid("expected a list of scalar values"))?;
            FilterValue::List(items)
        }

        FilterOperator::Between => {
            let raw = raw.ok_or_else(|| invalid("two bounds are required"))?;
            let items = list_texts(raw).ok_or_else(|| invalid("expected a list of two bounds"))?;
            match items.as_slice() {
                [low, high] => FilterValue::Range(
                    typed_value(&column, low.trim()).map_err(|r| invalid(&r))?,
                    typed_value(&column, high.trim()).map_err(|r| invalid(&r))?,
                ),
                _ => return Err(invalid(&format!("expected two bounds, got {}", items.len()))),
            }
        }

        FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => {
            let text = raw
                .and_then(scalar_text)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| invalid("a non-empty value is required"))?;
            let escaped = escape_like(&text);
            FilterValue::Pattern(match filter.operator {
                FilterOperator::StartsWith => format!("{}%", escaped),
                FilterOperator::EndsWith => format!("%{}", escaped),
                _ => format!("%{}%", escaped),
            })
        }

        FilterOperator::Equals
        | FilterOperator::NotEquals
        | FilterOperator::GreaterThan
        | FilterOperator::LessThan
        | FilterOperator::GreaterEqual
        | FilterOperator::LessEqual => {
            let text = raw
                .and_then(scalar_text)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| invalid("a single non-empty value is required"))?;
            FilterValue::Scalar(typed_value(&column, &text).map_err(|r| invalid(&r))?)
        }
    };

    Ok(ResolvedFilter {
        column,
        operator: filter.operator,
        value,
    })
}

/// A scalar exactly as sent.
fn scalar_raw(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    scalar_raw(value).map(|s| s.trim().to_string())
}

/// A JSON array of scalars, or a comma-delimited string.
///
/// Array members are kept verbatim. Only the pieces of a delimited string
/// are trimmed.
fn list_texts(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items.iter().map(scalar_raw).collect(),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        ),
        Value::Number(_) | Value::Bool(_) => scalar_text(value).map(|s| vec![s]),
        _ => None,
    }
}

fn typed_value(column: &ColumnRef, raw: &str) -> Result<TypedValue, String> {
    match column.semantic_type {
        SemanticType::Numeric => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(TypedValue::Number)
            .ok_or_else(|| format!("'{}' is not a number", raw)),
        SemanticType::Date => {
            if DATE_PATTERN.is_match(raw) {
                Ok(TypedValue::Date(raw.to_string()))
            } else {
                Err(format!("'{}' is not a date (expected YYYY-MM-DD)", raw))
            }
        }
        SemanticType::Text => Ok(TypedValue::Text(raw.to_string())),
    }
}

/// Escape LIKE wildcards so the caller's text matches literally.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// Relationship
// ============================================================================

fn resolve_relationship(
    spec: &QuerySpec,
    catalog: &CatalogSnapshot,
    validated: &mut ValidatedSpec,
) -> ValidationResult<()> {
    let referenced = validated.referenced_entities.clone();

    match referenced.as_slice() {
        [] => {
            // Unreachable with a non-empty projection, kept total.
            validated.anchor = spec.entities.first().cloned().unwrap_or_default();
            Ok(())
        }
        [single] => {
            validated.anchor = single.clone();
            if let Some(rel) = &spec.relationship {
                validated.join = exists_filter(rel, single, catalog, &mut validated.warnings)?;
            }
            Ok(())
        }
        [left, right] => {
            let join = dual_entity_join(spec.relationship.as_ref(), left, right, catalog)?;
            validated.anchor = join.left_entity.clone();
            validated.join = Some(join);
            Ok(())
        }
        more => Err(SpecError::TooManyEntities(more.len()).into()),
    }
}

/// The join for a query projecting or filtering on two entities.
fn dual_entity_join(
    relationship: Option<&Relationship>,
    a: &str,
    b: &str,
    catalog: &CatalogSnapshot,
) -> ValidationResult<AppliedJoin> {
    let missing = || JoinError::KindMissing {
        left: a.to_string(),
        right: b.to_string(),
    };

    let rel = match relationship {
        Some(rel) if rel.enabled => rel,
        _ => return Err(missing().into()),
    };
    if !rel.connects(a, b) {
        return Err(JoinError::EntitiesMismatch {
            left: a.to_string(),
            right: b.to_string(),
            found_left: rel.left_entity.clone(),
            found_right: rel.right_entity.clone(),
        }
        .into());
    }

    let kind = rel.join_kind.ok_or_else(missing)?;
    if kind == JoinKind::Exists {
        return Err(JoinError::KindUnusable {
            left: rel.left_entity.clone(),
            right: rel.right_entity.clone(),
        }
        .into());
    }

    let key = catalog.join_key(&rel.left_entity, &rel.right_entity);
    if let Some(key) = &key {
        if !key.supports(kind) {
            return Err(JoinError::KindUnsupported {
                kind,
                left: rel.left_entity.clone(),
                right: rel.right_entity.clone(),
            }
            .into());
        }
    }

    // Only the relationship's own pairs count when both sides are projected.
    let pairs = complete_pairs(rel, None);
    if pairs.is_empty() {
        return Err(JoinError::MappingIncomplete {
            left: rel.left_entity.clone(),
            right: rel.right_entity.clone(),
        }
        .into());
    }
    check_pairs(catalog, &rel.left_entity, &rel.right_entity, &pairs)?;

    Ok(AppliedJoin {
        left_entity: rel.left_entity.clone(),
        right_entity: rel.right_entity.clone(),
        kind,
        pairs,
    })
}

/// An `exists` relationship on a single-entity query narrows the anchor's rows.
///
/// Any other relationship is ignored when only one entity is referenced.
fn exists_filter(
    rel: &Relationship,
    anchor: &str,
    catalog: &CatalogSnapshot,
    warnings: &mut Vec<String>,
) -> ValidationResult<Option<AppliedJoin>> {
    if !rel.enabled || rel.join_kind != Some(JoinKind::Exists) || !rel.touches(anchor) {
        return Ok(None);
    }

    let rel = if rel.left_entity == anchor {
        rel.clone()
    } else {
        rel.reversed()
    };
    if !catalog.has_entity(&rel.right_entity) {
        return Err(SpecError::UnknownEntity(rel.right_entity.clone()).into());
    }

    let key = catalog.join_key(&rel.left_entity, &rel.right_entity);
    let pairs = complete_pairs(&rel, key.as_ref().map(|k| k.field_pairs.as_slice()));
    if pairs.is_empty() {
        warnings.push(format!(
            "exists relationship between '{}' and '{}' ignored: no complete field pair",
            rel.left_entity, rel.right_entity
        ));
        return Ok(None);
    }
    check_pairs(catalog, &rel.left_entity, &rel.right_entity, &pairs)?;

    Ok(Some(AppliedJoin {
        left_entity: rel.left_entity,
        right_entity: rel.right_entity,
        kind: JoinKind::Exists,
        pairs,
    }))
}

/// Complete pairs from the relationship, or the registry's when it sent none.
fn complete_pairs(rel: &Relationship, registry_pairs: Option<&[FieldPair]>) -> Vec<FieldPair> {
    let source = if rel.field_pairs.is_empty() {
        registry_pairs.unwrap_or(&[])
    } else {
        rel.field_pairs.as_slice()
    };
    source
        .iter()
        .filter(|p| p.is_complete())
        .map(|p| FieldPair {
            left_field: p.left_field.trim().to_string(),
            right_field: p.right_field.trim().to_string(),
            comparator: p.comparator,
        })
        .collect()
}

fn check_pairs(
    catalog: &CatalogSnapshot,
    left: &str,
    right: &str,
    pairs: &[FieldPair],
) -> ValidationResult<()> {
    for pair in pairs {
        check_field(catalog, left, &pair.left_field)?;
        check_field(catalog, right, &pair.right_field)?;
    }
    Ok(())
}
