//! Result assembly.
//!
//! Turns executor output into the [`QueryResult`] handed back to callers,
//! pivoting first when the specification asked for column dimensions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::SemanticType;
use crate::compile::{ColumnKind, CompiledQuery, NULL_SENTINEL};
use crate::executor::{ExecutionOutput, Row};
use crate::pivot::{cell_key, pivot, PivotLayout};
use crate::spec::JoinKind;
use crate::validation::{AppliedJoin, ValidatedSpec};

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
}

impl ColumnMeta {
    fn dimension(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            semantic_type: SemanticType::Text,
        }
    }

    fn measure(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            semantic_type: SemanticType::Numeric,
        }
    }
}

/// The answer to one specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub columns: Vec<ColumnMeta>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub warnings: Vec<String>,
}

/// Build the final result for `spec` from the rows `compiled` produced.
pub fn assemble(
    spec: &ValidatedSpec,
    compiled: &CompiledQuery,
    output: ExecutionOutput,
    pivot_value_cap: usize,
) -> QueryResult {
    let execution_time_ms = output.elapsed.as_millis() as u64;
    let mut warnings = spec.warnings.clone();

    if let Some(warning) = spec.join.as_ref().and_then(|j| join_warning(spec, j, &output.rows)) {
        warnings.push(warning);
    }

    let (rows, columns) = if spec.is_pivot() && !output.rows.is_empty() {
        pivoted(spec, compiled, output.rows, pivot_value_cap, &mut warnings)
    } else {
        (output.rows, flat_columns(compiled))
    };

    QueryResult {
        row_count: rows.len(),
        rows,
        columns,
        execution_time_ms,
        warnings,
    }
}

/// Entity whose columns come back null when a row finds no match.
fn padded_entity(join: &AppliedJoin) -> Option<&str> {
    match join.kind {
        JoinKind::Left | JoinKind::First => Some(&join.right_entity),
        JoinKind::Right => Some(&join.left_entity),
        JoinKind::Inner | JoinKind::Exists => None,
    }
}

/// Whether every projected dimension of `entity` is null in every row.
fn never_matched(spec: &ValidatedSpec, entity: &str, rows: &[Row]) -> bool {
    let aliases: Vec<&str> = spec
        .dimensions
        .iter()
        .chain(&spec.column_dimensions)
        .filter(|d| d.column.entity == entity)
        .map(|d| d.alias.as_str())
        .collect();
    if aliases.is_empty() {
        return false;
    }

    let unknown = NULL_SENTINEL.to_uppercase();
    rows.iter().all(|row| {
        aliases.iter().all(|alias| match row.get(*alias) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => *s == unknown,
            Some(_) => false,
        })
    })
}

fn join_warning(spec: &ValidatedSpec, join: &AppliedJoin, rows: &[Row]) -> Option<String> {
    let outcome = if rows.is_empty() {
        "returned no rows".to_string()
    } else {
        let entity = padded_entity(join).filter(|e| never_matched(spec, e, rows))?;
        format!("matched no {} rows", entity)
    };

    tracing::warn!(
        left = %join.left_entity,
        right = %join.right_entity,
        kind = join.kind.as_str(),
        outcome = %outcome,
        "join found no matches"
    );
    Some(format!(
        "the {} join between {} and {} {}; check that the field mapping ({}) matches values in both entities",
        join.kind.as_str(),
        join.left_entity,
        join.right_entity,
        outcome,
        join.describe_pairs()
    ))
}

fn flat_columns(compiled: &CompiledQuery) -> Vec<ColumnMeta> {
    compiled
        .columns
        .iter()
        .map(|c| match c.kind {
            ColumnKind::Dimension => ColumnMeta::dimension(&c.key, &c.label),
            ColumnKind::Measure => ColumnMeta::measure(&c.key, &c.label),
        })
        .collect()
}

fn pivoted(
    spec: &ValidatedSpec,
    compiled: &CompiledQuery,
    rows: Vec<Row>,
    value_cap: usize,
    warnings: &mut Vec<String>,
) -> (Vec<Row>, Vec<ColumnMeta>) {
    if rows.len() as u64 >= compiled.limit {
        warnings.push(format!(
            "the pivot source reached its limit of {} rows; totals may be incomplete",
            compiled.limit
        ));
    }

    let row_keys: Vec<String> = spec.dimensions.iter().map(|d| d.alias.clone()).collect();
    let column_keys: Vec<String> = spec
        .column_dimensions
        .iter()
        .map(|d| d.alias.clone())
        .collect();
    let measure_keys: Vec<String> = spec.measures.iter().map(|m| m.alias.clone()).collect();

    let mut table = pivot(
        &rows,
        &PivotLayout {
            row_keys: &row_keys,
            column_keys: &column_keys,
            measure_keys: &measure_keys,
            value_cap,
        },
    );

    if table.overflowed {
        warnings.push(format!(
            "column values beyond the first {} per axis were combined into \"{}\"",
            value_cap,
            crate::pivot::OTHER_HEADER
        ));
    }

    let limit = usize::try_from(spec.limit).unwrap_or(usize::MAX);
    if table.rows.len() > limit {
        warnings.push(format!(
            "the pivot produced {} rows; only the first {} are returned",
            table.rows.len(),
            limit
        ));
        table.rows.truncate(limit);
    }

    let mut columns: Vec<ColumnMeta> = spec
        .dimensions
        .iter()
        .map(|d| ColumnMeta::dimension(&d.alias, d.label()))
        .collect();
    for header in &table.headers {
        for measure in &spec.measures {
            columns.push(ColumnMeta::measure(
                cell_key(header, &measure.alias),
                format!("{} - {}", header, measure.label()),
            ));
        }
    }

    (table.rows, columns)
}
