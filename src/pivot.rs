//! Pivoting flat grouped rows into a cross-tab.
//!
//! Column-dimension values become column headers. Each axis keeps at most
//! `value_cap` distinct values in first-seen order; since the flat query is
//! ordered by the first measure descending, those are the most significant
//! ones. Headers are the Cartesian product of the kept values, joined with
//! `" | "`, with a ` (n)` suffix when two combinations print alike. Rows
//! whose combination falls outside the product are summed into an `Other`
//! header, which exists only when that happened.
//!
//! Output rows carry the row-dimension values followed by one cell per
//! header and measure, keyed `"<header> - <measure>"`. Missing combinations
//! are `0`.

use std::collections::{HashMap, HashSet};

use serde_json::{Number, Value};

use crate::executor::{as_f64, Row};

/// Distinct values kept per pivot axis.
pub const DEFAULT_VALUE_CAP: usize = 25;
/// Header collecting everything beyond the kept values.
pub const OTHER_HEADER: &str = "Other";
/// Separator between axis values in a header.
pub const HEADER_SEPARATOR: &str = " | ";

/// Which flat columns play which role.
#[derive(Debug, Clone, Copy)]
pub struct PivotLayout<'a> {
    pub row_keys: &'a [String],
    pub column_keys: &'a [String],
    pub measure_keys: &'a [String],
    pub value_cap: usize,
}

/// Pivoted rows plus the headers they were spread over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotTable {
    /// Column headers in output order, `Other` last when present.
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    /// Whether any value was folded into `Other`.
    pub overflowed: bool,
}

/// Key of the output cell for `header` and `measure`.
pub fn cell_key(header: &str, measure: &str) -> String {
    format!("{} - {}", header, measure)
}

fn axis_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => crate::compile::NULL_SENTINEL.to_uppercase(),
        Some(other) => other.to_string(),
    }
}

/// Kept values for each axis, first-seen order, at most `cap` each.
fn axis_values(rows: &[Row], column_keys: &[String], cap: usize) -> Vec<Vec<String>> {
    let mut kept: Vec<Vec<String>> = vec![Vec::new(); column_keys.len()];
    let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); column_keys.len()];

    for row in rows {
        for (axis, key) in column_keys.iter().enumerate() {
            if kept[axis].len() >= cap {
                continue;
            }
            let value = axis_text(row.get(key));
            if seen[axis].insert(value.clone()) {
                kept[axis].push(value);
            }
        }
    }
    kept
}

fn cartesian(axes: &[Vec<String>]) -> Vec<String> {
    axes.iter().fold(vec![String::new()], |acc, values| {
        acc.iter()
            .flat_map(|prefix| {
                values.iter().map(move |v| {
                    if prefix.is_empty() {
                        v.clone()
                    } else {
                        format!("{}{}{}", prefix, HEADER_SEPARATOR, v)
                    }
                })
            })
            .collect()
    })
}

struct PivotRow {
    dims: Vec<(String, Value)>,
    /// Per header, per measure.
    cells: Vec<Option<f64>>,
    other: Vec<Option<f64>>,
}

/// Renders repeated headers as `"<header> (2)"`, `"<header> (3)"`, ...
///
/// Axis values may themselves contain the separator, so two combinations
/// can print the same.
fn distinct_headers(headers: Vec<String>, reserved: Option<&str>) -> Vec<String> {
    let mut seen: HashSet<String> = reserved.into_iter().map(String::from).collect();
    headers
        .into_iter()
        .map(|header| {
            let mut candidate = header.clone();
            let mut n = 1;
            while !seen.insert(candidate.clone()) {
                n += 1;
                candidate = format!("{} ({})", header, n);
            }
            candidate
        })
        .collect()
}

/// Pivot `rows` according to `layout`.
pub fn pivot(rows: &[Row], layout: &PivotLayout<'_>) -> PivotTable {
    let cap = layout.value_cap.max(1);
    let axes = axis_values(rows, layout.column_keys, cap);
    let index: Vec<HashMap<&str, usize>> = axes
        .iter()
        .map(|values| {
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (v.as_str(), i))
                .collect()
        })
        .collect();
    // Slots follow the Cartesian order: first axis outermost.
    let header_count: usize = axes.iter().map(Vec::len).product();

    let measures = layout.measure_keys.len();
    let mut groups: Vec<PivotRow> = Vec::new();
    let mut group_index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut overflowed = false;

    for row in rows {
        let row_id: Vec<String> = layout
            .row_keys
            .iter()
            .map(|k| axis_text(row.get(k)))
            .collect();
        let slot = *group_index.entry(row_id).or_insert_with(|| {
            groups.push(PivotRow {
                dims: layout
                    .row_keys
                    .iter()
                    .map(|k| (k.clone(), row.get(k).cloned().unwrap_or(Value::Null)))
                    .collect(),
                cells: vec![None; header_count * measures],
                other: vec![None; measures],
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];

        let header = layout
            .column_keys
            .iter()
            .zip(&index)
            .try_fold(0usize, |acc, (key, values)| {
                let value = axis_text(row.get(key));
                values.get(value.as_str()).map(|i| acc * values.len() + i)
            });

        let target = match header {
            Some(h) => &mut group.cells[h * measures..(h + 1) * measures],
            None => {
                overflowed = true;
                &mut group.other[..]
            }
        };

        for (cell, key) in target.iter_mut().zip(layout.measure_keys) {
            *cell = Some(cell.unwrap_or(0.0) + as_f64(row.get(key)));
        }
    }

    let mut headers = distinct_headers(cartesian(&axes), overflowed.then_some(OTHER_HEADER));
    if overflowed {
        headers.push(OTHER_HEADER.to_string());
    }

    let rows = groups
        .into_iter()
        .map(|group| {
            let mut out = Row::new();
            for (key, value) in group.dims {
                out.insert(key, value);
            }
            let cells = group
                .cells
                .chunks(measures.max(1))
                .chain(overflowed.then_some(group.other.as_slice()));
            for (header, chunk) in headers.iter().zip(cells) {
                for (measure, cell) in layout.measure_keys.iter().zip(chunk) {
                    out.insert(cell_key(header, measure), cell_value(*cell));
                }
            }
            out
        })
        .collect();

    PivotTable {
        headers,
        rows,
        overflowed,
    }
}

fn cell_value(cell: Option<f64>) -> Value {
    match cell.and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::from(0),
    }
}
