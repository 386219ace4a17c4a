//! Compilation from a validated specification to parameterized SQL.
//!
//! ```text
//! QuerySpec → validate → ValidatedSpec → Compiler → CompiledQuery { sql, params }
//! ```
//!
//! The compiler is pure: it reads the validated specification, the column
//! mapper and the options, and builds a [`Query`] AST that is rendered for
//! the target dialect. Every caller-supplied value is bound through a
//! [`ParamList`]; the statement text only carries placeholders and
//! compiler-owned constants.
//!
//! # Example
//!
//! ```ignore
//! use tabula::compile::{CompileOptions, Compiler};
//! use tabula::sql::Dialect;
//!
//! let options = CompileOptions::default().with_dialect(Dialect::Sqlite);
//! let compiled = Compiler::new(&mapper, &options).compile(&validated)?;
//! println!("{}", compiled.sql);
//! ```

use crate::catalog::{ColumnMapper, ColumnRef};
use crate::spec::{Aggregation, Comparator, FieldPair, FilterOperator, JoinKind, SortDirection};
use crate::sql::{
    avg, cast, coalesce, col, count, count_distinct, count_star, exists, lit_int, lit_str, max,
    min, sum, table_col, upper, BinaryOperator, CastType, Dialect, Expr, ExprExt, JoinType,
    OrderByExpr, ParamList, Query, SelectExpr, SqlDialect, SqlValue, TableRef,
};
use crate::validation::{
    escape_like, AppliedJoin, FilterValue, ResolvedFilter, TypedValue, ValidatedSpec,
};

/// Alias of the anchored entity.
pub const LEFT_ALIAS: &str = "l";
/// Alias of the joined entity.
pub const RIGHT_ALIAS: &str = "r";
/// Alias inside correlated sub-selects.
const INNER_ALIAS: &str = "r1";
/// Value dimensions report for NULL.
pub const NULL_SENTINEL: &str = "Unknown";

/// Default row cap for the flat query feeding a pivot.
pub const DEFAULT_PIVOT_SOURCE_LIMIT: u64 = 100_000;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("dialect '{0}' has neither LATERAL nor a row identity; cannot compile a 'first' join")]
    FirstJoinUnsupported(Dialect),
}

pub type CompileResult<T> = Result<T, CompileError>;

// ============================================================================
// Options
// ============================================================================

/// Options for compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// SQL dialect to generate.
    pub dialect: Dialect,
    /// Row cap for the flat query when column dimensions are pivoted.
    pub pivot_source_limit: u64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            pivot_source_limit: DEFAULT_PIVOT_SOURCE_LIMIT,
        }
    }
}

impl CompileOptions {
    /// Set the SQL dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_pivot_source_limit(mut self, limit: u64) -> Self {
        self.pivot_source_limit = limit;
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// What a projected column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Dimension,
    Measure,
}

/// A column of the flat result, in select-list order.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub key: String,
    pub label: String,
    pub kind: ColumnKind,
}

/// Result of compiling a specification.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// The generated SQL string.
    pub sql: String,

    /// Values for the statement's placeholders, in placeholder order.
    pub params: Vec<SqlValue>,

    /// The SQL query AST.
    pub query: Query,

    /// The dialect used for generation.
    pub dialect: Dialect,

    /// Projected columns of the flat result.
    pub columns: Vec<OutputColumn>,

    /// LIMIT emitted in the statement.
    pub limit: u64,
}

impl CompiledQuery {
    pub fn measure_keys(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Measure)
            .map(|c| c.key.as_str())
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Builds SQL for one dialect from validated specifications.
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'a> {
    mapper: &'a ColumnMapper,
    options: &'a CompileOptions,
}

/// Compile `spec` with the given mapper and options.
pub fn compile(
    spec: &ValidatedSpec,
    mapper: &ColumnMapper,
    options: &CompileOptions,
) -> CompileResult<CompiledQuery> {
    Compiler::new(mapper, options).compile(spec)
}

impl<'a> Compiler<'a> {
    pub fn new(mapper: &'a ColumnMapper, options: &'a CompileOptions) -> Self {
        Self { mapper, options }
    }

    fn dialect(&self) -> Dialect {
        self.options.dialect
    }

    /// Compile a validated specification.
    pub fn compile(&self, spec: &ValidatedSpec) -> CompileResult<CompiledQuery> {
        let mut params = ParamList::new();
        let mut select: Vec<SelectExpr> = Vec::new();
        let mut group_by: Vec<Expr> = Vec::new();
        let mut columns: Vec<OutputColumn> = Vec::new();

        for dim in spec.dimensions.iter().chain(&spec.column_dimensions) {
            let expr = normalized(self.column_expr(spec, &dim.column));
            select.push(expr.clone().alias(&dim.alias));
            group_by.push(expr);
            columns.push(OutputColumn {
                key: dim.alias.clone(),
                label: dim.label(),
                kind: ColumnKind::Dimension,
            });
        }

        for measure in &spec.measures {
            let expr = aggregate(measure.aggregation, self.column_expr(spec, &measure.column));
            select.push(expr.alias(&measure.alias));
            columns.push(OutputColumn {
                key: measure.alias.clone(),
                label: measure.label(),
                kind: ColumnKind::Measure,
            });
        }

        let mut query = Query::new()
            .select(select)
            .from(self.table(&spec.anchor).with_alias(LEFT_ALIAS));

        if let Some(join) = &spec.join {
            query = self.apply_join(query, join)?;
        }

        for filter in &spec.filters {
            query = query.filter(self.filter_expr(spec, filter, &mut params));
        }

        if !group_by.is_empty() {
            query = query.group_by(group_by);
        }

        let order_by = if spec.sorts.is_empty() {
            spec.measures
                .first()
                .map(|m| vec![OrderByExpr::desc(col(&m.alias))])
                .unwrap_or_default()
        } else {
            spec.sorts
                .iter()
                .map(|s| match s.direction {
                    SortDirection::Asc => OrderByExpr::asc(col(&s.reference_alias)),
                    SortDirection::Desc => OrderByExpr::desc(col(&s.reference_alias)),
                })
                .collect()
        };
        if !order_by.is_empty() {
            query = query.order_by(order_by);
        }

        let limit = if spec.is_pivot() {
            self.options.pivot_source_limit
        } else {
            spec.limit
        };
        query = query.limit(limit);

        Ok(self.finish(query, params, columns, limit))
    }

    /// Most frequent normalized values of one field, optionally narrowed to a prefix.
    ///
    /// Rows come back as `{value, count}`, frequency descending, value
    /// ascending on ties.
    pub fn compile_distinct_values(
        &self,
        column: &ColumnRef,
        search_prefix: Option<&str>,
        limit: u64,
    ) -> CompiledQuery {
        let mut params = ParamList::new();
        let value = normalized(table_col(
            LEFT_ALIAS,
            &self.mapper.column(&column.entity, &column.field),
        ));

        let mut query = Query::new()
            .select(vec![
                value.clone().alias("value"),
                count_star().alias("count"),
            ])
            .from(self.table(&column.entity).with_alias(LEFT_ALIAS));

        if let Some(prefix) = search_prefix.map(str::trim).filter(|p| !p.is_empty()) {
            let pattern = params.bind(format!("{}%", escape_like(prefix)));
            query = query.filter(value.clone().like_escape(upper(pattern), '\\'));
        }

        let query = query
            .group_by(vec![value])
            .order_by(vec![
                OrderByExpr::desc(col("count")),
                OrderByExpr::asc(col("value")),
            ])
            .limit(limit);

        let columns = vec![
            OutputColumn {
                key: "value".into(),
                label: column.label.clone(),
                kind: ColumnKind::Dimension,
            },
            OutputColumn {
                key: "count".into(),
                label: "Count".into(),
                kind: ColumnKind::Measure,
            },
        ];
        self.finish(query, params, columns, limit)
    }

    fn finish(
        &self,
        query: Query,
        params: ParamList,
        columns: Vec<OutputColumn>,
        limit: u64,
    ) -> CompiledQuery {
        CompiledQuery {
            sql: query.to_sql(self.dialect()),
            params: params.into_values(),
            query,
            dialect: self.dialect(),
            columns,
            limit,
        }
    }

    // ------------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------------

    fn table(&self, entity: &str) -> TableRef {
        let table = TableRef::new(&self.mapper.table(entity));
        match self.mapper.schema() {
            Some(schema) => table.with_schema(schema),
            None => table,
        }
    }

    fn column_expr(&self, spec: &ValidatedSpec, column: &ColumnRef) -> Expr {
        let alias = if column.entity == spec.anchor {
            LEFT_ALIAS
        } else {
            RIGHT_ALIAS
        };
        table_col(alias, &self.mapper.column(&column.entity, &column.field))
    }

    // ------------------------------------------------------------------------
    // Joins
    // ------------------------------------------------------------------------

    fn apply_join(&self, query: Query, join: &AppliedJoin) -> CompileResult<Query> {
        let right = || self.table(&join.right_entity);

        Ok(match join.kind {
            JoinKind::Inner | JoinKind::Left | JoinKind::Right => {
                let join_type = match join.kind {
                    JoinKind::Inner => JoinType::Inner,
                    JoinKind::Right => JoinType::Right,
                    _ => JoinType::Left,
                };
                let on = self.pair_condition(join, RIGHT_ALIAS);
                query.join(join_type, right().with_alias(RIGHT_ALIAS), on)
            }

            // No ORDER BY inside the sub-select: which matching row is kept
            // is unspecified.
            JoinKind::First if self.dialect().supports_lateral() => {
                let pick = Query::new()
                    .select_star()
                    .from(right().with_alias(INNER_ALIAS))
                    .filter(self.pair_condition(join, INNER_ALIAS))
                    .limit(1);
                query.left_join_lateral(pick, RIGHT_ALIAS)
            }

            JoinKind::First => {
                let row_id = self
                    .dialect()
                    .row_identity_column()
                    .ok_or(CompileError::FirstJoinUnsupported(self.dialect()))?;
                let pick = Query::new()
                    .select(vec![table_col(INNER_ALIAS, row_id)])
                    .from(right().with_alias(INNER_ALIAS))
                    .filter(self.pair_condition(join, INNER_ALIAS))
                    .limit(1);
                let on = table_col(RIGHT_ALIAS, row_id).eq(Expr::Subquery(Box::new(pick)));
                query.join(JoinType::Left, right().with_alias(RIGHT_ALIAS), on)
            }

            JoinKind::Exists => {
                let probe = Query::new()
                    .select(vec![lit_int(1)])
                    .from(right().with_alias(INNER_ALIAS))
                    .filter(self.pair_condition(join, INNER_ALIAS));
                query.filter(exists(probe))
            }
        })
    }

    /// The field pairs ANDed, with the right side under `right_alias`.
    fn pair_condition(&self, join: &AppliedJoin, right_alias: &str) -> Expr {
        let mut conditions = join.pairs.iter().map(|pair| self.pair_expr(join, pair, right_alias));
        // AppliedJoin guarantees at least one pair
        let first = conditions.next().unwrap_or_else(|| lit_int(1).eq(lit_int(1)));
        conditions.fold(first, |acc, c| acc.and(c))
    }

    fn pair_expr(&self, join: &AppliedJoin, pair: &FieldPair, right_alias: &str) -> Expr {
        let left = table_col(
            LEFT_ALIAS,
            &self.mapper.column(&join.left_entity, &pair.left_field),
        );
        let right = table_col(
            right_alias,
            &self.mapper.column(&join.right_entity, &pair.right_field),
        );
        left.binary(comparator_op(pair.comparator), right)
    }

    // ------------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------------

    fn filter_expr(
        &self,
        spec: &ValidatedSpec,
        filter: &ResolvedFilter,
        params: &mut ParamList,
    ) -> Expr {
        let column = self.column_expr(spec, &filter.column);

        match (&filter.value, filter.operator) {
            (_, FilterOperator::IsNull) => column.is_null(),
            (_, FilterOperator::IsNotNull) => column.is_not_null(),

            (FilterValue::List(values), op) => {
                let bound = values
                    .iter()
                    .map(|v| upper(params.bind(v.as_str())))
                    .collect();
                if op == FilterOperator::NotIn {
                    normalized(column).not_in_list(bound)
                } else {
                    normalized(column).in_list(bound)
                }
            }

            (FilterValue::Pattern(pattern), _) => {
                let pattern = params.bind(pattern.as_str());
                upper(cast(column, CastType::Text)).like_escape(upper(pattern), '\\')
            }

            (FilterValue::Range(low, high), _) => {
                let (lhs, low) = typed_operands(column, low, params);
                let high = typed_param(high, params);
                lhs.between(low, high)
            }

            (FilterValue::Scalar(value), op) => {
                let (lhs, rhs) = typed_operands(column, value, params);
                lhs.binary(comparison_op(op), rhs)
            }

            // Validation never pairs a comparison operator with no value.
            (FilterValue::None, _) => lit_int(1).eq(lit_int(1)),
        }
    }
}

// ============================================================================
// Expression helpers
// ============================================================================

/// `UPPER(COALESCE(CAST(expr AS text), 'Unknown'))`: the grouping form of a dimension.
pub fn normalized(expr: Expr) -> Expr {
    upper(coalesce(vec![
        cast(expr, CastType::Text),
        lit_str(NULL_SENTINEL),
    ]))
}

fn aggregate(aggregation: Aggregation, expr: Expr) -> Expr {
    match aggregation {
        Aggregation::Sum => sum(cast(expr, CastType::Numeric)),
        Aggregation::Avg => avg(cast(expr, CastType::Numeric)),
        Aggregation::Min => min(cast(expr, CastType::Numeric)),
        Aggregation::Max => max(cast(expr, CastType::Numeric)),
        Aggregation::Count => count(expr),
        Aggregation::CountDistinct => count_distinct(expr),
    }
}

/// Column and bound value cast so they compare by the value's type.
fn typed_operands(column: Expr, value: &TypedValue, params: &mut ParamList) -> (Expr, Expr) {
    let lhs = match value {
        TypedValue::Text(_) => upper(cast(column, CastType::Text)),
        TypedValue::Number(_) => cast(column, CastType::Numeric),
        TypedValue::Date(_) => cast(column, CastType::Date),
    };
    (lhs, typed_param(value, params))
}

fn typed_param(value: &TypedValue, params: &mut ParamList) -> Expr {
    match value {
        TypedValue::Text(s) => upper(params.bind(s.as_str())),
        TypedValue::Number(n) => cast(params.bind(*n), CastType::Numeric),
        TypedValue::Date(d) => cast(params.bind(d.as_str()), CastType::Date),
    }
}

fn comparison_op(op: FilterOperator) -> BinaryOperator {
    match op {
        FilterOperator::NotEquals => BinaryOperator::Ne,
        FilterOperator::GreaterThan => BinaryOperator::Gt,
        FilterOperator::LessThan => BinaryOperator::Lt,
        FilterOperator::GreaterEqual => BinaryOperator::Gte,
        FilterOperator::LessEqual => BinaryOperator::Lte,
        _ => BinaryOperator::Eq,
    }
}

fn comparator_op(comparator: Comparator) -> BinaryOperator {
    match comparator {
        Comparator::Eq => BinaryOperator::Eq,
        Comparator::Ne => BinaryOperator::Ne,
        Comparator::Lt => BinaryOperator::Lt,
        Comparator::Lte => BinaryOperator::Lte,
        Comparator::Gt => BinaryOperator::Gt,
        Comparator::Gte => BinaryOperator::Gte,
    }
}
