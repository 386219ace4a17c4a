//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect,
//! fully parameterized SELECT statements. It includes:
//!
//! - [`query`] - SELECT query builder (joins, lateral sub-selects, grouping)
//! - [`expr`] - Expression AST and builder DSL
//! - [`token`] - Token types for SQL generation
//! - [`param`] - Bound parameter values
//! - [`types`] - Cast targets
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod expr;
pub mod param;
pub mod query;
pub mod token;
pub mod types;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    avg, cast, coalesce, col, count, count_distinct, count_star, exists, func, lit_int, lit_str, max,
    min, star, sum, table_col, table_star, upper, BinaryOperator, Expr, ExprExt, Literal,
};
pub use param::{ParamList, SqlValue};
pub use query::{Join, JoinSource, JoinType, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{Token, TokenStream};
pub use types::CastType;
