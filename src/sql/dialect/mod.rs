//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting
//! - Bound parameter placeholders: `$n` vs `?n`
//! - Cast syntax: `x::text` vs `CAST(x AS TEXT)`
//! - Whether LATERAL sub-selects are available
//!
//! # Usage
//!
//! ```ignore
//! use tabula::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! assert_eq!(dialect.placeholder(1), "$1");
//! ```
//!
//! | Feature | PostgreSQL | DuckDB | SQLite |
//! |---------|-----------|--------|--------|
//! | Placeholders | `$n` | `$n` | `?n` |
//! | `::` casts | ✓ | ✓ | ❌ |
//! | LATERAL | 9.3+ | ✓ | ❌ |
//! | RIGHT JOIN | ✓ | ✓ | 3.39+ |

mod duckdb;
pub mod helpers;
mod postgres;
mod sqlite;

pub use duckdb::DuckDb;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use super::token::TokenStream;
use super::types::CastType;

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// Only used for constants the compiler itself emits; caller-supplied
    /// values always travel as bound parameters.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Render the placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String {
        helpers::placeholder_dollar(index)
    }

    // =========================================================================
    // Casts
    // =========================================================================

    /// Concrete type name for a cast target.
    fn cast_type_name(&self, ty: CastType) -> &'static str;

    /// Emit a cast of `inner` to `ty`.
    ///
    /// `atomic` tells postfix-cast dialects whether `inner` can be suffixed
    /// without parentheses (columns, parameters, function calls).
    fn emit_cast(&self, inner: TokenStream, atomic: bool, ty: CastType) -> TokenStream {
        let _ = atomic;
        helpers::emit_cast_function(inner, self.cast_type_name(ty))
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit the row limit clause.
    fn emit_limit(&self, limit: u64) -> TokenStream {
        helpers::emit_limit_standard(limit)
    }

    // =========================================================================
    // JOIN Syntax
    // =========================================================================

    /// Whether this dialect supports LATERAL sub-selects in FROM.
    fn supports_lateral(&self) -> bool {
        true
    }

    /// Implicit per-row identifier usable to pick a single matching row
    /// when LATERAL is unavailable.
    fn row_identity_column(&self) -> Option<&'static str> {
        None
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Dialect {
    #[default]
    Postgres,
    DuckDb,
    Sqlite,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &Postgres,
            Dialect::DuckDb => &DuckDb,
            Dialect::Sqlite => &Sqlite,
        }
    }

    /// Look up a dialect by its display name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Dialect::Postgres),
            "duckdb" | "duck" => Some(Dialect::DuckDb),
            "sqlite" | "sqlite3" => Some(Dialect::Sqlite),
            _ => None,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn placeholder(&self, index: usize) -> String {
        self.dialect().placeholder(index)
    }

    fn cast_type_name(&self, ty: CastType) -> &'static str {
        self.dialect().cast_type_name(ty)
    }

    fn emit_cast(&self, inner: TokenStream, atomic: bool, ty: CastType) -> TokenStream {
        self.dialect().emit_cast(inner, atomic, ty)
    }

    fn emit_limit(&self, limit: u64) -> TokenStream {
        self.dialect().emit_limit(limit)
    }

    fn supports_lateral(&self) -> bool {
        self.dialect().supports_lateral()
    }

    fn row_identity_column(&self) -> Option<&'static str> {
        self.dialect().row_identity_column()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}
