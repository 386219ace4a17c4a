//! DuckDB SQL dialect.
//!
//! DuckDB is PostgreSQL-compatible for everything the compiler emits:
//! - ANSI identifier quoting (`"`)
//! - `$n` positional parameters
//! - `::type` casts and LATERAL joins
//!
//! `numeric` in DuckDB is a fixed DECIMAL(18,3), so arithmetic casts go to
//! DOUBLE instead.

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;
use crate::sql::types::CastType;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn placeholder(&self, index: usize) -> String {
        helpers::placeholder_dollar(index)
    }

    fn cast_type_name(&self, ty: CastType) -> &'static str {
        match ty {
            CastType::Text => "VARCHAR",
            CastType::Numeric => "DOUBLE",
            CastType::Date => "DATE",
        }
    }

    fn emit_cast(&self, inner: TokenStream, atomic: bool, ty: CastType) -> TokenStream {
        helpers::emit_cast_postfix(inner, atomic, self.cast_type_name(ty))
    }
}
