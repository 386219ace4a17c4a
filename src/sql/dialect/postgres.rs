//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - `$n` positional parameters
//! - `::type` cast shorthand
//! - LATERAL sub-selects

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;
use crate::sql::types::CastType;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn placeholder(&self, index: usize) -> String {
        helpers::placeholder_dollar(index)
    }

    fn cast_type_name(&self, ty: CastType) -> &'static str {
        match ty {
            CastType::Text => "text",
            CastType::Numeric => "numeric",
            CastType::Date => "date",
        }
    }

    fn emit_cast(&self, inner: TokenStream, atomic: bool, ty: CastType) -> TokenStream {
        helpers::emit_cast_postfix(inner, atomic, self.cast_type_name(ty))
    }
}
