//! SQLite SQL dialect.
//!
//! SQLite differences handled here:
//! - `?n` positional parameters
//! - No `::` shorthand; casts use `CAST(x AS type)`
//! - Dates are stored as ISO-8601 text; `DATE(x)` normalizes them
//! - No LATERAL; single-row picks go through `rowid`

use super::helpers;
use super::SqlDialect;
use crate::sql::token::{Token, TokenStream};
use crate::sql::types::CastType;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn placeholder(&self, index: usize) -> String {
        helpers::placeholder_question(index)
    }

    fn cast_type_name(&self, ty: CastType) -> &'static str {
        match ty {
            CastType::Text => "TEXT",
            CastType::Numeric => "REAL",
            CastType::Date => "DATE",
        }
    }

    fn emit_cast(&self, inner: TokenStream, _atomic: bool, ty: CastType) -> TokenStream {
        match ty {
            CastType::Date => {
                let mut ts = TokenStream::new();
                ts.push(Token::FunctionName("DATE".into()))
                    .lparen()
                    .append(&inner)
                    .rparen();
                ts
            }
            _ => helpers::emit_cast_function(inner, self.cast_type_name(ty)),
        }
    }

    fn supports_lateral(&self) -> bool {
        false
    }

    fn row_identity_column(&self) -> Option<&'static str> {
        Some("rowid")
    }
}
