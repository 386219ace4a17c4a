//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
/// Used by: All dialects
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Placeholders
// =============================================================================

/// Numbered dollar placeholder: `$1`, `$2`, ...
/// Used by: Postgres, DuckDB
pub fn placeholder_dollar(index: usize) -> String {
    format!("${}", index)
}

/// Numbered question-mark placeholder: `?1`, `?2`, ...
/// Used by: SQLite
pub fn placeholder_question(index: usize) -> String {
    format!("?{}", index)
}

// =============================================================================
// Casts
// =============================================================================

/// Emit `CAST(inner AS type_name)`.
pub fn emit_cast_function(inner: TokenStream, type_name: &'static str) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Cast)
        .lparen()
        .append(&inner)
        .space()
        .push(Token::As)
        .space()
        .push(Token::TypeName(type_name))
        .rparen();
    ts
}

/// Emit `inner::type_name`, parenthesizing compound operands.
pub fn emit_cast_postfix(inner: TokenStream, atomic: bool, type_name: &'static str) -> TokenStream {
    let mut ts = TokenStream::new();
    if atomic {
        ts.append(&inner);
    } else {
        ts.lparen().append(&inner).rparen();
    }
    ts.push(Token::DoubleColon).push(Token::TypeName(type_name));
    ts
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit `LIMIT n` (standard SQL).
/// Used by: Postgres, DuckDB, SQLite
pub fn emit_limit_standard(limit: u64) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Limit)
        .space()
        .push(Token::LitInt(limit.min(i64::MAX as u64) as i64));
    ts
}
