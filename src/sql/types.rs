//! Cast targets used when normalizing column values.
//!
//! The compiler only ever needs three conversions: to text for grouping and
//! case-insensitive comparison, to a numeric type for arithmetic aggregates
//! and numeric filters, and to a date for date filters. Each dialect decides
//! the concrete type name and cast syntax.

use std::fmt;

/// Target of a cast expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastType {
    /// Character data (`text`, `VARCHAR`, `TEXT`).
    Text,
    /// Arbitrary-precision or floating numeric data.
    Numeric,
    /// Calendar date without time of day.
    Date,
}

impl fmt::Display for CastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastType::Text => write!(f, "text"),
            CastType::Numeric => write!(f, "numeric"),
            CastType::Date => write!(f, "date"),
        }
    }
}
