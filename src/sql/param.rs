//! Bound parameter values.
//!
//! Every caller-supplied value reaches the store through a [`ParamList`];
//! the statement text only ever contains the placeholder for it.

use std::fmt;

use serde::Serialize;

use super::expr::Expr;

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Text(String),
    Number(f64),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Text(s) => write!(f, "'{}'", s),
            SqlValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<f64> for SqlValue {
    fn from(n: f64) -> Self {
        SqlValue::Number(n)
    }
}

/// Ordered parameter list for one statement.
///
/// Placeholders are numbered in bind order, starting at 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamList {
    values: Vec<SqlValue>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value and return the placeholder expression that refers to it.
    pub fn bind(&mut self, value: impl Into<SqlValue>) -> Expr {
        self.values.push(value.into());
        Expr::Param(self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}
