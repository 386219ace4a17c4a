//! # Tabula
//!
//! Compiles declarative query specifications into parameterized SQL, runs
//! them, and optionally pivots the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 QuerySpec (caller JSON)                  │
//! │  (entities, dimensions, measures, filters, relationship) │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation] ◀── catalog + join registry
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ValidatedSpec                         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compile] ◀── column mapping, dialect
//! ┌─────────────────────────────────────────────────────────┐
//! │             CompiledQuery { sql, params }                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [executor] (SQLite or database worker)
//! ┌─────────────────────────────────────────────────────────┐
//! │                     flat rows                            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [pivot, result]
//! ┌─────────────────────────────────────────────────────────┐
//! │                    QueryResult                           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`engine::Engine`] strings the stages together.

pub mod catalog;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod pivot;
pub mod result;
pub mod spec;
pub mod sql;
pub mod validation;
pub mod worker;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::catalog::{
        CatalogProvider, CatalogSnapshot, ColumnMapper, ColumnRef, EntityInfo, JoinKey,
        JoinRegistry, SemanticType, StaticCatalog,
    };
    pub use crate::compile::{CompileOptions, CompiledQuery, Compiler};
    pub use crate::engine::{DistinctValue, Engine, EngineOptions};
    pub use crate::error::{EngineError, EngineResult, JoinError, SpecError, Stage};
    pub use crate::executor::{PoolOptions, QueryStore, SqliteStore, WorkerStore};
    pub use crate::result::{ColumnMeta, QueryResult};
    pub use crate::spec::{
        Aggregation, Comparator, Dimension, FieldPair, Filter, FilterOperator, JoinKind, Measure,
        QuerySpec, Relationship, Sort, SortDirection,
    };
    pub use crate::sql::Dialect;
}

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use result::QueryResult;
pub use spec::QuerySpec;
