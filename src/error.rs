//! Engine error types.
//!
//! Three families reach the caller:
//!
//! - [`SpecError`]: the specification itself is malformed (client error).
//! - [`JoinError`]: two entities are referenced but cannot be combined as
//!   requested (client error).
//! - [`EngineError::Execution`]: something failed after the specification was
//!   accepted. The public message is generic and carries a correlation id; the
//!   underlying error is only logged.
//!
//! Every client-facing variant has a stable machine code via `reason_code()`.

use std::fmt;

use uuid::Uuid;

use crate::catalog::SemanticType;
use crate::spec::{Aggregation, FilterOperator, JoinKind};

/// Boxed error carried by execution failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A specification that cannot be compiled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpecError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("alias '{0}' is used more than once")]
    DuplicateAlias(String),

    #[error("every dimension and measure needs a non-empty alias")]
    EmptyAlias,

    #[error("sort references unknown alias '{0}'")]
    UnknownSortAlias(String),

    #[error(
        "{aggregation} needs a numeric, aggregatable column; '{entity}.{field}' is {semantic_type}"
    )]
    AggregationTypeMismatch {
        aggregation: Aggregation,
        entity: String,
        field: String,
        semantic_type: SemanticType,
    },

    #[error("invalid value for '{operator}' filter on '{field}': {reason}")]
    InvalidFilterValue {
        field: String,
        operator: FilterOperator,
        reason: String,
    },

    #[error("limit must be positive, got {0}")]
    InvalidLimit(u64),

    #[error("nothing to project: add a dimension or a measure")]
    EmptyProjection,

    #[error("at most two entities can be combined in one query, got {0}")]
    TooManyEntities(usize),
}

impl SpecError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            SpecError::UnknownEntity(_) => "unknown_entity",
            SpecError::UnknownField { .. } => "unknown_field",
            SpecError::DuplicateAlias(_) => "duplicate_alias",
            SpecError::EmptyAlias => "empty_alias",
            SpecError::UnknownSortAlias(_) => "unknown_sort_alias",
            SpecError::AggregationTypeMismatch { .. } => "aggregation_type_mismatch",
            SpecError::InvalidFilterValue { .. } => "invalid_filter_value",
            SpecError::InvalidLimit(_) => "invalid_limit",
            SpecError::EmptyProjection => "empty_projection",
            SpecError::TooManyEntities(_) => "too_many_entities",
        }
    }
}

/// Two entities are referenced but the relationship does not allow combining them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JoinError {
    #[error(
        "join kind 'exists' only filters '{left}' and cannot project fields from both '{left}' and '{right}'; choose inner, left, right or first"
    )]
    KindUnusable { left: String, right: String },

    #[error("choose a join kind to combine '{left}' and '{right}'")]
    KindMissing { left: String, right: String },

    #[error("map at least one field pair between '{left}' and '{right}'")]
    MappingIncomplete { left: String, right: String },

    #[error("join kind '{kind}' is not supported between '{left}' and '{right}'")]
    KindUnsupported {
        kind: JoinKind,
        left: String,
        right: String,
    },

    #[error(
        "relationship connects '{found_left}' and '{found_right}' but the query uses '{left}' and '{right}'"
    )]
    EntitiesMismatch {
        left: String,
        right: String,
        found_left: String,
        found_right: String,
    },
}

impl JoinError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            JoinError::KindUnusable { .. } => "join_kind_unusable",
            JoinError::KindMissing { .. } => "join_kind_missing",
            JoinError::MappingIncomplete { .. } => "join_mapping_incomplete",
            JoinError::KindUnsupported { .. } => "join_kind_unsupported",
            JoinError::EntitiesMismatch { .. } => "join_entities_mismatch",
        }
    }
}

/// Where an accepted query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Catalog,
    Compile,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Catalog => "catalog",
            Stage::Compile => "compile",
            Stage::Execute => "execute",
        })
    }
}

/// Top-level error returned by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error("{stage} failed (correlation id {correlation_id}): {source}")]
    Execution {
        stage: Stage,
        correlation_id: Uuid,
        #[source]
        source: BoxError,
    },
}

impl EngineError {
    pub fn execution(stage: Stage, correlation_id: Uuid, source: impl Into<BoxError>) -> Self {
        EngineError::Execution {
            stage,
            correlation_id,
            source: source.into(),
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            EngineError::Spec(e) => e.reason_code(),
            EngineError::Join(e) => e.reason_code(),
            EngineError::Execution { .. } => "execution_failed",
        }
    }

    /// Whether the caller can fix this by changing the specification.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EngineError::Execution { .. })
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        match self {
            EngineError::Execution { correlation_id, .. } => Some(*correlation_id),
            _ => None,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            EngineError::Execution { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Message safe to return to a caller.
    ///
    /// Execution failures never expose the underlying error text.
    pub fn public_message(&self) -> String {
        match self {
            EngineError::Spec(e) => e.to_string(),
            EngineError::Join(e) => e.to_string(),
            EngineError::Execution { correlation_id, .. } => format!(
                "the query could not be executed; reference {} when reporting this",
                correlation_id
            ),
        }
    }
}
