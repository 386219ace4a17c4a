//! The inbound operations.
//!
//! [`Engine::execute`] runs the whole pipeline for one specification:
//!
//! ```text
//! QuerySpec → CatalogSnapshot::load → validate → Compiler → Executor → assemble → QueryResult
//! ```
//!
//! Every call gets a correlation id. Client errors (specification and join
//! problems) come back as-is and the store is never touched. Anything that
//! fails after validation is logged with the id and returned as
//! [`EngineError::Execution`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::{
    CatalogProvider, CatalogResult, CatalogSnapshot, ColumnMapper, JoinRegistry, StaticCatalog,
};
use crate::compile::{CompileOptions, CompiledQuery, Compiler, DEFAULT_PIVOT_SOURCE_LIMIT};
use crate::config::{Settings, SettingsError};
use crate::error::{BoxError, EngineError, EngineResult, SpecError, Stage};
use crate::executor::{as_f64, Executor, QueryStore, SqliteStore, StoreError, WorkerStore};
use crate::pivot::DEFAULT_VALUE_CAP;
use crate::result::{assemble, QueryResult};
use crate::spec::QuerySpec;
use crate::validation::{validate, ValidatedSpec};
use crate::worker::{WorkerClient, WorkerError};

/// Rows returned by [`Engine::list_distinct_values`] when no limit is given.
pub const DEFAULT_DISTINCT_LIMIT: u64 = 50;

/// Limits applied to every execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub max_limit: u64,
    pub pivot_value_cap: usize,
    pub pivot_source_limit: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_limit: 1000,
            pivot_value_cap: DEFAULT_VALUE_CAP,
            pivot_source_limit: DEFAULT_PIVOT_SOURCE_LIMIT,
        }
    }
}

/// One value of a field and how many rows carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinctValue {
    pub value: String,
    pub count: u64,
}

/// Failure building an engine from settings.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to start database worker: {0}")]
    Worker(#[from] WorkerError),
}

/// Validates, compiles and executes query specifications.
#[derive(Clone)]
pub struct Engine {
    catalog: Arc<dyn CatalogProvider>,
    registry: Arc<dyn JoinRegistry>,
    executor: Executor,
    mapper: ColumnMapper,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        registry: Arc<dyn JoinRegistry>,
        store: Arc<dyn QueryStore>,
    ) -> Self {
        Self {
            catalog,
            registry,
            executor: Executor::new(store),
            mapper: ColumnMapper::new(),
            options: EngineOptions::default(),
        }
    }

    /// An engine over the built-in catalog and registry.
    pub fn with_builtin_catalog(store: Arc<dyn QueryStore>) -> Self {
        let catalog = Arc::new(StaticCatalog::builtin());
        Self::new(catalog.clone(), catalog, store)
    }

    pub fn with_mapper(mut self, mapper: ColumnMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the store, catalog and mapping described by `settings`.
    ///
    /// Worker-backed drivers spawn the worker here.
    pub async fn from_settings(settings: &Settings) -> Result<Self, SetupError> {
        let driver = settings.store.driver_type()?;
        let pool = settings.store.pool.to_pool_options()?;
        let connection_string = settings.store.resolved_connection_string()?;

        let store: Arc<dyn QueryStore> = if driver.uses_worker() {
            let args = vec![format!("-pool-max-open={}", pool.max_open_conns)];
            let client = WorkerClient::spawn_with_args_and_timeout(
                settings.store.worker_path()?,
                &args,
                pool.query_timeout,
            )
            .await?;
            Arc::new(WorkerStore::new(
                Arc::new(client),
                driver,
                connection_string,
                pool,
            ))
        } else {
            Arc::new(SqliteStore::open(&connection_string, pool)?)
        };

        let catalog = Arc::new(settings.catalog.to_catalog());
        Ok(Self::new(catalog.clone(), catalog, store)
            .with_mapper(settings.mapping.to_mapper())
            .with_options(settings.query.to_engine_options()?))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn mapper(&self) -> &ColumnMapper {
        &self.mapper
    }

    /// Compile options matching the store's dialect.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions::default()
            .with_dialect(self.executor.dialect())
            .with_pivot_source_limit(self.options.pivot_source_limit)
    }

    /// Load the catalog as the engine sees it, fallbacks applied.
    pub async fn catalog_snapshot(&self) -> CatalogResult<CatalogSnapshot> {
        CatalogSnapshot::load(self.catalog.as_ref(), self.registry.as_ref()).await
    }

    /// Validate and compile without executing.
    pub async fn prepare(&self, spec: &QuerySpec) -> EngineResult<(ValidatedSpec, CompiledQuery)> {
        self.prepare_with_id(spec, Uuid::new_v4()).await
    }

    async fn prepare_with_id(
        &self,
        spec: &QuerySpec,
        correlation_id: Uuid,
    ) -> EngineResult<(ValidatedSpec, CompiledQuery)> {
        let snapshot = self
            .catalog_snapshot()
            .await
            .map_err(|e| failure(Stage::Catalog, correlation_id, e))?;

        let validated = validate(spec, &snapshot, self.options.max_limit).map_err(|e| {
            tracing::debug!(%correlation_id, reason = e.reason_code(), "specification rejected");
            EngineError::from(e)
        })?;

        let options = self.compile_options();
        let compiled = Compiler::new(&self.mapper, &options)
            .compile(&validated)
            .map_err(|e| failure(Stage::Compile, correlation_id, e))?;

        tracing::debug!(
            %correlation_id,
            dialect = %compiled.dialect,
            params = compiled.params.len(),
            sql = %compiled.sql,
            "compiled query"
        );
        Ok((validated, compiled))
    }

    /// Run `spec` end to end.
    pub async fn execute(&self, spec: &QuerySpec) -> EngineResult<QueryResult> {
        let correlation_id = Uuid::new_v4();
        let (validated, compiled) = self.prepare_with_id(spec, correlation_id).await?;

        let output = self
            .executor
            .run(&compiled)
            .await
            .map_err(|e| failure(Stage::Execute, correlation_id, e))?;

        let result = assemble(&validated, &compiled, output, self.options.pivot_value_cap);
        tracing::info!(
            %correlation_id,
            entities = validated.referenced_entities.len(),
            rows = result.row_count,
            elapsed_ms = result.execution_time_ms,
            warnings = result.warnings.len(),
            "query executed"
        );
        Ok(result)
    }

    /// Most frequent normalized values of `entity.field`.
    ///
    /// The field must be in the catalog. `search_prefix` narrows to values
    /// starting with it, case-insensitively.
    pub async fn list_distinct_values(
        &self,
        entity: &str,
        field: &str,
        search_prefix: Option<&str>,
        limit: u64,
    ) -> EngineResult<Vec<DistinctValue>> {
        let correlation_id = Uuid::new_v4();
        if limit == 0 {
            return Err(SpecError::InvalidLimit(limit).into());
        }

        let snapshot = self
            .catalog_snapshot()
            .await
            .map_err(|e| failure(Stage::Catalog, correlation_id, e))?;
        if !snapshot.has_entity(entity) {
            return Err(SpecError::UnknownEntity(entity.to_string()).into());
        }
        let column = snapshot
            .column(entity, field)
            .ok_or_else(|| SpecError::UnknownField {
                entity: entity.to_string(),
                field: field.to_string(),
            })?;

        let options = self.compile_options();
        let compiled = Compiler::new(&self.mapper, &options).compile_distinct_values(
            column,
            search_prefix,
            limit.min(self.options.max_limit),
        );

        let output = self
            .executor
            .run(&compiled)
            .await
            .map_err(|e| failure(Stage::Execute, correlation_id, e))?;

        Ok(output
            .rows
            .iter()
            .map(|row| DistinctValue {
                value: match row.get("value") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                },
                count: as_f64(row.get("count")).max(0.0) as u64,
            })
            .collect())
    }
}

fn failure(stage: Stage, correlation_id: Uuid, source: impl Into<BoxError>) -> EngineError {
    let source = source.into();
    tracing::error!(%correlation_id, %stage, error = %source, "query failed");
    EngineError::execution(stage, correlation_id, source)
}
