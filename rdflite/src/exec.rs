// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution entry point
//!
//! [`QueryExecutor`] owns the per-database state that outlives a single query
//! (database, differential index, table function handler, configuration) and
//! runs one query at a time through translation, scheduling and collection.

use crate::codegen::{CodeGen, TranslationError};
use crate::config::ExecutionConfig;
use crate::operator::results::QueryResult;
use crate::operator::{set_skipping_enabled, DebugPlanPrinter, Operator, ResultsCollector, Scheduler};
use crate::plan::{Plan, QueryGraph};
use crate::runtime::{BulkOperation, DifferentialIndex, Runtime, TableFunctionHandler};
use crate::storage::{Database, StorageError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors surfaced to callers of the executor
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Runs query plans against a database
pub struct QueryExecutor {
    database: Arc<dyn Database>,
    differential: Option<Arc<DifferentialIndex>>,
    table_functions: Option<Arc<dyn TableFunctionHandler>>,
    config: ExecutionConfig,
}

impl QueryExecutor {
    /// Executor with the default configuration overridden by the environment
    ///
    /// Leaves the process-wide skip switch as it is.
    pub fn new(database: Arc<dyn Database>) -> Self {
        let config = ExecutionConfig::from_env();
        Self {
            database,
            differential: None,
            table_functions: None,
            config,
        }
    }

    /// Merge pending updates of `index` into every scan
    pub fn with_differential_index(mut self, index: Arc<DifferentialIndex>) -> Self {
        self.differential = Some(index);
        self
    }

    pub fn with_table_functions(mut self, handler: Arc<dyn TableFunctionHandler>) -> Self {
        self.table_functions = Some(handler);
        self
    }

    /// Use `config`, applying its `skip_scans` to the process-wide switch
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        set_skipping_enabled(config.skip_scans);
        self.config = config;
        self
    }

    /// Replace the configuration with a JSON document
    ///
    /// Like [`QueryExecutor::with_config`] this sets the skip switch.
    pub fn configure(&mut self, json: &str) -> Result<(), ExecutionError> {
        let config =
            ExecutionConfig::from_json(json).map_err(|e| ExecutionError::Config(e.to_string()))?;
        set_skipping_enabled(config.skip_scans);
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn differential_index(&self) -> Option<&Arc<DifferentialIndex>> {
        self.differential.as_ref()
    }

    fn runtime(&self) -> Runtime {
        let mut runtime = Runtime::new(self.database.clone()).with_config(self.config.clone());
        if let Some(index) = &self.differential {
            runtime = runtime.with_differential_index(index.clone());
        }
        if let Some(handler) = &self.table_functions {
            runtime = runtime.with_table_functions(handler.clone());
        }
        runtime
    }

    /// Translate and run a query
    ///
    /// `plan == None` runs a query without patterns. Translation errors are
    /// returned; use [`QueryExecutor::execute_lenient`] to get an empty result
    /// instead.
    pub fn execute(
        &self,
        query: &QueryGraph,
        plan: Option<&Plan>,
    ) -> Result<QueryResult, ExecutionError> {
        let start = Instant::now();
        let mut runtime = self.runtime();
        let root = CodeGen::try_translate(&mut runtime, query, plan)?;
        Ok(self.run(root, start))
    }

    /// Translate and run a query, turning translation errors into no rows
    pub fn execute_lenient(&self, query: &QueryGraph, plan: Option<&Plan>) -> QueryResult {
        let start = Instant::now();
        let mut runtime = self.runtime();
        let root = CodeGen::translate(&mut runtime, query, plan);
        self.run(root, start)
    }

    fn run(&self, mut root: ResultsCollector, start: Instant) -> QueryResult {
        let mut scheduler = Scheduler::new(self.config.effective_worker_threads());
        scheduler.execute(&mut root);
        let mut result = root.take_result();
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        log::debug!(
            "query produced {} rows in {} ms",
            result.len(),
            result.execution_time_ms
        );
        result
    }

    /// Print the executable tree of a query
    ///
    /// With `analyze` the tree is run first, so observed cardinalities are
    /// filled in.
    pub fn explain(
        &self,
        query: &QueryGraph,
        plan: Option<&Plan>,
        analyze: bool,
    ) -> Result<String, ExecutionError> {
        let mut runtime = self.runtime();
        let mut root = CodeGen::try_translate(&mut runtime, query, plan)?;
        if analyze {
            Scheduler::new(self.config.effective_worker_threads()).execute(&mut root);
        }
        let mut printer = DebugPlanPrinter::new(
            runtime.dictionary(),
            analyze || self.config.show_observed_cardinalities,
        );
        root.print(&mut printer);
        Ok(printer.into_output())
    }

    /// Start a batch of updates against the differential index
    pub fn bulk(&self) -> Result<BulkOperation, ExecutionError> {
        match &self.differential {
            Some(index) => Ok(BulkOperation::new(index.clone())),
            None => Err(ExecutionError::Config(
                "bulk updates need a differential index".to_string(),
            )),
        }
    }

    /// Flush pending updates into the database; a no-op without a
    /// differential index
    pub fn sync(&self) -> Result<(), ExecutionError> {
        if let Some(index) = &self.differential {
            index.sync()?;
        }
        Ok(())
    }
}
