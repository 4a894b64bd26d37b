// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! RDFLite - execution core of an RDF triple store
//!
//! RDFLite turns an optimizer join plan over triple patterns into a tree of
//! pull-based operators and runs it against a triple relation kept in six
//! sort orders.
//!
//! # Features
//!
//! - **Multiplicity-aware iterators**: operators return duplicate counts
//!   instead of materializing repeated rows
//! - **Sideways information passing**: scans skip index ranges using bound
//!   values, merge join partners and shared domain descriptions
//! - **Join algorithms**: nested loop, merge, hash and hash-based optional
//! - **Differential index**: versioned pending updates merged into scans
//!   until they are synced into the base relation
//! - **Embedded storage**: in-memory relation, or sled behind the
//!   `sled-backend` feature
//!
//! # Usage
//!
//! ```ignore
//! let db = Arc::new(MemoryDatabase::new());
//! let executor = QueryExecutor::new(db);
//! let result = executor.execute(&query, &plan)?;
//! ```

pub mod codegen;
pub mod config;
pub mod exec;
pub mod operator;
pub mod plan;
pub mod runtime;
pub mod storage;

pub use codegen::{CodeGen, TranslationError};
pub use config::ExecutionConfig;
pub use exec::{ExecutionError, QueryExecutor};
pub use operator::results::{DuplicateMode, QueryResult, ResultRow};
pub use plan::{Plan, PlanNode, QueryGraph};
pub use runtime::{BulkOperation, DifferentialIndex, Runtime};
pub use storage::{Database, MemoryDatabase};

/// RDFLite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// RDFLite crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
