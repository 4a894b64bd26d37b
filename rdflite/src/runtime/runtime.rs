// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-query execution state

use super::differential::DifferentialIndex;
use super::domain::PotentialDomain;
use super::register::{Register, RegisterRef};
use crate::config::ExecutionConfig;
use crate::storage::term::format_term;
use crate::storage::{Database, Dictionary, Literal, LiteralType, NULL_ID};
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a table function implementation
#[derive(Error, Debug)]
#[error("table function '{name}' failed: {message}")]
pub struct TableFunctionError {
    pub name: String,
    pub message: String,
}

impl TableFunctionError {
    pub fn new<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Host-provided implementation of table functions
///
/// Arguments arrive formatted: `NULL`, a term (`<iri>`, `"text"@lang`, ...)
/// or the raw text of a constant argument. Every returned row must hold
/// `output_width` terms in the same syntax.
pub trait TableFunctionHandler: Send + Sync {
    fn call(
        &self,
        name: &str,
        arguments: &[String],
        output_width: usize,
    ) -> Result<Vec<Vec<String>>, TableFunctionError>;
}

/// Dictionary access as seen by a query
///
/// Lookups consult the differential index first when one is attached, so
/// literals minted by pending updates resolve like stored ones.
#[derive(Clone)]
pub struct DictionaryHandle {
    database: Arc<dyn Database>,
    differential: Option<Arc<DifferentialIndex>>,
}

impl DictionaryHandle {
    pub fn new(database: Arc<dyn Database>, differential: Option<Arc<DifferentialIndex>>) -> Self {
        Self {
            database,
            differential,
        }
    }

    fn inner(&self) -> &dyn Dictionary {
        match &self.differential {
            Some(index) => index.as_ref() as &dyn Dictionary,
            None => self.database.dictionary(),
        }
    }

    fn sub_type_text(&self, literal: &Literal) -> Option<String> {
        if literal.literal_type.has_sub_type() {
            self.inner()
                .lookup_by_id(literal.sub_type)
                .map(|sub| sub.text)
        } else {
            None
        }
    }

    /// Render an id in term syntax, `None` for NULL or unknown ids
    pub fn format_term(&self, id: u32) -> Option<String> {
        if id == NULL_ID {
            return None;
        }
        let literal = self.inner().lookup_by_id(id)?;
        let sub = self.sub_type_text(&literal);
        Some(format_term(&literal.text, literal.literal_type, sub.as_deref()))
    }

    /// Plain text of an id for result output
    pub fn display(&self, id: Option<u32>) -> String {
        match id {
            None => "NULL".to_string(),
            Some(id) => match self.inner().lookup_by_id(id) {
                Some(literal) => literal.text,
                None => {
                    log::warn!("id {} missing from the dictionary", id);
                    "?".to_string()
                }
            },
        }
    }

    /// Resolve a term given in text form
    pub fn lookup_term(&self, text: &str, literal_type: LiteralType, sub_type: Option<&str>) -> Option<u32> {
        let sub = match sub_type {
            Some(sub) if literal_type.has_sub_type() => {
                self.inner().lookup(sub, literal_type.sub_type_type(), 0)?
            }
            _ => 0,
        };
        self.inner().lookup(text, literal_type, sub)
    }
}

impl Dictionary for DictionaryHandle {
    fn lookup(&self, text: &str, literal_type: LiteralType, sub_type: u32) -> Option<u32> {
        self.inner().lookup(text, literal_type, sub_type)
    }

    fn lookup_by_id(&self, id: u32) -> Option<Literal> {
        self.inner().lookup_by_id(id)
    }

    fn next_id(&self) -> u32 {
        self.inner().next_id()
    }
}

/// Registers, domains and collaborators of one query
pub struct Runtime {
    database: Arc<dyn Database>,
    differential: Option<Arc<DifferentialIndex>>,
    table_functions: Option<Arc<dyn TableFunctionHandler>>,
    registers: Vec<RegisterRef>,
    domains: Vec<Arc<PotentialDomain>>,
    config: ExecutionConfig,
}

impl Runtime {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            differential: None,
            table_functions: None,
            registers: Vec::new(),
            domains: Vec::new(),
            config: ExecutionConfig::default(),
        }
    }

    /// Read through pending updates
    pub fn with_differential_index(mut self, index: Arc<DifferentialIndex>) -> Self {
        self.differential = Some(index);
        self
    }

    pub fn with_table_functions(mut self, handler: Arc<dyn TableFunctionHandler>) -> Self {
        self.table_functions = Some(handler);
        self
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn differential_index(&self) -> Option<&Arc<DifferentialIndex>> {
        self.differential.as_ref()
    }

    pub fn table_functions(&self) -> Option<&Arc<dyn TableFunctionHandler>> {
        self.table_functions.as_ref()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn dictionary(&self) -> DictionaryHandle {
        DictionaryHandle::new(self.database.clone(), self.differential.clone())
    }

    /// Replace the register array with `count` fresh NULL registers
    pub fn allocate_registers(&mut self, count: usize) {
        self.registers = (0..count).map(|slot| Arc::new(Register::new(slot))).collect();
    }

    /// Replace the domain array with `count` unrestricted domains
    pub fn allocate_domains(&mut self, count: usize) {
        self.domains = (0..count).map(|_| Arc::new(PotentialDomain::new())).collect();
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn register(&self, slot: usize) -> Option<&RegisterRef> {
        self.registers.get(slot)
    }

    pub fn registers(&self) -> &[RegisterRef] {
        &self.registers
    }

    pub fn domain(&self, index: usize) -> Option<&Arc<PotentialDomain>> {
        self.domains.get(index)
    }
}
