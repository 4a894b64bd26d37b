// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Calls into host-provided table functions

use super::{BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::{DictionaryHandle, RegisterRef, TableFunctionHandler};
use crate::storage::term::parse_term;
use crate::storage::NULL_ID;
use std::sync::Arc;

/// Argument of a table function call
#[derive(Debug, Clone)]
pub enum FunctionArgument {
    /// Value of a register, passed in term syntax
    Register(RegisterRef),
    /// Constant text passed as is
    Value(String),
}

/// For every input tuple, emits the rows returned by a table function
pub struct TableFunction {
    input: BoxedOperator,
    handler: Option<Arc<dyn TableFunctionHandler>>,
    dictionary: DictionaryHandle,
    name: String,
    arguments: Vec<FunctionArgument>,
    outputs: Vec<RegisterRef>,
    /// Rows of the current table, flattened
    table: Vec<u32>,
    pos: usize,
    count: u32,
    expected: f64,
    observed: u64,
}

impl TableFunction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input: BoxedOperator,
        handler: Option<Arc<dyn TableFunctionHandler>>,
        dictionary: DictionaryHandle,
        name: impl Into<String>,
        arguments: Vec<FunctionArgument>,
        outputs: Vec<RegisterRef>,
        expected: f64,
    ) -> Self {
        let name = name.into();
        if handler.is_none() {
            log::debug!("no table function handler, '{}' yields nothing", name);
        }
        Self {
            input,
            handler,
            dictionary,
            name,
            arguments,
            outputs,
            table: Vec::new(),
            pos: 0,
            count: 0,
            expected,
            observed: 0,
        }
    }

    fn format_arguments(&self) -> Vec<String> {
        self.arguments
            .iter()
            .map(|arg| match arg {
                FunctionArgument::Register(reg) => self
                    .dictionary
                    .format_term(reg.get())
                    .unwrap_or_else(|| "NULL".to_string()),
                FunctionArgument::Value(value) => value.clone(),
            })
            .collect()
    }

    fn resolve(&self, term: &str) -> u32 {
        match parse_term(term) {
            Ok(term) => {
                let (text, literal_type, sub_type) = term.into_parts();
                self.dictionary
                    .lookup_term(&text, literal_type, sub_type.as_deref())
                    .unwrap_or(NULL_ID)
            }
            Err(_) => NULL_ID,
        }
    }

    /// Fetch the table for the current input tuple
    fn request_table(&mut self) {
        self.table.clear();
        self.pos = 0;

        let Some(handler) = self.handler.clone() else {
            return;
        };
        let width = self.outputs.len();
        let rows = match handler.call(&self.name, &self.format_arguments(), width) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("{}", e);
                return;
            }
        };

        // one bad row discards the whole table
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            log::warn!(
                "malformed row from table function '{}': got {} entries, expected {}",
                self.name,
                row.len(),
                width
            );
            return;
        }
        for term in rows.iter().flatten() {
            let id = self.resolve(term);
            self.table.push(id);
        }
    }

    fn produce(&mut self) -> u32 {
        loop {
            if self.pos < self.table.len() {
                for reg in &self.outputs {
                    reg.set(self.table[self.pos]);
                    self.pos += 1;
                }
                self.observed += self.count as u64;
                return self.count;
            }
            self.count = self.input.next();
            if self.count == 0 {
                return 0;
            }
            self.request_table();
        }
    }
}

impl Operator for TableFunction {
    fn first(&mut self) -> u32 {
        self.observed = 0;
        self.count = self.input.first();
        if self.count == 0 {
            return 0;
        }
        self.request_table();
        self.produce()
    }

    fn next(&mut self) -> u32 {
        self.produce()
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("TableFunction", self.expected, self.observed);
        let arguments: Vec<String> = self
            .arguments
            .iter()
            .map(|arg| match arg {
                FunctionArgument::Register(reg) => out.format_register(reg),
                FunctionArgument::Value(value) => value.clone(),
            })
            .collect();
        let outputs: Vec<String> = self.outputs.iter().map(|r| out.format_register(r)).collect();
        out.add_generic_annotation(&format!(
            "{} [{}] [{}]",
            self.name,
            arguments.join(" "),
            outputs.join(" ")
        ));
        self.input.print(out);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, reg1: &RegisterRef, reg2: &RegisterRef) {
        self.input.add_merge_hint(reg1, reg2);
    }

    fn async_input_candidates(&mut self, scheduler: &mut Scheduler) {
        self.input.async_input_candidates(scheduler);
    }

    fn expected_cardinality(&self) -> f64 {
        self.expected
    }

    fn observed_cardinality(&self) -> u64 {
        self.observed
    }
}
