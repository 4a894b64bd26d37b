// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Operator tree printing

use crate::runtime::{DictionaryHandle, RegisterRef};
use crate::storage::{Dictionary, NULL_ID};
use std::fmt::Write;

/// Visitor receiving the structure of an operator tree
pub trait PlanPrinter {
    /// Open an operator
    fn begin_operator(&mut self, name: &str, expected: f64, observed: u64);

    /// Operator argument, e.g. the scan order
    fn add_argument_annotation(&mut self, argument: &str);

    /// One slot of a scan, printed as value when bound
    fn add_scan_annotation(&mut self, reg: &RegisterRef, bound: bool);

    /// `reg1 = reg2`
    fn add_equal_predicate_annotation(&mut self, reg1: &RegisterRef, reg2: &RegisterRef);

    /// Registers an operator materializes
    fn add_materialization_annotation(&mut self, regs: &[RegisterRef]);

    /// Free-form text
    fn add_generic_annotation(&mut self, text: &str);

    /// Close the current operator
    fn end_operator(&mut self);

    fn format_register(&self, reg: &RegisterRef) -> String;

    fn format_value(&self, value: u32) -> String;
}

/// Indented text rendering
///
/// ```text
/// <MergeJoin 12
///  ?0=?3
///  []
///  <IndexScan 40
///   SubjectPredicateObject
///   ...
///  >
/// >
/// ```
pub struct DebugPlanPrinter {
    out: String,
    dictionary: DictionaryHandle,
    level: usize,
    show_observed: bool,
}

impl DebugPlanPrinter {
    pub fn new(dictionary: DictionaryHandle, show_observed: bool) -> Self {
        Self {
            out: String::new(),
            dictionary,
            level: 0,
            show_observed,
        }
    }

    /// The text written so far
    pub fn output(&self) -> &str {
        &self.out
    }

    pub fn into_output(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.level {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
}

impl PlanPrinter for DebugPlanPrinter {
    fn begin_operator(&mut self, name: &str, expected: f64, observed: u64) {
        let mut header = format!("<{} {}", name, expected);
        if self.show_observed {
            let _ = write!(header, " {}", observed);
        }
        self.line(&header);
        self.level += 1;
    }

    fn add_argument_annotation(&mut self, argument: &str) {
        self.line(argument);
    }

    fn add_scan_annotation(&mut self, reg: &RegisterRef, bound: bool) {
        let text = if bound {
            self.format_value(reg.get())
        } else {
            self.format_register(reg)
        };
        self.line(&text);
    }

    fn add_equal_predicate_annotation(&mut self, reg1: &RegisterRef, reg2: &RegisterRef) {
        let text = format!("{}={}", self.format_register(reg1), self.format_register(reg2));
        self.line(&text);
    }

    fn add_materialization_annotation(&mut self, regs: &[RegisterRef]) {
        let names: Vec<String> = regs.iter().map(|r| self.format_register(r)).collect();
        let text = format!("[{}]", names.join(" "));
        self.line(&text);
    }

    fn add_generic_annotation(&mut self, text: &str) {
        self.line(text);
    }

    fn end_operator(&mut self) {
        self.level = self.level.saturating_sub(1);
        self.line(">");
    }

    fn format_register(&self, reg: &RegisterRef) -> String {
        format!("?{}", reg.slot())
    }

    fn format_value(&self, value: u32) -> String {
        if value == NULL_ID {
            return "NULL".to_string();
        }
        match self.dictionary.lookup_by_id(value) {
            Some(literal) => format!("\"{}\"", literal.text),
            None => format!("@?{}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Register;
    use crate::storage::{Database, MemoryDatabase};
    use std::sync::Arc;

    #[test]
    fn test_debug_printer_layout() {
        let db = Arc::new(MemoryDatabase::new());
        let a = db.uri("a");
        let database: Arc<dyn Database> = db;
        let mut printer = DebugPlanPrinter::new(DictionaryHandle::new(database, None), true);

        let r0 = Arc::new(Register::new(0));
        let r1 = Arc::new(Register::new(1));
        r1.set(a);
        printer.begin_operator("Outer", 2.0, 5);
        printer.add_equal_predicate_annotation(&r0, &r1);
        printer.begin_operator("Inner", 1.5, 3);
        printer.add_scan_annotation(&r1, true);
        printer.add_scan_annotation(&r0, false);
        printer.add_materialization_annotation(&[r0.clone(), r1.clone()]);
        printer.end_operator();
        printer.end_operator();

        let expected = "<Outer 2 5\n ?0=?1\n <Inner 1.5 3\n  \"a\"\n  ?0\n  [?0 ?1]\n >\n>\n";
        assert_eq!(printer.output(), expected);
    }

    #[test]
    fn test_format_value_unknown_and_null() {
        let database: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let printer = DebugPlanPrinter::new(DictionaryHandle::new(database, None), false);
        assert_eq!(printer.format_value(NULL_ID), "NULL");
        assert_eq!(printer.format_value(42), "@?42");
    }
}
