// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Register layout of a query
//!
//! Every triple pattern gets three consecutive registers (subject, predicate,
//! object), every table function call one register per output. Registers of
//! the same variable form a class; classes with two or more registers share a
//! potential domain.
//!
//! Classes are scoped: optional parts and union branches open a scope of their
//! own, so that narrowing a domain inside one branch cannot prune the rows of
//! a sibling or of the required part.

use crate::plan::{QueryGraph, SubQuery, VariableId};
use crate::runtime::Runtime;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub(crate) struct RegisterLayout {
    /// First register of each pattern, by `NodeId`
    pub(crate) patterns: Vec<usize>,
    /// First output register of each table function call, by `NodeId`
    pub(crate) functions: Vec<usize>,
    /// Registers per (scope, variable)
    classes: BTreeMap<(usize, VariableId), BTreeSet<usize>>,
    count: usize,
    scopes: usize,
}

impl RegisterLayout {
    pub(crate) fn new(query: &QueryGraph) -> Self {
        let mut layout = Self {
            scopes: 1,
            ..Default::default()
        };
        layout.walk(query.query(), 0);
        layout
    }

    // Nodes and calls are numbered in the same order QueryGraph hands out
    // NodeIds: own items first, then optional parts, then union branches.
    fn walk(&mut self, query: &SubQuery, scope: usize) {
        for node in &query.nodes {
            self.patterns.push(self.count);
            for (offset, slot) in node.slots().iter().enumerate() {
                if let Some(var) = slot.variable() {
                    self.add(scope, var, self.count + offset);
                }
            }
            self.count += 3;
        }
        for call in &query.table_functions {
            self.functions.push(self.count);
            for (offset, var) in call.output.iter().enumerate() {
                self.add(scope, *var, self.count + offset);
            }
            self.count += call.output.len();
        }
        for optional in &query.optional {
            let inner = self.open_scope();
            self.walk(optional, inner);
        }
        for branch in query.unions.iter().flatten() {
            let inner = self.open_scope();
            self.walk(branch, inner);
        }
    }

    fn open_scope(&mut self) -> usize {
        self.scopes += 1;
        self.scopes - 1
    }

    fn add(&mut self, scope: usize, var: VariableId, register: usize) {
        self.classes.entry((scope, var)).or_default().insert(register);
    }

    /// Registers used by patterns and table functions
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    /// Classes that need a shared domain
    fn join_classes(&self) -> impl Iterator<Item = &BTreeSet<usize>> {
        self.classes.values().filter(|regs| regs.len() >= 2)
    }

    /// Allocate the register array, one extra register that stays NULL, and
    /// the domains of join variables
    pub(crate) fn install(&self, runtime: &mut Runtime) {
        runtime.allocate_registers(self.count + 1);
        let classes: Vec<&BTreeSet<usize>> = self.join_classes().collect();
        runtime.allocate_domains(classes.len());
        for (index, class) in classes.iter().enumerate() {
            let Some(domain) = runtime.domain(index).cloned() else {
                continue;
            };
            for slot in class.iter() {
                if let Some(reg) = runtime.register(*slot) {
                    reg.attach_domain(domain.clone());
                }
            }
        }
        log::debug!(
            "allocated {} registers and {} domains",
            self.count + 1,
            classes.len()
        );
    }
}
