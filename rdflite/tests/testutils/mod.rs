// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Test utilities for RDFLite integration tests
//!
//! Builds small databases, query graphs and plans, and turns query results
//! into sorted multisets for comparison.

#![allow(dead_code)]

use rdflite::plan::{Node, PatternSlot, SubQuery, VariableId};
use rdflite::storage::{DataOrder, Triple};
use rdflite::{Database, ExecutionConfig, MemoryDatabase, QueryExecutor, QueryResult};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const SPO: DataOrder = DataOrder::SubjectPredicateObject;
pub const SOP: DataOrder = DataOrder::SubjectObjectPredicate;
pub const OPS: DataOrder = DataOrder::ObjectPredicateSubject;
pub const OSP: DataOrder = DataOrder::ObjectSubjectPredicate;
pub const PSO: DataOrder = DataOrder::PredicateSubjectObject;
pub const POS: DataOrder = DataOrder::PredicateObjectSubject;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn var(v: VariableId) -> PatternSlot {
    PatternSlot::Variable(v)
}

pub fn constant(id: u32) -> PatternSlot {
    PatternSlot::Constant(id)
}

pub fn pattern(subject: PatternSlot, predicate: PatternSlot, object: PatternSlot) -> Node {
    Node::new(subject, predicate, object)
}

/// A subquery made of the given patterns
pub fn patterns(nodes: Vec<Node>) -> SubQuery {
    nodes
        .into_iter()
        .fold(SubQuery::new(), |query, node| query.with_node(node))
}

/// Single-threaded executor with default settings
pub fn executor(db: &Arc<MemoryDatabase>) -> QueryExecutor {
    QueryExecutor::new(db.clone() as Arc<dyn Database>).with_config(ExecutionConfig::default())
}

/// Rows expanded by multiplicity and sorted
pub fn multiset(result: &QueryResult) -> Vec<Vec<Option<u32>>> {
    let mut rows = Vec::new();
    for row in &result.rows {
        for _ in 0..row.count {
            rows.push(row.values.clone());
        }
    }
    rows.sort();
    rows
}

/// Triples over a small id space, so joins find partners
///
/// Ids are raw: `subjects` and objects come from `0..values`, predicates
/// from `predicates`.
pub fn random_triples(
    rng: &mut fastrand::Rng,
    count: usize,
    values: u32,
    predicates: &[u32],
) -> BTreeSet<Triple> {
    (0..count)
        .map(|_| {
            let p = predicates[rng.usize(..predicates.len())];
            Triple::new(rng.u32(0..values), p, rng.u32(0..values))
        })
        .collect()
}

/// Database holding raw-id triples without dictionary entries
pub fn raw_database(triples: &BTreeSet<Triple>) -> Arc<MemoryDatabase> {
    Arc::new(MemoryDatabase::with_triples(triples.iter().copied()))
}

/// Relational join of `?a p1 ?b` and `?b p2 ?c` as (a, b, c) rows
pub fn chain_join(triples: &BTreeSet<Triple>, p1: u32, p2: u32) -> Vec<Vec<Option<u32>>> {
    let mut rows = Vec::new();
    for left in triples.iter().filter(|t| t.predicate == p1) {
        for right in triples.iter().filter(|t| t.predicate == p2) {
            if left.object == right.subject {
                rows.push(vec![
                    Some(left.subject),
                    Some(left.object),
                    Some(right.object),
                ]);
            }
        }
    }
    rows.sort();
    rows
}
