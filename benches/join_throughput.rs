// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Benchmark for join throughput
//!
//! Runs the same two-pattern chain query with every join algorithm, with and
//! without scan skipping, and with worker threads for the hash join builds.

use rdflite::operator::set_skipping_enabled;
use rdflite::plan::{Node, PatternSlot, QueryGraph, SubQuery};
use rdflite::storage::{DataOrder, Triple};
use rdflite::{Database, ExecutionConfig, MemoryDatabase, Plan, QueryExecutor};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

const P1: u32 = 1_000_000;
const P2: u32 = 1_000_001;
const ITERATIONS: usize = 20;

fn chain_query() -> QueryGraph {
    let mut query = QueryGraph::new(
        SubQuery::new()
            .with_node(Node::new(
                PatternSlot::Variable(0),
                PatternSlot::Constant(P1),
                PatternSlot::Variable(1),
            ))
            .with_node(Node::new(
                PatternSlot::Variable(1),
                PatternSlot::Constant(P2),
                PatternSlot::Variable(2),
            )),
    );
    query.add_projection(0);
    query.add_projection(2);
    query
}

fn measure(name: &str, executor: &QueryExecutor, query: &QueryGraph, plan: &Plan) {
    let start = Instant::now();
    let mut rows = 0;
    for _ in 0..ITERATIONS {
        match executor.execute(query, Some(plan)) {
            Ok(result) => rows = result.total_count(),
            Err(e) => {
                println!("  {}: failed: {}", name, e);
                return;
            }
        }
    }
    let duration = start.elapsed();
    println!(
        "  {:<28} {:>8} rows  {:>10.2?}/query  {:>8.1} queries/sec",
        name,
        rows,
        duration / ITERATIONS as u32,
        ITERATIONS as f64 / duration.as_secs_f64()
    );
}

fn main() {
    println!("=== Join Throughput Benchmark ===\n");

    // a sparse left side joined to a dense right side, so skipping pays off
    let mut rng = fastrand::Rng::with_seed(17);
    let mut triples = BTreeSet::new();
    for _ in 0..2_000 {
        triples.insert(Triple::new(rng.u32(0..50_000), P1, rng.u32(0..50_000)));
    }
    for _ in 0..200_000 {
        triples.insert(Triple::new(rng.u32(0..50_000), P2, rng.u32(0..50_000)));
    }
    println!("Loaded {} triples\n", triples.len());
    let db = Arc::new(MemoryDatabase::with_triples(triples));

    let query = chain_query();
    let left = || Plan::index_scan(DataOrder::PredicateObjectSubject, 0, 2_000.0);
    let right = || Plan::index_scan(DataOrder::PredicateSubjectObject, 1, 200_000.0);
    let plans = [
        ("merge join", Plan::merge_join(left(), right(), 1, 8_000.0)),
        ("hash join (build small)", Plan::hash_join(left(), right(), 8_000.0)),
        ("hash join (build large)", Plan::hash_join(right(), left(), 8_000.0)),
    ];

    let single = QueryExecutor::new(db.clone() as Arc<dyn Database>)
        .with_config(ExecutionConfig::default());
    for skipping in [false, true] {
        set_skipping_enabled(skipping);
        println!("📊 Single threaded, skipping {}:", if skipping { "on" } else { "off" });
        for (name, plan) in &plans {
            measure(name, &single, &query, plan);
        }
        println!();
    }

    let threaded = QueryExecutor::new(db as Arc<dyn Database>).with_config(ExecutionConfig {
        worker_threads: 4,
        ..Default::default()
    });
    println!("📊 Four worker threads, skipping on:");
    for (name, plan) in &plans {
        measure(name, &threaded, &query, plan);
    }
}
