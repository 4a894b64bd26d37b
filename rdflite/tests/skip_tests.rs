// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Scan skipping must never change results
//!
//! These tests flip the process-wide skip switch and run serially.

#[path = "testutils/mod.rs"]
mod testutils;

use rdflite::operator::{set_skipping_enabled, skipping_enabled};
use rdflite::plan::{DuplicateHandling, QueryGraph};
use rdflite::storage::DataOrder;
use rdflite::{Database, ExecutionConfig, MemoryDatabase, Plan, QueryExecutor, QueryResult};
use serial_test::serial;
use std::sync::Arc;
use testutils::*;

const P1: u32 = 1000;
const P2: u32 = 1001;

/// Results with the switch off, then on
fn run_both(db: &Arc<MemoryDatabase>, query: &QueryGraph, plan: &Plan) -> (QueryResult, QueryResult) {
    let executor = executor(db);
    set_skipping_enabled(false);
    let plain = executor.execute(query, Some(plan)).unwrap();
    set_skipping_enabled(true);
    let skipping = executor.execute(query, Some(plan)).unwrap();
    (plain, skipping)
}

#[test]
#[serial]
fn test_joins_with_and_without_skipping() {
    init_logging();
    let mut query = QueryGraph::new(patterns(vec![
        pattern(var(0), constant(P1), var(1)),
        pattern(var(1), constant(P2), var(2)),
    ]));
    query.add_projection(0);
    query.add_projection(2);

    for seed in 0..6 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let triples = random_triples(&mut rng, 300, 64, &[P1, P2]);
        let db = raw_database(&triples);
        let plans = [
            Plan::merge_join(Plan::index_scan(POS, 0, 1.0), Plan::index_scan(PSO, 1, 1.0), 1, 1.0),
            Plan::hash_join(Plan::index_scan(POS, 0, 1.0), Plan::index_scan(PSO, 1, 1.0), 1.0),
            Plan::hash_join(Plan::index_scan(PSO, 1, 1.0), Plan::index_scan(POS, 0, 1.0), 1.0),
        ];
        for plan in &plans {
            let (plain, skipping) = run_both(&db, &query, plan);
            assert_eq!(plain.rows, skipping.rows, "seed {} plan\n{}", seed, plan);
        }
    }
    assert!(skipping_enabled());
}

#[test]
#[serial]
fn test_scans_with_and_without_skipping() {
    let mut rng = fastrand::Rng::with_seed(7);
    let triples = random_triples(&mut rng, 400, 32, &[P1, P2]);
    let db = raw_database(&triples);

    // every combination of bound positions, in every order
    let slots = |mask: u32| {
        let pick = |bit: u32, value: u32, v: u32| {
            if mask & bit != 0 {
                constant(value)
            } else {
                var(v)
            }
        };
        pattern(pick(1, 5, 0), pick(2, P1, 1), pick(4, 9, 2))
    };
    for mask in 0..8u32 {
        let mut query = QueryGraph::new(patterns(vec![slots(mask)]));
        for v in 0..3 {
            if mask & (1 << v) == 0 {
                query.add_projection(v);
            }
        }
        for order in DataOrder::ALL {
            let plan = Plan::index_scan(order, 0, 1.0);
            let (plain, skipping) = run_both(&db, &query, &plan);
            assert_eq!(plain.rows, skipping.rows, "mask {} order {:?}", mask, order);
        }
    }
}

#[test]
#[serial]
fn test_aggregated_scans_with_and_without_skipping() {
    let mut rng = fastrand::Rng::with_seed(11);
    let triples = random_triples(&mut rng, 400, 16, &[P1, P2]);
    let db = raw_database(&triples);

    let mut query = QueryGraph::new(patterns(vec![
        pattern(var(0), constant(P1), var(1)),
        pattern(var(1), constant(P2), var(2)),
    ]));
    query.add_projection(1);
    query.set_duplicate_handling(DuplicateHandling::Count);

    let plan = Plan::merge_join(
        Plan::aggregated_index_scan(POS, 0, 1.0),
        Plan::aggregated_index_scan(PSO, 1, 1.0),
        1,
        1.0,
    );
    let (plain, skipping) = run_both(&db, &query, &plan);
    assert!(!plain.is_empty());
    assert_eq!(plain.rows, skipping.rows);
}

#[test]
#[serial]
fn test_only_explicit_configuration_sets_the_switch() {
    let db = Arc::new(MemoryDatabase::new());
    set_skipping_enabled(false);
    let _plain = QueryExecutor::new(db.clone() as Arc<dyn Database>);
    assert!(!skipping_enabled());

    let _configured = QueryExecutor::new(db as Arc<dyn Database>).with_config(ExecutionConfig {
        skip_scans: true,
        ..Default::default()
    });
    assert!(skipping_enabled());
}
