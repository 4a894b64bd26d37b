// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Join algorithm equivalence tests
//!
//! Nested loop, merge and hash join must produce the same multiset for the
//! same query, and hash optional must follow left outer join semantics.

#[path = "testutils/mod.rs"]
mod testutils;

use rdflite::plan::{QueryGraph, SubQuery};
use rdflite::storage::Triple;
use rdflite::{ExecutionConfig, Plan};
use std::collections::BTreeSet;
use testutils::*;

const P1: u32 = 100;
const P2: u32 = 101;
const P3: u32 = 102;

/// `?a p1 ?b . ?b p2 ?c`
fn chain_query() -> QueryGraph {
    let mut query = QueryGraph::new(patterns(vec![
        pattern(var(0), constant(P1), var(1)),
        pattern(var(1), constant(P2), var(2)),
    ]));
    query.add_projection(0);
    query.add_projection(1);
    query.add_projection(2);
    query
}

/// Every physical variant of the chain join; pattern 0 sorted on ?b is POS,
/// pattern 1 sorted on ?b is PSO
fn chain_plans() -> Vec<Plan> {
    let left = || Plan::index_scan(POS, 0, 10.0);
    let right = || Plan::index_scan(PSO, 1, 10.0);
    vec![
        Plan::merge_join(left(), right(), 1, 10.0),
        Plan::merge_join(right(), left(), 1, 10.0),
        Plan::hash_join(left(), right(), 10.0),
        Plan::hash_join(right(), left(), 10.0),
        Plan::nested_loop_join(left(), right(), 10.0),
        Plan::nested_loop_join(Plan::index_scan(SPO, 1, 10.0), Plan::index_scan(OSP, 0, 10.0), 10.0),
    ]
}

#[test]
fn test_random_inputs_join_identically() {
    init_logging();
    let query = chain_query();
    for seed in 0..12 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let triples = random_triples(&mut rng, 40, 8, &[P1, P2]);
        let expected = chain_join(&triples, P1, P2);
        let db = raw_database(&triples);
        let executor = executor(&db);

        for plan in chain_plans() {
            let result = executor.execute(&query, Some(&plan)).unwrap();
            assert_eq!(multiset(&result), expected, "seed {} plan\n{}", seed, plan);
        }
    }
}

#[test]
fn test_merge_join_group_boundaries() {
    // key 1: 1:1, key 2: 1:n, key 3: n:1, key 4: n:m, key 5 and 6 unmatched
    let mut triples = BTreeSet::new();
    let mut add = |s: u32, p: u32, o: u32| {
        triples.insert(Triple::new(s, p, o));
    };
    add(10, P1, 1);
    add(1, P2, 20);
    add(11, P1, 2);
    for o in 21..24 {
        add(2, P2, o);
    }
    for s in 12..15 {
        add(s, P1, 3);
    }
    add(3, P2, 24);
    add(15, P1, 4);
    add(16, P1, 4);
    add(4, P2, 25);
    add(4, P2, 26);
    add(17, P1, 5);
    add(6, P2, 27);

    let expected = chain_join(&triples, P1, P2);
    assert_eq!(expected.len(), 1 + 3 + 3 + 4);

    let db = raw_database(&triples);
    let executor = executor(&db);
    let query = chain_query();
    let merge = Plan::merge_join(
        Plan::index_scan(POS, 0, 8.0),
        Plan::index_scan(PSO, 1, 8.0),
        1,
        11.0,
    );
    let hash = Plan::hash_join(Plan::index_scan(PSO, 1, 8.0), Plan::index_scan(SPO, 0, 8.0), 11.0);

    let merged = executor.execute(&query, Some(&merge)).unwrap();
    let hashed = executor.execute(&query, Some(&hash)).unwrap();
    assert_eq!(multiset(&merged), expected);
    assert_eq!(multiset(&hashed), expected);
}

#[test]
fn test_worker_threads_do_not_change_results() {
    let mut rng = fastrand::Rng::with_seed(42);
    let triples = random_triples(&mut rng, 200, 20, &[P1, P2]);
    let expected = chain_join(&triples, P1, P2);
    let db = raw_database(&triples);
    let threaded = executor(&db).with_config(ExecutionConfig {
        worker_threads: 4,
        hash_table_initial_size: 16,
        ..Default::default()
    });

    let query = chain_query();
    for plan in [
        Plan::hash_join(Plan::index_scan(PSO, 1, 10.0), Plan::index_scan(POS, 0, 10.0), 10.0),
        Plan::merge_join(Plan::index_scan(POS, 0, 10.0), Plan::index_scan(PSO, 1, 10.0), 1, 10.0),
    ] {
        let result = threaded.execute(&query, Some(&plan)).unwrap();
        assert_eq!(multiset(&result), expected);
    }
}

/// `?a p1 ?b OPTIONAL { ?b p2 ?c }`
fn optional_query() -> QueryGraph {
    let mut query = QueryGraph::new(
        patterns(vec![pattern(var(0), constant(P1), var(1))])
            .with_optional(patterns(vec![pattern(var(1), constant(P2), var(2))])),
    );
    query.add_projection(0);
    query.add_projection(1);
    query.add_projection(2);
    query
}

#[test]
fn test_hash_optional_is_left_outer_join() {
    for seed in 0..8 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let triples = random_triples(&mut rng, 30, 8, &[P1, P2]);

        let mut expected = Vec::new();
        for left in triples.iter().filter(|t| t.predicate == P1) {
            let matches: Vec<_> = triples
                .iter()
                .filter(|t| t.predicate == P2 && t.subject == left.object)
                .collect();
            if matches.is_empty() {
                expected.push(vec![Some(left.subject), Some(left.object), None]);
            }
            for right in matches {
                expected.push(vec![Some(left.subject), Some(left.object), Some(right.object)]);
            }
        }
        expected.sort();

        let db = raw_database(&triples);
        let plan = Plan::hash_optional(
            Plan::index_scan(SPO, 0, 10.0),
            Plan::index_scan(PSO, 1, 10.0),
            10.0,
        );
        let result = executor(&db).execute(&optional_query(), Some(&plan)).unwrap();
        assert_eq!(multiset(&result), expected, "seed {}", seed);
    }
}

#[test]
fn test_hash_optional_checks_every_shared_variable() {
    // ?a p1 ?b OPTIONAL { ?a p3 ?b }: the key is ?a, ?b is compared per match
    let triples: BTreeSet<Triple> = [
        Triple::new(1, P1, 2),
        Triple::new(1, P1, 3),
        Triple::new(1, P3, 2),
        Triple::new(1, P3, 4),
    ]
    .into_iter()
    .collect();
    let db = raw_database(&triples);

    let mut query = QueryGraph::new(
        patterns(vec![pattern(var(0), constant(P1), var(1))])
            .with_optional(SubQuery::new().with_node(pattern(var(0), constant(P3), var(1)))),
    );
    query.add_projection(0);
    query.add_projection(1);
    let plan = Plan::hash_optional(
        Plan::index_scan(PSO, 0, 2.0),
        Plan::index_scan(PSO, 1, 2.0),
        2.0,
    );
    let result = executor(&db).execute(&query, Some(&plan)).unwrap();
    assert_eq!(
        multiset(&result),
        vec![vec![Some(1), Some(2)], vec![Some(1), Some(3)]]
    );
}
