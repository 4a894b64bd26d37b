// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Nested loop join

use super::{multiply, BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::RegisterRef;

/// Re-runs the right input for every left tuple
///
/// Join conditions are expressed by the right input reading registers the
/// left input wrote, typically as the bound prefix of an index scan.
pub struct NestedLoopJoin {
    left: BoxedOperator,
    right: BoxedOperator,
    left_count: u32,
    expected: f64,
    observed: u64,
}

impl NestedLoopJoin {
    pub fn new(left: BoxedOperator, right: BoxedOperator, expected: f64) -> Self {
        Self {
            left,
            right,
            left_count: 0,
            expected,
            observed: 0,
        }
    }

    /// Advance the left side until the right side produces something
    fn find_match(&mut self) -> u32 {
        loop {
            let right_count = self.right.first();
            if right_count != 0 {
                let count = multiply(self.left_count, right_count);
                self.observed += count as u64;
                return count;
            }
            self.left_count = self.left.next();
            if self.left_count == 0 {
                return 0;
            }
        }
    }
}

impl Operator for NestedLoopJoin {
    fn first(&mut self) -> u32 {
        self.observed = 0;
        self.left_count = self.left.first();
        if self.left_count == 0 {
            return 0;
        }
        self.find_match()
    }

    fn next(&mut self) -> u32 {
        let right_count = self.right.next();
        if right_count != 0 {
            let count = multiply(self.left_count, right_count);
            self.observed += count as u64;
            return count;
        }
        self.left_count = self.left.next();
        if self.left_count == 0 {
            return 0;
        }
        self.find_match()
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("NestedLoopJoin", self.expected, self.observed);
        self.left.print(out);
        self.right.print(out);
        out.end_operator();
    }

    // only the outer side keeps its order
    fn add_merge_hint(&mut self, reg1: &RegisterRef, reg2: &RegisterRef) {
        self.left.add_merge_hint(reg1, reg2);
    }

    fn async_input_candidates(&mut self, scheduler: &mut Scheduler) {
        self.left.async_input_candidates(scheduler);
        self.right.async_input_candidates(scheduler);
    }

    fn expected_cardinality(&self) -> f64 {
        self.expected
    }

    fn observed_cardinality(&self) -> u64 {
        self.observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::testing::{drain, reg, ValuesScan};
    use crate::operator::{IndexScan, ScanKind};
    use crate::storage::{DataOrder, Database, MemoryDatabase, Triple};
    use std::sync::Arc;

    #[test]
    fn test_inner_scan_is_bound_per_outer_tuple() {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::with_triples(vec![
            Triple::new(1, 10, 100),
            Triple::new(1, 10, 101),
            Triple::new(3, 10, 102),
        ]));
        let (s, p, o) = (reg(0), reg(1), reg(2));
        let outer = ValuesScan::new(&[s.clone()], vec![(vec![1], 2), (vec![2], 1), (vec![3], 1)]);
        let inner = IndexScan::new(
            db,
            ScanKind::Full,
            DataOrder::SubjectPredicateObject,
            [Some(s.clone()), Some(p), Some(o.clone())],
            [true, false, false],
            1.0,
        );
        let mut join = NestedLoopJoin::new(Box::new(outer), Box::new(inner), 3.0);
        assert_eq!(
            drain(&mut join, &[s, o]),
            vec![(vec![1, 100], 2), (vec![1, 101], 2), (vec![3, 102], 1)]
        );
        assert_eq!(join.observed_cardinality(), 5);
    }
}
