// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Constant-set filters

use super::{BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::{ObservedDomain, RegisterRef};
use std::collections::BTreeSet;

/// Passes tuples whose register value is (or, excluding, is not) in a set
pub struct Filter {
    input: BoxedOperator,
    filter: RegisterRef,
    values: BTreeSet<u32>,
    exclude: bool,
    expected: f64,
    observed: u64,
}

impl Filter {
    pub fn new(
        input: BoxedOperator,
        filter: RegisterRef,
        values: impl IntoIterator<Item = u32>,
        exclude: bool,
        expected: f64,
    ) -> Self {
        Self {
            input,
            filter,
            values: values.into_iter().collect(),
            exclude,
            expected,
            observed: 0,
        }
    }

    fn accepts(&self) -> bool {
        self.values.contains(&self.filter.get()) != self.exclude
    }

    fn skip_rejected(&mut self, mut count: u32) -> u32 {
        while count != 0 && !self.accepts() {
            count = self.input.next();
        }
        self.observed += count as u64;
        count
    }
}

impl Operator for Filter {
    fn first(&mut self) -> u32 {
        self.observed = 0;

        if !self.exclude {
            if let Some(domain) = self.filter.domain() {
                let mut observed = ObservedDomain::new();
                for value in &self.values {
                    observed.add(*value);
                }
                domain.restrict_to(&observed);
            }
        }

        let count = self.input.first();
        self.skip_rejected(count)
    }

    fn next(&mut self) -> u32 {
        let count = self.input.next();
        self.skip_rejected(count)
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("Filter", self.expected, self.observed);
        let values: Vec<String> = self.values.iter().map(|v| out.format_value(*v)).collect();
        let predicate = format!(
            "{}{} in {{{}}}",
            out.format_register(&self.filter),
            if self.exclude { " not" } else { "" },
            values.join(" ")
        );
        out.add_generic_annotation(&predicate);
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

/// Runs its input once per value, with the register set to that value
///
/// Useful when the input is a scan that can use the register as a bound
/// prefix: a handful of index lookups instead of a full scan plus filter.
pub struct NestedLoopFilter {
    input: BoxedOperator,
    filter: RegisterRef,
    values: Vec<u32>,
    pos: usize,
    expected: f64,
    observed: u64,
}

impl NestedLoopFilter {
    pub fn new(input: BoxedOperator, filter: RegisterRef, mut values: Vec<u32>, expected: f64) -> Self {
        values.sort_unstable();
        values.dedup();
        Self {
            input,
            filter,
            values,
            pos: 0,
            expected,
            observed: 0,
        }
    }

    /// Start the input for the value at `pos` or any later one
    fn start_from_pos(&mut self) -> u32 {
        while let Some(value) = self.values.get(self.pos) {
            self.filter.set(*value);
            let count = self.input.first();
            if count != 0 {
                self.observed += count as u64;
                return count;
            }
            self.pos += 1;
        }
        0
    }
}

impl Operator for NestedLoopFilter {
    fn first(&mut self) -> u32 {
        self.observed = 0;
        self.pos = 0;
        self.start_from_pos()
    }

    fn next(&mut self) -> u32 {
        if self.pos >= self.values.len() {
            return 0;
        }
        let count = self.input.next();
        if count != 0 {
            self.observed += count as u64;
            return count;
        }
        self.pos += 1;
        self.start_from_pos()
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("NestedLoopFilter", self.expected, self.observed);
        let values: Vec<String> = self.values.iter().map(|v| out.format_value(*v)).collect();
        let predicate = format!("{} in {{{}}}", out.format_register(&self.filter), values.join(" "));
        out.add_generic_annotation(&predicate);
        self.input.print(out);
        out.end_operator();
    }

    // the input restarts per value, so sortedness does not survive
    fn add_merge_hint(&mut self, _reg1: &RegisterRef, _reg2: &RegisterRef) {}

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::testing::{drain, reg, ValuesScan};
    use crate::operator::{IndexScan, ScanKind};
    use crate::runtime::PotentialDomain;
    use crate::storage::{DataOrder, Database, MemoryDatabase, Triple};
    use std::sync::Arc;

    #[test]
    fn test_filter_include_and_exclude() {
        let x = reg(0);
        let rows: &[&[u32]] = &[&[1], &[2], &[3], &[4]];
        let mut include = Filter::new(
            Box::new(ValuesScan::ones(&[x.clone()], rows)),
            x.clone(),
            [2, 4],
            false,
            2.0,
        );
        assert_eq!(drain(&mut include, &[x.clone()]), vec![(vec![2], 1), (vec![4], 1)]);
        assert_eq!(include.observed_cardinality(), 2);

        let mut exclude = Filter::new(
            Box::new(ValuesScan::ones(&[x.clone()], rows)),
            x.clone(),
            [2, 4],
            true,
            2.0,
        );
        assert_eq!(drain(&mut exclude, &[x]), vec![(vec![1], 1), (vec![3], 1)]);
    }

    #[test]
    fn test_filter_restricts_domain() {
        let x = reg(0);
        let domain = Arc::new(PotentialDomain::new());
        assert!(x.attach_domain(domain.clone()));
        let mut filter = Filter::new(
            Box::new(ValuesScan::ones(&[x.clone()], &[&[7]])),
            x.clone(),
            [7, 9],
            false,
            1.0,
        );
        assert_eq!(filter.first(), 1);
        assert!(domain.could_qualify(7));
        assert!(domain.could_qualify(9));
        assert_eq!(domain.next_candidate(8), 9);
    }

    #[test]
    fn test_nested_loop_filter_binds_prefix() {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::with_triples(vec![
            Triple::new(1, 2, 3),
            Triple::new(2, 2, 4),
            Triple::new(2, 2, 5),
            Triple::new(3, 2, 6),
        ]));
        let (s, p, o) = (reg(0), reg(1), reg(2));
        let scan = IndexScan::new(
            db,
            ScanKind::Full,
            DataOrder::SubjectPredicateObject,
            [Some(s.clone()), Some(p), Some(o.clone())],
            [true, false, false],
            1.0,
        );
        let mut filter = NestedLoopFilter::new(Box::new(scan), s.clone(), vec![3, 2, 9], 3.0);
        assert_eq!(
            drain(&mut filter, &[s, o]),
            vec![(vec![2, 4], 1), (vec![2, 5], 1), (vec![3, 6], 1)]
        );
    }
}
