// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hash based duplicate elimination

use super::{BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::RegisterRef;
use std::collections::HashMap;

/// Groups its input on `values`, summing multiplicities
///
/// Groups come out in order of first appearance.
pub struct HashGroupify {
    input: BoxedOperator,
    values: Vec<RegisterRef>,
    groups: Vec<(Vec<u32>, u32)>,
    pos: usize,
    expected: f64,
    observed: u64,
}

impl HashGroupify {
    pub fn new(input: BoxedOperator, values: Vec<RegisterRef>, expected: f64) -> Self {
        Self {
            input,
            values,
            groups: Vec::new(),
            pos: 0,
            expected,
            observed: 0,
        }
    }
}

impl Operator for HashGroupify {
    fn first(&mut self) -> u32 {
        self.observed = 0;

        self.groups.clear();
        let mut index: HashMap<Vec<u32>, usize> = HashMap::new();
        let mut count = self.input.first();
        while count != 0 {
            let key: Vec<u32> = self.values.iter().map(|r| r.get()).collect();
            match index.get(&key) {
                Some(group) => {
                    let entry = &mut self.groups[*group].1;
                    *entry = entry.saturating_add(count);
                }
                None => {
                    index.insert(key.clone(), self.groups.len());
                    self.groups.push((key, count));
                }
            }
            count = self.input.next();
        }

        self.pos = 0;
        self.next()
    }

    fn next(&mut self) -> u32 {
        let Some((values, count)) = self.groups.get(self.pos) else {
            return 0;
        };
        for (reg, value) in self.values.iter().zip(values) {
            reg.set(*value);
        }
        let count = *count;
        self.pos += 1;
        self.observed += count as u64;
        count
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("HashGroupify", self.expected, self.observed);
        out.add_materialization_annotation(&self.values);
        self.input.print(out);
        out.end_operator();
    }

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
