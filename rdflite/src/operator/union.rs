// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! N-ary bag union

use super::{BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::RegisterRef;

/// Concatenates its branches
///
/// Each branch writes its own registers. `mappings[i]` copies branch `i`'s
/// registers into the shared result registers as (from, to) pairs and
/// `initializations[i]` lists the result registers branch `i` never binds;
/// they are reset to NULL when the branch starts.
pub struct Union {
    parts: Vec<BoxedOperator>,
    mappings: Vec<Vec<(RegisterRef, RegisterRef)>>,
    initializations: Vec<Vec<RegisterRef>>,
    current: usize,
    expected: f64,
    observed: u64,
}

impl Union {
    pub fn new(
        parts: Vec<BoxedOperator>,
        mappings: Vec<Vec<(RegisterRef, RegisterRef)>>,
        initializations: Vec<Vec<RegisterRef>>,
        expected: f64,
    ) -> Self {
        debug_assert_eq!(parts.len(), mappings.len());
        debug_assert_eq!(parts.len(), initializations.len());
        Self {
            parts,
            mappings,
            initializations,
            current: 0,
            expected,
            observed: 0,
        }
    }

    fn copy_values(&self) {
        for (from, to) in &self.mappings[self.current] {
            to.set(from.get());
        }
    }

    fn first_from_part(&mut self) -> u32 {
        while self.current < self.parts.len() {
            let count = self.parts[self.current].first();
            if count == 0 {
                self.current += 1;
                continue;
            }
            for reg in &self.initializations[self.current] {
                reg.clear();
            }
            self.copy_values();
            self.observed += count as u64;
            return count;
        }
        0
    }
}

impl Operator for Union {
    fn first(&mut self) -> u32 {
        self.observed = 0;
        self.current = 0;
        self.first_from_part()
    }

    fn next(&mut self) -> u32 {
        if self.current >= self.parts.len() {
            return 0;
        }
        let count = self.parts[self.current].next();
        if count == 0 {
            self.current += 1;
            return self.first_from_part();
        }
        self.copy_values();
        self.observed += count as u64;
        count
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("Union", self.expected, self.observed);
        for (mapping, init) in self.mappings.iter().zip(&self.initializations) {
            let flat: Vec<RegisterRef> = mapping
                .iter()
                .flat_map(|(from, to)| [from.clone(), to.clone()])
                .collect();
            out.add_materialization_annotation(&flat);
            out.add_materialization_annotation(init);
        }
        for part in &self.parts {
            part.print(out);
        }
        out.end_operator();
    }

    // branches interleave, no common order
    fn add_merge_hint(&mut self, _reg1: &RegisterRef, _reg2: &RegisterRef) {}

    fn async_input_candidates(&mut self, scheduler: &mut Scheduler) {
        for part in &mut self.parts {
            part.async_input_candidates(scheduler);
        }
    }

    fn expected_cardinality(&self) -> f64 {
        self.expected
    }

    fn observed_cardinality(&self) -> u64 {
        self.observed
    }
}
