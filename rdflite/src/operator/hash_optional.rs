// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hash-based left outer join

use super::hash_join::{register_async_points, BuildState, ProbeState};
use super::{multiply, BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::RegisterRef;
use parking_lot::Mutex;
use std::sync::Arc;

/// Left outer join: the optional input is hashed, the required input probes
///
/// Every probe tuple is emitted once per matching build tuple, or once with
/// the build registers set to NULL when nothing matches. Additional equality
/// conditions between the two sides are checked as `residuals` pairs of
/// (build register, probe register).
pub struct HashOptional {
    build: Arc<Mutex<BuildState>>,
    probe: Arc<Mutex<ProbeState>>,
    probe_value: RegisterRef,
    probe_tail: Vec<RegisterRef>,
    residuals: Vec<(RegisterRef, RegisterRef)>,
    iter: Option<usize>,
    probe_count: u32,
    matched: bool,
    build_priority: f64,
    probe_priority: f64,
    expected: f64,
    observed: u64,
}

impl HashOptional {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        optional: BoxedOperator,
        optional_value: RegisterRef,
        optional_tail: Vec<RegisterRef>,
        required: BoxedOperator,
        required_value: RegisterRef,
        required_tail: Vec<RegisterRef>,
        residuals: Vec<(RegisterRef, RegisterRef)>,
        build_priority: f64,
        probe_priority: f64,
        table_size: usize,
        expected: f64,
    ) -> Self {
        Self {
            // restricting would leak the optional side's values into the
            // required side's domains
            build: Arc::new(Mutex::new(BuildState::new(
                optional,
                optional_value,
                optional_tail,
                table_size,
                false,
            ))),
            probe: Arc::new(Mutex::new(ProbeState::new(required))),
            probe_value: required_value,
            probe_tail: required_tail,
            residuals,
            iter: None,
            probe_count: 0,
            matched: false,
            build_priority,
            probe_priority,
            expected,
            observed: 0,
        }
    }

    fn residuals_hold(&self) -> bool {
        self.residuals.iter().all(|(b, p)| b.get() == p.get())
    }

    fn emit(&mut self, count: u32) -> u32 {
        self.observed += count as u64;
        count
    }
}

impl Operator for HashOptional {
    fn first(&mut self) -> u32 {
        self.observed = 0;
        {
            let mut build = self.build.lock();
            build.run();
            build.reset();
        }
        self.probe_count = self.probe.lock().take();
        if self.probe_count == 0 {
            return 0;
        }
        self.iter = self.build.lock().table.lookup(self.probe_value.get());
        self.matched = false;
        self.next()
    }

    fn next(&mut self) -> u32 {
        loop {
            while let Some(index) = self.iter {
                let build_count = {
                    let build = self.build.lock();
                    let entry = build.table.entry(index);
                    build.value.set(entry.key);
                    for (reg, v) in build.tail.iter().zip(&entry.tail) {
                        reg.set(*v);
                    }
                    self.iter = entry.next;
                    entry.count
                };
                if self.residuals_hold() {
                    self.matched = true;
                    return self.emit(multiply(build_count, self.probe_count));
                }
            }

            if !self.matched {
                self.matched = true;
                {
                    let build = self.build.lock();
                    build.value.clear();
                    for reg in &build.tail {
                        reg.clear();
                    }
                }
                return self.emit(self.probe_count);
            }

            self.probe_count = self.probe.lock().input.next();
            if self.probe_count == 0 {
                return 0;
            }
            self.iter = self.build.lock().table.lookup(self.probe_value.get());
            self.matched = false;
        }
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("HashOptional", self.expected, self.observed);
        let build = self.build.lock();
        out.add_equal_predicate_annotation(&build.value, &self.probe_value);
        for (b, p) in &self.residuals {
            out.add_equal_predicate_annotation(b, p);
        }
        out.add_materialization_annotation(&build.tail);
        out.add_materialization_annotation(&self.probe_tail);
        build.input.print(out);
        drop(build);
        self.probe.lock().input.print(out);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, _reg1: &RegisterRef, _reg2: &RegisterRef) {}

    fn async_input_candidates(&mut self, scheduler: &mut Scheduler) {
        register_async_points(
            &self.build,
            self.build_priority,
            &self.probe,
            self.probe_priority,
            scheduler,
        );
    }

    fn expected_cardinality(&self) -> f64 {
        self.expected
    }

    fn observed_cardinality(&self) -> u64 {
        self.observed
    }
}
