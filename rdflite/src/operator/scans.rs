// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Leaf operators without storage access

use super::{Operator, PlanPrinter, Scheduler};
use crate::runtime::RegisterRef;

/// Produces nothing
#[derive(Debug, Default)]
pub struct EmptyScan;

impl EmptyScan {
    pub fn new() -> Self {
        Self
    }
}

impl Operator for EmptyScan {
    fn first(&mut self) -> u32 {
        0
    }

    fn next(&mut self) -> u32 {
        0
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("EmptyScan", 0.0, 0);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, _reg1: &RegisterRef, _reg2: &RegisterRef) {}

    fn async_input_candidates(&mut self, _scheduler: &mut Scheduler) {}

    fn expected_cardinality(&self) -> f64 {
        0.0
    }

    fn observed_cardinality(&self) -> u64 {
        0
    }
}

/// Produces one empty tuple
#[derive(Debug, Default)]
pub struct SingletonScan {
    observed: u64,
}

impl SingletonScan {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operator for SingletonScan {
    fn first(&mut self) -> u32 {
        self.observed = 1;
        1
    }

    fn next(&mut self) -> u32 {
        0
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("SingletonScan", 1.0, self.observed);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, _reg1: &RegisterRef, _reg2: &RegisterRef) {}

    fn async_input_candidates(&mut self, _scheduler: &mut Scheduler) {}

    fn expected_cardinality(&self) -> f64 {
        1.0
    }

    fn observed_cardinality(&self) -> u64 {
        self.observed
    }
}
