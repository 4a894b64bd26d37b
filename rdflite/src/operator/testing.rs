// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Helpers shared by the operator unit tests

use super::{Operator, PlanPrinter, Scheduler};
use crate::runtime::{Register, RegisterRef};
use std::sync::Arc;

pub(crate) fn reg(slot: usize) -> RegisterRef {
    Arc::new(Register::new(slot))
}

/// Replays fixed rows into registers
pub(crate) struct ValuesScan {
    regs: Vec<RegisterRef>,
    rows: Vec<(Vec<u32>, u32)>,
    pos: usize,
    pub(crate) firsts: usize,
}

impl ValuesScan {
    pub(crate) fn new(regs: &[RegisterRef], rows: Vec<(Vec<u32>, u32)>) -> Self {
        Self {
            regs: regs.to_vec(),
            rows,
            pos: 0,
            firsts: 0,
        }
    }

    /// Rows of multiplicity one
    pub(crate) fn ones(regs: &[RegisterRef], rows: &[&[u32]]) -> Self {
        Self::new(regs, rows.iter().map(|r| (r.to_vec(), 1)).collect())
    }

    fn produce(&mut self) -> u32 {
        match self.rows.get(self.pos) {
            Some((values, count)) => {
                for (reg, value) in self.regs.iter().zip(values) {
                    reg.set(*value);
                }
                *count
            }
            None => 0,
        }
    }
}

impl Operator for ValuesScan {
    fn first(&mut self) -> u32 {
        self.firsts += 1;
        self.pos = 0;
        self.produce()
    }

    fn next(&mut self) -> u32 {
        self.pos += 1;
        self.produce()
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("Values", self.rows.len() as f64, 0);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, _reg1: &RegisterRef, _reg2: &RegisterRef) {}

    fn async_input_candidates(&mut self, _scheduler: &mut Scheduler) {}

    fn expected_cardinality(&self) -> f64 {
        self.rows.len() as f64
    }

    fn observed_cardinality(&self) -> u64 {
        0
    }
}

/// Pull `op` to exhaustion, reading `regs` after every tuple
pub(crate) fn drain(op: &mut dyn Operator, regs: &[RegisterRef]) -> Vec<(Vec<u32>, u32)> {
    let mut rows = Vec::new();
    let mut count = op.first();
    while count != 0 {
        rows.push((regs.iter().map(|r| r.get()).collect(), count));
        count = op.next();
    }
    rows
}

/// Like [`drain`], sorted for order-insensitive comparison
pub(crate) fn drain_sorted(op: &mut dyn Operator, regs: &[RegisterRef]) -> Vec<(Vec<u32>, u32)> {
    let mut rows = drain(op, regs);
    rows.sort();
    rows
}
