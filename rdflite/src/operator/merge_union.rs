// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Union of two sorted single-column inputs

use super::{BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::RegisterRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Done,
    StepLeft,
    StepRight,
    StepBoth,
    LeftEmpty,
    RightEmpty,
}

/// Merges two inputs sorted on one register; equal values are emitted once
/// with the multiplicities added
pub struct MergeUnion {
    left: BoxedOperator,
    right: BoxedOperator,
    left_reg: RegisterRef,
    right_reg: RegisterRef,
    result: RegisterRef,
    left_value: u32,
    right_value: u32,
    left_count: u32,
    right_count: u32,
    state: State,
    expected: f64,
    observed: u64,
}

impl MergeUnion {
    pub fn new(
        result: RegisterRef,
        left: BoxedOperator,
        left_reg: RegisterRef,
        right: BoxedOperator,
        right_reg: RegisterRef,
        expected: f64,
    ) -> Self {
        Self {
            left,
            right,
            left_reg,
            right_reg,
            result,
            left_value: 0,
            right_value: 0,
            left_count: 0,
            right_count: 0,
            state: State::Done,
            expected,
            observed: 0,
        }
    }

    fn emit(&mut self, value: u32, count: u32, state: State) -> u32 {
        self.result.set(value);
        self.state = state;
        self.observed += count as u64;
        count
    }

    /// Both sides hold a tuple; emit the smaller value
    fn compare(&mut self) -> u32 {
        use std::cmp::Ordering::*;
        match self.left_value.cmp(&self.right_value) {
            Less => self.emit(self.left_value, self.left_count, State::StepLeft),
            Greater => self.emit(self.right_value, self.right_count, State::StepRight),
            Equal => {
                let count = self.left_count.saturating_add(self.right_count);
                self.emit(self.left_value, count, State::StepBoth)
            }
        }
    }
}

impl Operator for MergeUnion {
    fn first(&mut self) -> u32 {
        self.observed = 0;

        self.left_count = self.left.first();
        if self.left_count == 0 {
            self.right_count = self.right.first();
            if self.right_count == 0 {
                self.state = State::Done;
                return 0;
            }
            return self.emit(self.right_reg.get(), self.right_count, State::LeftEmpty);
        }
        self.left_value = self.left_reg.get();

        self.right_count = self.right.first();
        if self.right_count == 0 {
            return self.emit(self.left_value, self.left_count, State::RightEmpty);
        }
        self.right_value = self.right_reg.get();

        self.compare()
    }

    fn next(&mut self) -> u32 {
        match self.state {
            State::Done => 0,
            State::StepLeft | State::StepRight | State::StepBoth => {
                if self.state != State::StepRight {
                    self.left_count = self.left.next();
                    if self.left_count == 0 {
                        if self.state == State::StepBoth {
                            // the right value was consumed together with the left one
                            self.right_count = self.right.next();
                            if self.right_count == 0 {
                                self.state = State::Done;
                                return 0;
                            }
                            self.right_value = self.right_reg.get();
                        }
                        return self.emit(self.right_value, self.right_count, State::LeftEmpty);
                    }
                    self.left_value = self.left_reg.get();
                }
                if self.state != State::StepLeft {
                    self.right_count = self.right.next();
                    if self.right_count == 0 {
                        return self.emit(self.left_value, self.left_count, State::RightEmpty);
                    }
                    self.right_value = self.right_reg.get();
                }
                self.compare()
            }
            State::LeftEmpty => {
                self.right_count = self.right.next();
                if self.right_count == 0 {
                    self.state = State::Done;
                    return 0;
                }
                self.emit(self.right_reg.get(), self.right_count, State::LeftEmpty)
            }
            State::RightEmpty => {
                self.left_count = self.left.next();
                if self.left_count == 0 {
                    self.state = State::Done;
                    return 0;
                }
                self.emit(self.left_reg.get(), self.left_count, State::RightEmpty)
            }
        }
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("MergeUnion", self.expected, self.observed);
        out.add_equal_predicate_annotation(&self.result, &self.left_reg);
        out.add_equal_predicate_annotation(&self.result, &self.right_reg);
        self.left.print(out);
        self.right.print(out);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, reg1: &RegisterRef, reg2: &RegisterRef) {
        self.left.add_merge_hint(reg1, reg2);
        self.right.add_merge_hint(reg1, reg2);
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
