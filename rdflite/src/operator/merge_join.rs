// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Merge join over inputs sorted on the join attribute
//!
//! The join looks one tuple ahead on each side to classify a match as 1:1,
//! 1:n, n:1 or n:m. The current tuple of a side is parked in a shadow copy
//! (`[count, key, tail...]`) while the look-ahead tuple occupies the
//! registers, and swapped back before it is emitted. Only the n:m case
//! materializes: the right block is spooled into a buffer and replayed for
//! every left tuple of the block.

use super::{multiply, skipping_enabled, BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::RegisterRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Empty,
    ScanHasBothSwapped,
    ScanStepLeft,
    ScanStepBoth,
    ScanStepRight,
    ScanHasBoth,
    LoopEmptyLeft,
    LoopEmptyRight,
    LoopEmptyRightHasData,
    LoopEqualLeftHasData,
    LoopEqualLeft,
    LoopEqualRightHasData,
    LoopEqualRight,
    LoopSpooledRightEmpty,
    LoopSpooledRightHasData,
}

/// One input with its key, tail registers and shadow tuple
struct Side {
    input: BoxedOperator,
    value: RegisterRef,
    tail: Vec<RegisterRef>,
    count: u32,
    shadow: Vec<u32>,
}

impl Side {
    fn new(input: BoxedOperator, value: RegisterRef, tail: Vec<RegisterRef>) -> Self {
        let shadow = vec![0; tail.len() + 2];
        Self {
            input,
            value,
            tail,
            count: 0,
            shadow,
        }
    }

    fn key(&self) -> u32 {
        self.value.get()
    }

    fn shadow_key(&self) -> u32 {
        self.shadow[1]
    }

    fn first(&mut self) -> u32 {
        self.count = self.input.first();
        self.count
    }

    fn next(&mut self) -> u32 {
        self.count = self.input.next();
        self.count
    }

    fn drain(&mut self) {
        while self.input.next() != 0 {}
    }

    /// Park the current tuple in the shadow
    fn copy(&mut self) {
        self.shadow[0] = self.count;
        self.shadow[1] = self.value.get();
        for (i, reg) in self.tail.iter().enumerate() {
            self.shadow[2 + i] = reg.get();
        }
    }

    /// Exchange the registers with the shadow
    fn swap(&mut self) {
        std::mem::swap(&mut self.count, &mut self.shadow[0]);
        let value = self.value.get();
        self.value.set(self.shadow[1]);
        self.shadow[1] = value;
        for (i, reg) in self.tail.iter().enumerate() {
            let v = reg.get();
            reg.set(self.shadow[2 + i]);
            self.shadow[2 + i] = v;
        }
    }

    fn push_current(&self, buffer: &mut Vec<u32>) {
        buffer.push(self.count);
        buffer.push(self.value.get());
        buffer.extend(self.tail.iter().map(|r| r.get()));
    }

    fn load(&mut self, row: &[u32]) {
        self.count = row[0];
        self.value.set(row[1]);
        for (reg, v) in self.tail.iter().zip(&row[2..]) {
            reg.set(*v);
        }
    }
}

/// Equi-join of two inputs sorted ascending on `left_value` / `right_value`
pub struct MergeJoin {
    left: Side,
    right: Side,
    state: ScanState,
    buffer: Vec<u32>,
    buffer_pos: usize,
    left_in_copy: bool,
    expected: f64,
    observed: u64,
}

impl MergeJoin {
    pub fn new(
        mut left: BoxedOperator,
        left_value: RegisterRef,
        left_tail: Vec<RegisterRef>,
        mut right: BoxedOperator,
        right_value: RegisterRef,
        right_tail: Vec<RegisterRef>,
        expected: f64,
    ) -> Self {
        left.add_merge_hint(&left_value, &right_value);
        right.add_merge_hint(&left_value, &right_value);
        Self {
            left: Side::new(left, left_value, left_tail),
            right: Side::new(right, right_value, right_tail),
            state: ScanState::Empty,
            buffer: Vec::new(),
            buffer_pos: 0,
            left_in_copy: false,
            expected,
            observed: 0,
        }
    }

    fn emit(&mut self) -> u32 {
        let count = multiply(self.left.count, self.right.count);
        self.observed += count as u64;
        count
    }

    fn row_width(&self) -> usize {
        self.right.tail.len() + 2
    }

    /// Spool the right block sharing the current key, for the n:m case
    fn handle_nm(&mut self) {
        self.buffer.clear();
        let mut has_current = true;
        self.right.swap();
        self.left_in_copy = true;

        loop {
            if has_current {
                self.buffer.extend_from_slice(&self.right.shadow);
                has_current = false;
            } else {
                self.right.push_current(&mut self.buffer);
                if self.right.next() == 0 {
                    self.buffer_pos = 0;
                    self.state = ScanState::LoopSpooledRightEmpty;
                    return;
                }
            }

            if self.right.key() != self.right.shadow_key() {
                self.right.swap();
                self.buffer_pos = 0;
                self.state = ScanState::LoopSpooledRightHasData;
                return;
            }
        }
    }

    /// Both sides hold a tuple with equal keys; classify the match
    fn handle_match(&mut self) -> Option<u32> {
        self.left.copy();
        if self.left.next() == 0 {
            self.left.swap();
            self.state = ScanState::LoopEmptyLeft;
            return Some(self.emit());
        }
        self.left.swap();

        self.right.copy();
        if self.right.next() == 0 {
            self.right.swap();
            self.state = ScanState::LoopEmptyRightHasData;
            return Some(self.emit());
        }
        self.right.swap();

        let left_repeats = self.left.key() == self.left.shadow_key();
        let right_repeats = self.right.key() == self.right.shadow_key();
        match (left_repeats, right_repeats) {
            (true, true) => {
                self.handle_nm();
                None
            }
            (true, false) => {
                self.state = ScanState::LoopEqualLeftHasData;
                Some(self.emit())
            }
            (false, true) => {
                self.state = ScanState::LoopEqualRightHasData;
                Some(self.emit())
            }
            (false, false) => {
                self.state = ScanState::ScanHasBothSwapped;
                Some(self.emit())
            }
        }
    }
}

impl Operator for MergeJoin {
    fn first(&mut self) -> u32 {
        self.observed = 0;
        self.state = ScanState::Empty;
        if self.left.first() == 0 {
            return 0;
        }
        if self.right.first() == 0 {
            return 0;
        }
        self.state = ScanState::ScanHasBoth;
        self.next()
    }

    fn next(&mut self) -> u32 {
        loop {
            match self.state {
                ScanState::Empty => return 0,
                ScanState::ScanHasBothSwapped
                | ScanState::ScanStepLeft
                | ScanState::ScanStepBoth
                | ScanState::ScanStepRight
                | ScanState::ScanHasBoth => {
                    match self.state {
                        ScanState::ScanHasBothSwapped => {
                            self.left.swap();
                            self.right.swap();
                        }
                        ScanState::ScanStepLeft => {
                            if self.left.next() == 0 {
                                return 0;
                            }
                        }
                        ScanState::ScanStepBoth => {
                            if self.left.next() == 0 || self.right.next() == 0 {
                                return 0;
                            }
                        }
                        ScanState::ScanStepRight => {
                            if self.right.next() == 0 {
                                return 0;
                            }
                        }
                        _ => {}
                    }

                    let (l, r) = (self.left.key(), self.right.key());
                    if l < r {
                        self.state = ScanState::ScanStepLeft;
                        continue;
                    }
                    if l > r {
                        self.state = ScanState::ScanStepRight;
                        continue;
                    }
                    if let Some(count) = self.handle_match() {
                        return count;
                    }
                }
                ScanState::LoopEmptyLeft => {
                    if self.right.next() == 0 {
                        self.state = ScanState::Empty;
                        return 0;
                    }
                    let (l, r) = (self.left.key(), self.right.key());
                    if l < r {
                        if !skipping_enabled() {
                            self.right.drain();
                        }
                        self.state = ScanState::Empty;
                        return 0;
                    }
                    if l == r {
                        return self.emit();
                    }
                }
                ScanState::LoopEmptyRight | ScanState::LoopEmptyRightHasData => {
                    if self.state == ScanState::LoopEmptyRight {
                        if self.left.next() == 0 {
                            self.state = ScanState::Empty;
                            return 0;
                        }
                    } else {
                        self.left.swap();
                    }
                    self.state = ScanState::LoopEmptyRight;
                    let (l, r) = (self.left.key(), self.right.key());
                    if l > r {
                        if !skipping_enabled() {
                            self.left.drain();
                        }
                        self.state = ScanState::Empty;
                        return 0;
                    }
                    if l == r {
                        return self.emit();
                    }
                }
                ScanState::LoopEqualLeftHasData | ScanState::LoopEqualLeft => {
                    if self.state == ScanState::LoopEqualLeftHasData {
                        // reuse the look-ahead tuple
                        self.left.swap();
                        self.state = ScanState::LoopEqualLeft;
                    } else if self.left.next() == 0 {
                        if !skipping_enabled() {
                            self.right.drain();
                        }
                        self.state = ScanState::Empty;
                        continue;
                    }
                    if self.left.key() != self.left.shadow_key() {
                        self.right.swap();
                        self.state = ScanState::ScanHasBoth;
                        continue;
                    }
                    return self.emit();
                }
                ScanState::LoopEqualRightHasData | ScanState::LoopEqualRight => {
                    if self.state == ScanState::LoopEqualRightHasData {
                        self.right.swap();
                        self.state = ScanState::LoopEqualRight;
                    } else if self.right.next() == 0 {
                        if !skipping_enabled() {
                            self.left.drain();
                        }
                        self.state = ScanState::Empty;
                        continue;
                    }
                    if self.right.key() != self.right.shadow_key() {
                        self.left.swap();
                        self.state = ScanState::ScanHasBoth;
                        continue;
                    }
                    return self.emit();
                }
                ScanState::LoopSpooledRightEmpty | ScanState::LoopSpooledRightHasData => {
                    let width = self.row_width();
                    if self.buffer_pos < self.buffer.len() {
                        let start = self.buffer_pos;
                        self.buffer_pos += width;
                        let row = self.buffer[start..start + width].to_vec();
                        self.right.load(&row);
                        return self.emit();
                    }

                    if self.left_in_copy {
                        self.left.swap();
                        self.left_in_copy = false;
                    } else if self.left.next() == 0 {
                        if !skipping_enabled() {
                            self.right.drain();
                        }
                        self.state = ScanState::Empty;
                        return 0;
                    }

                    if self.left.key() == self.left.shadow_key() {
                        self.buffer_pos = 0;
                        continue;
                    }
                    if self.state == ScanState::LoopSpooledRightEmpty {
                        if !skipping_enabled() {
                            self.left.drain();
                        }
                        self.state = ScanState::Empty;
                        return 0;
                    }
                    self.right.swap();
                    self.state = ScanState::ScanHasBoth;
                }
            }
        }
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("MergeJoin", self.expected, self.observed);
        out.add_equal_predicate_annotation(&self.left.value, &self.right.value);
        out.add_materialization_annotation(&self.left.tail);
        out.add_materialization_annotation(&self.right.tail);
        self.left.input.print(out);
        self.right.input.print(out);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, reg1: &RegisterRef, reg2: &RegisterRef) {
        self.left.input.add_merge_hint(reg1, reg2);
        self.right.input.add_merge_hint(reg1, reg2);
    }

    fn async_input_candidates(&mut self, scheduler: &mut Scheduler) {
        self.left.input.async_input_candidates(scheduler);
        self.right.input.async_input_candidates(scheduler);
    }

    fn expected_cardinality(&self) -> f64 {
        self.expected
    }

    fn observed_cardinality(&self) -> u64 {
        self.observed
    }
}
