// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Index scans in full, aggregated and fully aggregated form
//!
//! A scan reads one sort order of the base relation. Slots are the key
//! positions of that order (`value1..value3`); the subject, predicate and
//! object registers are mapped onto them at construction. Leading bound slots
//! form a prefix the cursor seeks to, later bound slots are checked as
//! filters, and unbound slots are written to their registers.
//!
//! Moving forward, the scan asks its skip hint for a lower bound built from
//! bound values, merge-join partner registers and the potential domains of
//! its registers, and seeks straight to it.

use super::{skipping_enabled, Operator, PlanPrinter, Scheduler};
use crate::runtime::{same_register, Register, RegisterRef};
use crate::storage::{DataOrder, Database, FactsCursor, FactsEntry, NULL_ID};
use std::sync::Arc;

/// Granularity of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Distinct triples
    Full,
    /// `(value1, value2)` with the number of triples sharing it
    Aggregated,
    /// `value1` with its number of triples
    FullyAggregated,
}

impl ScanKind {
    /// Number of key slots delivered
    pub fn width(self) -> usize {
        match self {
            ScanKind::Full => 3,
            ScanKind::Aggregated => 2,
            ScanKind::FullyAggregated => 1,
        }
    }

    pub fn operator_name(self) -> &'static str {
        match self {
            ScanKind::Full => "IndexScan",
            ScanKind::Aggregated => "AggregatedIndexScan",
            ScanKind::FullyAggregated => "FullyAggregatedIndexScan",
        }
    }

    /// Positions (subject 0, predicate 1, object 2) not delivered by this
    /// granularity in `order`
    pub fn unused_positions(self, order: DataOrder) -> Vec<usize> {
        order.positions()[self.width()..].to_vec()
    }
}

/// One key slot of a scan
#[derive(Debug, Clone)]
pub(crate) struct ScanSlot {
    pub(crate) reg: RegisterRef,
    pub(crate) bound: bool,
    merges: Vec<RegisterRef>,
}

/// Register the other side of `reg1 = reg2` when one side is ours
fn handle_hint(reg1: &RegisterRef, reg2: &RegisterRef, slot: &mut ScanSlot) {
    let has1 = same_register(reg1, &slot.reg) || slot.merges.iter().any(|m| same_register(m, reg1));
    let has2 = same_register(reg2, &slot.reg) || slot.merges.iter().any(|m| same_register(m, reg2));
    if has1 && !has2 {
        slot.merges.push(reg2.clone());
    }
    if has2 && !has1 {
        slot.merges.push(reg1.clone());
    }
}

/// Scan over one sort order of the base relation
pub struct IndexScan {
    database: Arc<dyn Database>,
    order: DataOrder,
    kind: ScanKind,
    slots: Vec<ScanSlot>,
    prefix: usize,
    filters: Vec<usize>,
    stop: [u32; 3],
    filter_values: [u32; 3],
    cursor: Option<Box<dyn FactsCursor>>,
    expected: f64,
    observed: u64,
}

impl IndexScan {
    /// Build a scan
    ///
    /// `registers` and `bound` are given in subject, predicate, object
    /// position. Positions the granularity does not deliver are ignored.
    pub fn new(
        database: Arc<dyn Database>,
        kind: ScanKind,
        order: DataOrder,
        registers: [Option<RegisterRef>; 3],
        bound: [bool; 3],
        expected: f64,
    ) -> Self {
        let width = kind.width();
        let positions = order.positions();
        let slots: Vec<ScanSlot> = positions[..width]
            .iter()
            .map(|&pos| match &registers[pos] {
                Some(reg) => ScanSlot {
                    reg: reg.clone(),
                    bound: bound[pos],
                    merges: Vec::new(),
                },
                None => ScanSlot {
                    reg: Arc::new(Register::new(usize::MAX)),
                    bound: false,
                    merges: Vec::new(),
                },
            })
            .collect();

        let prefix = slots.iter().take_while(|s| s.bound).count();
        let filters: Vec<usize> = (prefix..width).filter(|i| slots[*i].bound).collect();

        let scan = Self {
            database,
            order,
            kind,
            slots,
            prefix,
            filters,
            stop: [0; 3],
            filter_values: [0; 3],
            cursor: None,
            expected,
            observed: 0,
        };
        log::debug!(
            "{} over {} as {}",
            kind.operator_name(),
            order.name(),
            scan.specialization()
        );
        scan
    }

    /// Name of the state machine picked from the bound slots, e.g.
    /// `ScanPrefix1Filter3`
    pub fn specialization(&self) -> String {
        let mut name = String::from("Scan");
        if self.prefix > 0 {
            name.push_str("Prefix");
            for i in 0..self.prefix {
                name.push_str(&(i + 1).to_string());
            }
        }
        if !self.filters.is_empty() {
            name.push_str("Filter");
            for f in &self.filters {
                name.push_str(&(f + 1).to_string());
            }
        }
        name
    }

    pub fn order(&self) -> DataOrder {
        self.order
    }

    pub fn kind(&self) -> ScanKind {
        self.kind
    }

    pub(crate) fn slots(&self) -> &[ScanSlot] {
        &self.slots
    }

    /// Current key as held by the slot registers
    pub(crate) fn register_key(&self) -> [u32; 3] {
        let mut key = [0u32; 3];
        for (i, slot) in self.slots.iter().enumerate() {
            key[i] = slot.reg.get();
        }
        key
    }

    /// Bound prefix and filter values as currently held by the registers
    pub(crate) fn read_bindings(&self) -> ([u32; 3], Vec<(usize, u32)>) {
        let mut stop = [0u32; 3];
        for (i, slot) in self.slots.iter().take(self.prefix).enumerate() {
            stop[i] = slot.reg.get();
        }
        let filters = self
            .filters
            .iter()
            .map(|f| (*f, self.slots[*f].reg.get()))
            .collect();
        (stop, filters)
    }

    pub(crate) fn prefix_len(&self) -> usize {
        self.prefix
    }

    fn open_cursor(&self) -> Box<dyn FactsCursor> {
        match self.kind {
            ScanKind::Full => self.database.facts(self.order),
            ScanKind::Aggregated => self.database.aggregated_facts(self.order),
            ScanKind::FullyAggregated => self.database.fully_aggregated_facts(self.order),
        }
    }

    /// Lower bound for the next interesting entry, starting from `current`
    fn hint(&self, current: [u32; 3], use_merges: bool) -> [u32; 3] {
        let mut key = current;
        let width = self.slots.len();
        for (i, slot) in self.slots.iter().enumerate() {
            let raise = |v: u32, key: &mut [u32; 3]| {
                if v != NULL_ID && v > key[i] {
                    key[i] = v;
                    for later in key.iter_mut().take(width).skip(i + 1) {
                        *later = 0;
                    }
                }
            };
            if slot.bound {
                let v = if i < self.prefix {
                    self.stop[i]
                } else {
                    self.filter_values[i]
                };
                raise(v, &mut key);
            }
            if use_merges {
                for m in &slot.merges {
                    raise(m.get(), &mut key);
                }
            }
            if let Some(domain) = slot.reg.domain() {
                let candidate = domain.next_candidate(key[i]);
                if candidate > key[i] {
                    key[i] = candidate;
                    for later in key.iter_mut().take(width).skip(i + 1) {
                        *later = 0;
                    }
                }
            }
        }
        key
    }

    /// Deliver the entry under the cursor or the next qualifying one
    fn produce(&mut self, use_merges: bool) -> u32 {
        let width = self.slots.len();
        loop {
            let entry: FactsEntry = match &self.cursor {
                Some(cursor) => cursor.current(),
                None => return 0,
            };

            if skipping_enabled() {
                let target = self.hint(entry.values, use_merges);
                if target[..width] > entry.values[..width] {
                    let found = match self.cursor.as_mut() {
                        Some(cursor) => cursor.seek(target),
                        None => false,
                    };
                    if !found {
                        self.cursor = None;
                        return 0;
                    }
                    continue;
                }
            }

            if entry.values[..self.prefix] != self.stop[..self.prefix] {
                self.cursor = None;
                return 0;
            }

            if self
                .filters
                .iter()
                .any(|f| entry.values[*f] != self.filter_values[*f])
            {
                if !self.advance() {
                    return 0;
                }
                continue;
            }

            for (i, slot) in self.slots.iter().enumerate() {
                if !slot.bound {
                    slot.reg.set(entry.values[i]);
                }
            }
            self.observed += entry.count as u64;
            return entry.count;
        }
    }

    fn advance(&mut self) -> bool {
        let more = match self.cursor.as_mut() {
            Some(cursor) => cursor.advance(),
            None => false,
        };
        if !more {
            self.cursor = None;
        }
        more
    }
}

impl Operator for IndexScan {
    fn first(&mut self) -> u32 {
        self.observed = 0;
        let (stop, filters) = self.read_bindings();
        self.stop = stop;
        for (f, value) in filters {
            self.filter_values[f] = value;
        }

        let mut cursor = self.open_cursor();
        if !cursor.seek(self.stop) {
            self.cursor = None;
            return 0;
        }
        self.cursor = Some(cursor);
        // partner registers may still hold values of an earlier run
        self.produce(false)
    }

    fn next(&mut self) -> u32 {
        if !self.advance() {
            return 0;
        }
        self.produce(true)
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator(self.kind.operator_name(), self.expected, self.observed);
        out.add_argument_annotation(self.order.name());
        for slot in &self.slots {
            out.add_scan_annotation(&slot.reg, slot.bound);
        }
        out.end_operator();
    }

    fn add_merge_hint(&mut self, reg1: &RegisterRef, reg2: &RegisterRef) {
        for slot in &mut self.slots {
            handle_hint(reg1, reg2, slot);
        }
    }

    fn async_input_candidates(&mut self, _scheduler: &mut Scheduler) {}

    fn expected_cardinality(&self) -> f64 {
        self.expected
    }

    fn observed_cardinality(&self) -> u64 {
        self.observed
    }
}
