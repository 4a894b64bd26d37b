// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Merge of a base scan with the pending versions of the differential index

use super::{IndexScan, Operator, PlanPrinter, ScanKind, Scheduler};
use crate::runtime::{
    resolve_states, DeltaState, DifferentialIndex, RegisterRef, ScanPin, VersionSet,
    VersionedTriple,
};
use crate::storage::Database;
use std::sync::Arc;

/// Net change of one key at the scan's granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeltaEntry {
    key: [u32; 3],
    added: u32,
    removed: u32,
}

/// An [`IndexScan`] that also sees the updates pending in a
/// [`DifferentialIndex`]
///
/// Output stays in the order of the base scan. A key is counted once per
/// pending insertion that is not yet in the base relation and discounted once
/// per pending deletion of a base triple; keys whose count drops to zero are
/// not produced.
///
/// While pending keys remain to be merged the scan pins the index, so a
/// concurrent `sync` waits for it instead of moving those keys into the base
/// relation under its feet.
pub struct DifferentialScan {
    base: IndexScan,
    index: Arc<DifferentialIndex>,
    pin: Option<ScanPin>,
    deltas: Vec<DeltaEntry>,
    delta_pos: usize,
    base_count: u32,
    base_key: [u32; 3],
    base_consumed: bool,
    observed: u64,
}

impl DifferentialScan {
    pub fn new(base: IndexScan, index: Arc<DifferentialIndex>) -> Self {
        Self {
            base,
            index,
            pin: None,
            deltas: Vec::new(),
            delta_pos: 0,
            base_count: 0,
            base_key: [0; 3],
            base_consumed: false,
            observed: 0,
        }
    }

    /// Collect the pending changes visible at `timestamp` within the scan's
    /// bound prefix and filters
    fn collect_deltas(&self, set: &VersionSet, timestamp: u32) -> Vec<DeltaEntry> {
        let (stop, filters) = self.base.read_bindings();
        let prefix = self.base.prefix_len();
        let width = self.base.kind().width();
        let order = self.base.order();
        let database: &Arc<dyn Database> = self.index.database();

        let range = set
            .range(VersionedTriple::new(stop, 0, 0)..)
            .take_while(|v| v.values()[..prefix] == stop[..prefix]);

        let mut deltas: Vec<DeltaEntry> = Vec::new();
        let mut probe = database.facts(order);
        for (key, state) in resolve_states(range, timestamp) {
            if filters.iter().any(|(f, value)| key[*f] != *value) {
                continue;
            }
            let in_base = probe.seek(key) && probe.current().values == key;
            let (added, removed) = match (state, in_base) {
                (DeltaState::Live, false) => (1, 0),
                (DeltaState::Deleted, true) => (0, 1),
                _ => continue,
            };

            let mut group = [0u32; 3];
            group[..width].copy_from_slice(&key[..width]);
            match deltas.last_mut() {
                Some(last) if last.key == group => {
                    last.added += added;
                    last.removed += removed;
                }
                _ => deltas.push(DeltaEntry {
                    key: group,
                    added,
                    removed,
                }),
            }
        }
        deltas
    }

    fn write_key(&self, key: [u32; 3]) {
        for (i, slot) in self.base.slots().iter().enumerate() {
            if !slot.bound {
                slot.reg.set(key[i]);
            }
        }
    }

    fn pull_base(&mut self, count: u32) {
        self.base_count = count;
        if count != 0 {
            self.base_key = self.base.register_key();
        }
        self.base_consumed = false;
    }

    fn emit(&mut self) -> u32 {
        loop {
            if self.base_consumed {
                let count = self.base.next();
                self.pull_base(count);
            }
            let delta = self.deltas.get(self.delta_pos).copied();
            let (count, key) = match delta {
                None if self.base_count == 0 => {
                    self.pin = None;
                    return 0;
                }
                None => {
                    self.base_consumed = true;
                    (self.base_count, self.base_key)
                }
                Some(d) if self.base_count == 0 || d.key < self.base_key => {
                    self.delta_pos += 1;
                    (d.added.saturating_sub(d.removed), d.key)
                }
                Some(d) if self.base_key < d.key => {
                    self.base_consumed = true;
                    (self.base_count, self.base_key)
                }
                Some(d) => {
                    self.delta_pos += 1;
                    self.base_consumed = true;
                    let count = (self.base_count as u64 + d.added as u64)
                        .saturating_sub(d.removed as u64)
                        .min(u32::MAX as u64) as u32;
                    (count, d.key)
                }
            };
            if count == 0 {
                continue;
            }
            self.write_key(key);
            self.observed += count as u64;
            return count;
        }
    }
}

impl Operator for DifferentialScan {
    fn first(&mut self) -> u32 {
        self.pin = None;
        self.observed = 0;
        self.deltas.clear();
        self.delta_pos = 0;

        let order = self.base.order();
        if self.index.has_pending(order) {
            let pin = self.index.pin();
            let snapshot = self.index.snapshot(order);
            let timestamp = self.index.current_epoch();
            self.deltas = self.collect_deltas(&snapshot, timestamp);
            if !self.deltas.is_empty() {
                self.pin = Some(pin);
            }
        }
        let count = self.base.first();

        log::debug!(
            "merge scan over {} with {} pending keys",
            self.base.order().name(),
            self.deltas.len()
        );
        self.pull_base(count);
        self.emit()
    }

    fn next(&mut self) -> u32 {
        self.emit()
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("DifferentialScan", self.base.expected_cardinality(), self.observed);
        self.base.print(out);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, reg1: &RegisterRef, reg2: &RegisterRef) {
        self.base.add_merge_hint(reg1, reg2);
    }

    fn async_input_candidates(&mut self, _scheduler: &mut Scheduler) {}

    fn expected_cardinality(&self) -> f64 {
        self.base.expected_cardinality()
    }

    fn observed_cardinality(&self) -> u64 {
        self.observed
    }
}

impl DifferentialScan {
    pub fn kind(&self) -> ScanKind {
        self.base.kind()
    }
}
