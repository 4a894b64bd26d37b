// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hash join
//!
//! The left input is drained into a hash table keyed by the join value, the
//! right input probes it. Both phases are exposed as async points so the
//! scheduler can build tables and fetch the first probe tuple ahead of time.

use super::{multiply, AsyncPoint, BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::{ObservedDomain, RegisterRef};
use parking_lot::Mutex;
use std::sync::Arc;

/// A group of identical build tuples
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) key: u32,
    pub(crate) count: u32,
    pub(crate) tail: Vec<u32>,
    /// Next entry with the same key
    pub(crate) next: Option<usize>,
}

/// Cuckoo hash table over chains of equal keys
///
/// `2 * size` slots; a key lives in `hash1` (first half) or `hash2` (second
/// half). Entries are kept in an arena and addressed by index.
#[derive(Debug, Default)]
pub(crate) struct HashTable {
    slots: Vec<Option<usize>>,
    entries: Vec<Entry>,
}

impl HashTable {
    pub(crate) fn new(size: usize) -> Self {
        let size = size.max(1).next_power_of_two();
        Self {
            slots: vec![None; 2 * size],
            entries: Vec::new(),
        }
    }

    fn size(&self) -> usize {
        self.slots.len() / 2
    }

    #[inline]
    fn hash1(key: u32, size: usize) -> usize {
        (key as usize) & (size - 1)
    }

    #[inline]
    fn hash2(key: u32, size: usize) -> usize {
        size + (((key ^ (key >> 3)) as usize) & (size - 1))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entry(&self, index: usize) -> &Entry {
        &self.entries[index]
    }

    fn head_slot(&self, key: u32) -> Option<usize> {
        let size = self.size();
        [Self::hash1(key, size), Self::hash2(key, size)]
            .into_iter()
            .find(|slot| matches!(self.slots[*slot], Some(e) if self.entries[e].key == key))
    }

    /// First entry of the chain holding `key`
    pub(crate) fn lookup(&self, key: u32) -> Option<usize> {
        self.head_slot(key).and_then(|slot| self.slots[slot])
    }

    /// Add a build tuple, aggregating exact duplicates
    pub(crate) fn add(&mut self, key: u32, count: u32, tail: &[u32]) {
        if let Some(slot) = self.head_slot(key) {
            let mut iter = self.slots[slot];
            while let Some(index) = iter {
                let entry = &mut self.entries[index];
                if entry.tail == tail {
                    entry.count = entry.count.saturating_add(count);
                    return;
                }
                iter = entry.next;
            }
            let index = self.entries.len();
            self.entries.push(Entry {
                key,
                count,
                tail: tail.to_vec(),
                next: self.slots[slot],
            });
            self.slots[slot] = Some(index);
            return;
        }

        let index = self.entries.len();
        self.entries.push(Entry {
            key,
            count,
            tail: tail.to_vec(),
            next: None,
        });
        self.insert(index);
    }

    /// Place a chain head, displacing occupants; grow when no place is found
    fn insert(&mut self, head: usize) {
        let mut pending = vec![head];
        while let Some(mut current) = pending.pop() {
            let size = self.size();
            let mut first_table = true;
            let mut placed = false;
            for _ in 0..size {
                let key = self.entries[current].key;
                let slot = if first_table {
                    Self::hash1(key, size)
                } else {
                    Self::hash2(key, size)
                };
                match self.slots[slot].replace(current) {
                    None => {
                        placed = true;
                        break;
                    }
                    Some(displaced) => current = displaced,
                }
                first_table = !first_table;
            }
            if !placed {
                log::debug!("hash table full at {} buckets, growing", size);
                let old = std::mem::replace(&mut self.slots, vec![None; 4 * size]);
                pending.push(current);
                pending.extend(old.into_iter().flatten());
            }
        }
    }
}

/// Build side of a hash join: input, registers and the finished table
pub(crate) struct BuildState {
    pub(crate) input: BoxedOperator,
    pub(crate) value: RegisterRef,
    pub(crate) tail: Vec<RegisterRef>,
    pub(crate) table: HashTable,
    initial_size: usize,
    restrict_domains: bool,
    done: bool,
}

impl BuildState {
    pub(crate) fn new(
        input: BoxedOperator,
        value: RegisterRef,
        tail: Vec<RegisterRef>,
        initial_size: usize,
        restrict_domains: bool,
    ) -> Self {
        Self {
            input,
            value,
            tail,
            table: HashTable::default(),
            initial_size,
            restrict_domains,
            done: false,
        }
    }

    /// Drain the input into a fresh table; no-op when already built
    pub(crate) fn run(&mut self) {
        if self.done {
            return;
        }

        let domain_regs: Vec<RegisterRef> = std::iter::once(&self.value)
            .chain(self.tail.iter())
            .filter(|r| r.domain().is_some())
            .cloned()
            .collect();
        let mut observed = vec![ObservedDomain::new(); domain_regs.len()];

        let mut table = HashTable::new(self.initial_size);
        let mut tail_values = vec![0u32; self.tail.len()];
        let mut count = self.input.first();
        while count != 0 {
            let candidate = domain_regs
                .iter()
                .all(|r| r.domain().map_or(true, |d| d.could_qualify(r.get())));
            if candidate {
                for (seen, reg) in observed.iter_mut().zip(&domain_regs) {
                    seen.add(reg.get());
                }
                for (slot, reg) in tail_values.iter_mut().zip(&self.tail) {
                    *slot = reg.get();
                }
                table.add(self.value.get(), count, &tail_values);
            }
            count = self.input.next();
        }

        if self.restrict_domains {
            for (seen, reg) in observed.iter().zip(&domain_regs) {
                if let Some(domain) = reg.domain() {
                    domain.restrict_to(seen);
                }
            }
        }

        self.table = table;
        self.done = true;
    }

    /// Force the next `run` to rebuild
    pub(crate) fn reset(&mut self) {
        self.done = false;
    }
}

/// Probe side: input and its first tuple
pub(crate) struct ProbeState {
    pub(crate) input: BoxedOperator,
    count: u32,
    done: bool,
}

impl ProbeState {
    pub(crate) fn new(input: BoxedOperator) -> Self {
        Self {
            input,
            count: 0,
            done: false,
        }
    }

    pub(crate) fn run(&mut self) {
        if self.done {
            return;
        }
        self.count = self.input.first();
        self.done = true;
    }

    /// Hand out the peeked count and arm the next peek
    pub(crate) fn take(&mut self) -> u32 {
        self.run();
        self.done = false;
        self.count
    }
}

pub(crate) struct BuildHashTable(pub(crate) Arc<Mutex<BuildState>>);

impl AsyncPoint for BuildHashTable {
    fn run(&self) {
        self.0.lock().run();
    }

    fn name(&self) -> &'static str {
        "BuildHashTable"
    }
}

pub(crate) struct ProbePeek(pub(crate) Arc<Mutex<ProbeState>>);

impl AsyncPoint for ProbePeek {
    fn run(&self) {
        self.0.lock().run();
    }

    fn name(&self) -> &'static str {
        "ProbePeek"
    }
}

/// Register the build and probe phases with the scheduler
pub(crate) fn register_async_points(
    build: &Arc<Mutex<BuildState>>,
    build_priority: f64,
    probe: &Arc<Mutex<ProbeState>>,
    probe_priority: f64,
    scheduler: &mut Scheduler,
) {
    let p1 = scheduler.registered_points();
    build.lock().input.async_input_candidates(scheduler);
    scheduler.register_async_point(Arc::new(BuildHashTable(build.clone())), 0, build_priority, p1);

    let p2 = scheduler.registered_points();
    probe.lock().input.async_input_candidates(scheduler);
    scheduler.register_async_point(Arc::new(ProbePeek(probe.clone())), 1, probe_priority, p2);
}

/// Inner equi-join building on the left input
pub struct HashJoin {
    build: Arc<Mutex<BuildState>>,
    probe: Arc<Mutex<ProbeState>>,
    right_value: RegisterRef,
    right_tail: Vec<RegisterRef>,
    iter: Option<usize>,
    probe_count: u32,
    build_priority: f64,
    probe_priority: f64,
    expected: f64,
    observed: u64,
}

impl HashJoin {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left: BoxedOperator,
        left_value: RegisterRef,
        left_tail: Vec<RegisterRef>,
        right: BoxedOperator,
        right_value: RegisterRef,
        right_tail: Vec<RegisterRef>,
        build_priority: f64,
        probe_priority: f64,
        table_size: usize,
        expected: f64,
    ) -> Self {
        Self {
            build: Arc::new(Mutex::new(BuildState::new(
                left, left_value, left_tail, table_size, true,
            ))),
            probe: Arc::new(Mutex::new(ProbeState::new(right))),
            right_value,
            right_tail,
            iter: None,
            probe_count: 0,
            build_priority,
            probe_priority,
            expected,
            observed: 0,
        }
    }
}

impl Operator for HashJoin {
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
        self.iter = self.build.lock().table.lookup(self.right_value.get());
        self.next()
    }

    fn next(&mut self) -> u32 {
        loop {
            if let Some(index) = self.iter {
                let build = self.build.lock();
                let entry = build.table.entry(index);
                build.value.set(entry.key);
                for (reg, v) in build.tail.iter().zip(&entry.tail) {
                    reg.set(*v);
                }
                self.iter = entry.next;
                let count = multiply(entry.count, self.probe_count);
                self.observed += count as u64;
                return count;
            }

            self.probe_count = self.probe.lock().input.next();
            if self.probe_count == 0 {
                return 0;
            }
            self.iter = self.build.lock().table.lookup(self.right_value.get());
        }
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("HashJoin", self.expected, self.observed);
        let build = self.build.lock();
        out.add_equal_predicate_annotation(&build.value, &self.right_value);
        out.add_materialization_annotation(&build.tail);
        out.add_materialization_annotation(&self.right_tail);
        build.input.print(out);
        drop(build);
        self.probe.lock().input.print(out);
        out.end_operator();
    }

    // hashing destroys the order
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
