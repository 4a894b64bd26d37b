// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory triple relation and dictionary
//!
//! Every order is kept as a sorted vector of entries. Readers clone an
//! `Arc` to the current vectors, so cursors own their data and keep seeing
//! the state they were opened on while updates install new vectors.

use super::types::{DataOrder, FactsEntry, Literal, LiteralType, StorageError, Triple};
use super::{Database, Dictionary, FactsCursor};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Entries of one order in its three granularities
#[derive(Debug, Default)]
struct OrderData {
    full: Arc<Vec<FactsEntry>>,
    aggregated: Arc<Vec<FactsEntry>>,
    fully_aggregated: Arc<Vec<FactsEntry>>,
}

impl OrderData {
    fn build(order: DataOrder, triples: &BTreeSet<Triple>) -> Self {
        let mut keys: Vec<[u32; 3]> = triples.iter().map(|t| order.permute(t)).collect();
        keys.sort_unstable();

        let full: Vec<FactsEntry> = keys
            .iter()
            .map(|k| FactsEntry {
                values: *k,
                count: 1,
            })
            .collect();
        let aggregated = group(&keys, 2);
        let fully_aggregated = group(&keys, 1);

        Self {
            full: Arc::new(full),
            aggregated: Arc::new(aggregated),
            fully_aggregated: Arc::new(fully_aggregated),
        }
    }
}

/// Collapse sorted keys on their first `width` values
fn group(keys: &[[u32; 3]], width: usize) -> Vec<FactsEntry> {
    let mut result: Vec<FactsEntry> = Vec::new();
    for key in keys {
        let mut values = [0u32; 3];
        values[..width].copy_from_slice(&key[..width]);
        match result.last_mut() {
            Some(last) if last.values == values => last.count += 1,
            _ => result.push(FactsEntry { values, count: 1 }),
        }
    }
    result
}

/// Cursor over a shared entry vector
struct MemoryFactsCursor {
    entries: Arc<Vec<FactsEntry>>,
    width: usize,
    pos: usize,
}

impl FactsCursor for MemoryFactsCursor {
    fn seek(&mut self, key: [u32; 3]) -> bool {
        let width = self.width;
        self.pos = self
            .entries
            .partition_point(|e| e.values[..width] < key[..width]);
        self.pos < self.entries.len()
    }

    fn advance(&mut self) -> bool {
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
        self.pos < self.entries.len()
    }

    fn current(&self) -> FactsEntry {
        self.entries.get(self.pos).copied().unwrap_or(FactsEntry {
            values: [0; 3],
            count: 0,
        })
    }
}

#[derive(Debug, Default)]
struct DictionaryState {
    id2literal: Vec<Literal>,
    literal2id: HashMap<Literal, u32>,
}

/// Dictionary held in memory; ids are dense from zero
#[derive(Debug, Default)]
pub struct MemoryDictionary {
    state: RwLock<DictionaryState>,
}

impl MemoryDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `literal`, adding it if unknown
    pub fn intern(&self, literal: Literal) -> u32 {
        if let Some(id) = self.state.read().literal2id.get(&literal) {
            return *id;
        }
        let mut state = self.state.write();
        if let Some(id) = state.literal2id.get(&literal) {
            return *id;
        }
        let id = state.id2literal.len() as u32;
        state.id2literal.push(literal.clone());
        state.literal2id.insert(literal, id);
        id
    }

    fn append(&self, literals: &[Literal]) {
        let mut state = self.state.write();
        for literal in literals {
            let id = state.id2literal.len() as u32;
            state.id2literal.push(literal.clone());
            state.literal2id.entry(literal.clone()).or_insert(id);
        }
    }
}

impl Dictionary for MemoryDictionary {
    fn lookup(&self, text: &str, literal_type: LiteralType, sub_type: u32) -> Option<u32> {
        let key = Literal::new(text, literal_type, sub_type);
        self.state.read().literal2id.get(&key).copied()
    }

    fn lookup_by_id(&self, id: u32) -> Option<Literal> {
        self.state.read().id2literal.get(id as usize).cloned()
    }

    fn next_id(&self) -> u32 {
        self.state.read().id2literal.len() as u32
    }
}

/// In-memory base relation
pub struct MemoryDatabase {
    orders: RwLock<Vec<OrderData>>,
    dictionary: MemoryDictionary,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        let empty = BTreeSet::new();
        Self {
            orders: RwLock::new(
                DataOrder::ALL
                    .iter()
                    .map(|o| OrderData::build(*o, &empty))
                    .collect(),
            ),
            dictionary: MemoryDictionary::new(),
        }
    }

    /// Create a database holding `triples`
    pub fn with_triples<I: IntoIterator<Item = Triple>>(triples: I) -> Self {
        let db = Self::new();
        let set: BTreeSet<Triple> = triples.into_iter().collect();
        db.install(&set);
        db
    }

    /// The concrete dictionary, for loading test data
    pub fn memory_dictionary(&self) -> &MemoryDictionary {
        &self.dictionary
    }

    /// Intern an IRI
    pub fn uri(&self, text: &str) -> u32 {
        self.dictionary.intern(Literal::uri(text))
    }

    /// Intern a plain literal
    pub fn literal(&self, text: &str) -> u32 {
        self.dictionary.intern(Literal::plain(text))
    }

    /// Add triples to the relation
    pub fn insert_triples(&self, triples: &[Triple]) {
        let mut set = self.all_triples();
        set.extend(triples.iter().copied());
        self.install(&set);
    }

    /// All triples currently stored
    pub fn all_triples(&self) -> BTreeSet<Triple> {
        let orders = self.orders.read();
        let order = DataOrder::SubjectPredicateObject;
        orders[order.index()]
            .full
            .iter()
            .map(|e| order.unpermute(e.values))
            .collect()
    }

    fn install(&self, triples: &BTreeSet<Triple>) {
        let rebuilt: Vec<OrderData> = DataOrder::ALL
            .iter()
            .map(|o| OrderData::build(*o, triples))
            .collect();
        *self.orders.write() = rebuilt;
    }

    fn cursor(&self, order: DataOrder, width: usize) -> Box<dyn FactsCursor> {
        let orders = self.orders.read();
        let data = &orders[order.index()];
        let entries = match width {
            3 => data.full.clone(),
            2 => data.aggregated.clone(),
            _ => data.fully_aggregated.clone(),
        };
        Box::new(MemoryFactsCursor {
            entries,
            width,
            pos: 0,
        })
    }
}

impl Database for MemoryDatabase {
    fn facts(&self, order: DataOrder) -> Box<dyn FactsCursor> {
        self.cursor(order, 3)
    }

    fn aggregated_facts(&self, order: DataOrder) -> Box<dyn FactsCursor> {
        self.cursor(order, 2)
    }

    fn fully_aggregated_facts(&self, order: DataOrder) -> Box<dyn FactsCursor> {
        self.cursor(order, 1)
    }

    fn dictionary(&self) -> &dyn Dictionary {
        &self.dictionary
    }

    fn apply_update(
        &self,
        literals: &[Literal],
        inserts: &[Triple],
        deletes: &[Triple],
    ) -> Result<(), StorageError> {
        self.dictionary.append(literals);
        let mut set = self.all_triples();
        for t in deletes {
            set.remove(t);
        }
        set.extend(inserts.iter().copied());
        self.install(&set);
        log::debug!(
            "memory database updated: {} literals, {} inserts, {} deletes",
            literals.len(),
            inserts.len(),
            deletes.len()
        );
        Ok(())
    }
}
