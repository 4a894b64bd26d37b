// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Differential index
//!
//! Pending updates live in memory next to the base relation until they are
//! synced. Each of the six sort orders keeps an ordered set of versioned
//! triples behind its own reader/writer latch, and a seventh latch guards the
//! literals that were minted for the pending triples but are not yet part of
//! the base dictionary.
//!
//! Sets are shared copy-on-write: scans clone the `Arc` under the shared
//! latch and walk their snapshot without holding it, while `load` installs
//! a modified copy under the exclusive latch.
//!
//! A merge scan whose range holds pending versions pins the index until it is
//! exhausted or dropped. `sync` waits for every pin to go away, so the base
//! relation a pinned scan reads never gains the triples it already counts
//! from its snapshot.

use crate::storage::{
    DataOrder, Database, Dictionary, Literal, LiteralType, StorageError, Triple, NULL_ID,
};
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A triple in one sort order together with its lifetime
///
/// Visible at read time `t` iff `created <= t < deleted`. Ordering is by the
/// three values first, then by creation epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionedTriple {
    pub value1: u32,
    pub value2: u32,
    pub value3: u32,
    pub created: u32,
    pub deleted: u32,
}

impl VersionedTriple {
    pub fn new(values: [u32; 3], created: u32, deleted: u32) -> Self {
        Self {
            value1: values[0],
            value2: values[1],
            value3: values[2],
            created,
            deleted,
        }
    }

    pub fn values(&self) -> [u32; 3] {
        [self.value1, self.value2, self.value3]
    }

    fn lower(values: [u32; 3]) -> Self {
        Self::new(values, 0, 0)
    }

    fn upper(values: [u32; 3]) -> Self {
        Self::new(values, u32::MAX, u32::MAX)
    }
}

/// State of one key as seen at a read timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaState {
    /// The newest applicable version is live
    Live,
    /// The newest applicable version ended or is a deletion marker
    Deleted,
}

/// Ordered set of versions of one sort order
pub type VersionSet = BTreeSet<VersionedTriple>;

/// Resolve the state of every key with a version in `range` at time `timestamp`
///
/// Keys without an applicable version are omitted. Output is in key order.
pub fn resolve_states<'a, I>(range: I, timestamp: u32) -> Vec<([u32; 3], DeltaState)>
where
    I: IntoIterator<Item = &'a VersionedTriple>,
{
    let mut result: Vec<([u32; 3], DeltaState)> = Vec::new();
    let mut current: Option<([u32; 3], Option<DeltaState>)> = None;
    for version in range {
        let key = version.values();
        match current {
            Some((k, _)) if k == key => {}
            Some((k, Some(state))) => {
                result.push((k, state));
                current = Some((key, None));
            }
            _ => current = Some((key, None)),
        }
        if version.created <= timestamp {
            let state = if timestamp < version.deleted {
                DeltaState::Live
            } else {
                DeltaState::Deleted
            };
            // versions are ordered by creation, the last applicable one wins
            current = Some((key, Some(state)));
        }
    }
    if let Some((k, Some(state))) = current {
        result.push((k, state));
    }
    result
}

/// A literal waiting for an id, its sub-type given as text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingLiteral {
    pub text: String,
    pub literal_type: LiteralType,
    pub sub_type: Option<String>,
}

impl PendingLiteral {
    pub fn new<S: Into<String>>(text: S, literal_type: LiteralType, sub_type: Option<String>) -> Self {
        Self {
            text: text.into(),
            literal_type,
            sub_type,
        }
    }

    pub fn uri<S: Into<String>>(text: S) -> Self {
        Self::new(text, LiteralType::Uri, None)
    }
}

#[derive(Debug, Default)]
struct GateState {
    active: usize,
    syncing: bool,
}

/// Keeps `sync` and pinned merge scans apart
#[derive(Debug, Default)]
struct ScanGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

/// A merge scan's claim on the current base relation
///
/// While any pin is alive `sync` blocks. Dropping the pin releases it.
#[derive(Debug)]
pub struct ScanPin {
    index: Arc<DifferentialIndex>,
}

impl Drop for ScanPin {
    fn drop(&mut self) {
        let gate = &self.index.gate;
        let mut state = gate.state.lock();
        state.active -= 1;
        if state.active == 0 {
            gate.changed.notify_all();
        }
    }
}

/// Held by `sync` while it rewrites the base relation
struct SyncGuard<'a> {
    gate: &'a ScanGate,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.gate.state.lock().syncing = false;
        self.gate.changed.notify_all();
    }
}

#[derive(Debug, Default)]
struct PendingLiterals {
    id2literal: Vec<Literal>,
    literal2id: HashMap<Literal, u32>,
}

/// In-memory overlay of pending inserts and deletes
pub struct DifferentialIndex {
    database: Arc<dyn Database>,
    orders: [RwLock<Arc<VersionSet>>; 6],
    literals: RwLock<PendingLiterals>,
    epoch: AtomicU32,
    gate: ScanGate,
}

impl std::fmt::Debug for DifferentialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifferentialIndex")
            .field("epoch", &self.current_epoch())
            .finish_non_exhaustive()
    }
}

impl DifferentialIndex {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            orders: std::array::from_fn(|_| RwLock::new(Arc::new(VersionSet::new()))),
            literals: RwLock::new(PendingLiterals::default()),
            epoch: AtomicU32::new(0),
            gate: ScanGate::default(),
        }
    }

    /// The base relation
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    /// The newest epoch handed out by `load`
    pub fn current_epoch(&self) -> u32 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Does the order hold any pending version?
    pub fn has_pending(&self, order: DataOrder) -> bool {
        !self.orders[order.index()].read().is_empty()
    }

    /// Is the whole index empty?
    pub fn is_empty(&self) -> bool {
        DataOrder::ALL.iter().all(|o| !self.has_pending(*o))
            && self.literals.read().id2literal.is_empty()
    }

    /// Take the shared latch of one order
    pub fn read_order(&self, order: DataOrder) -> RwLockReadGuard<'_, Arc<VersionSet>> {
        self.orders[order.index()].read()
    }

    /// The pending versions of one order as of now
    pub fn snapshot(&self, order: DataOrder) -> Arc<VersionSet> {
        Arc::clone(&self.orders[order.index()].read())
    }

    /// Keep `sync` out until the returned pin is dropped
    ///
    /// Waits while a sync is running. A thread must not call `sync` while it
    /// holds a pin itself.
    pub fn pin(self: &Arc<Self>) -> ScanPin {
        let mut state = self.gate.state.lock();
        while state.syncing {
            self.gate.changed.wait(&mut state);
        }
        state.active += 1;
        ScanPin {
            index: Arc::clone(self),
        }
    }

    fn exclude_scans(&self) -> SyncGuard<'_> {
        let mut state = self.gate.state.lock();
        while state.syncing || state.active > 0 {
            self.gate.changed.wait(&mut state);
        }
        state.syncing = true;
        SyncGuard { gate: &self.gate }
    }

    /// Load a batch of triples, as insertions or as deletions
    ///
    /// The whole batch is stamped with one new epoch. Inserting a triple that
    /// is already live pending is a no-op; deleting ends the live pending
    /// version, or records a deletion marker for a base triple.
    pub fn load(&self, batch: &[Triple], delete: bool) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        for order in DataOrder::ALL {
            let mut latch = self.orders[order.index()].write();
            let set = Arc::make_mut(&mut latch);
            for triple in batch {
                let key = order.permute(triple);
                let newest = set
                    .range(VersionedTriple::lower(key)..=VersionedTriple::upper(key))
                    .next_back()
                    .copied();
                if delete {
                    match newest {
                        Some(v) if v.deleted == u32::MAX => {
                            set.remove(&v);
                            set.insert(VersionedTriple::new(key, v.created, epoch));
                        }
                        Some(_) => {}
                        None => {
                            set.insert(VersionedTriple::new(key, epoch, epoch));
                        }
                    }
                } else {
                    match newest {
                        Some(v) if v.deleted == u32::MAX => {}
                        _ => {
                            set.insert(VersionedTriple::new(key, epoch, u32::MAX));
                        }
                    }
                }
            }
        }
        log::info!(
            "differential index loaded {} {} at epoch {}",
            batch.len(),
            if delete { "deletions" } else { "insertions" },
            epoch
        );
    }

    /// Assign ids to literals, reusing pending ones
    ///
    /// New ids continue after the base dictionary's `next_id`. Sub-types
    /// (language tags, datatype IRIs) are mapped first.
    pub fn map_literals(&self, literals: &[PendingLiteral]) -> Vec<u32> {
        let base = self.database.dictionary();
        let mut pending = self.literals.write();
        let mut ids = Vec::with_capacity(literals.len());
        for literal in literals {
            let sub_type = match (&literal.sub_type, literal.literal_type.has_sub_type()) {
                (Some(text), true) => {
                    let entry = Literal::new(text.clone(), literal.literal_type.sub_type_type(), 0);
                    Self::intern_pending(base, &mut pending, entry)
                }
                _ => 0,
            };
            let entry = Literal::new(literal.text.clone(), literal.literal_type, sub_type);
            ids.push(Self::intern_pending(base, &mut pending, entry));
        }
        ids
    }

    fn intern_pending(base: &dyn Dictionary, pending: &mut PendingLiterals, entry: Literal) -> u32 {
        if let Some(id) = base.lookup(&entry.text, entry.literal_type, entry.sub_type) {
            return id;
        }
        if let Some(id) = pending.literal2id.get(&entry) {
            return *id;
        }
        let id = base.next_id() + pending.id2literal.len() as u32;
        pending.id2literal.push(entry.clone());
        pending.literal2id.insert(entry, id);
        id
    }

    /// Discard every pending triple and literal
    pub fn clear(&self) {
        let mut latches: Vec<_> = self.orders.iter().map(|o| o.write()).collect();
        let mut literals = self.literals.write();
        for latch in latches.iter_mut() {
            **latch = Arc::new(VersionSet::new());
        }
        *literals = PendingLiterals::default();
    }

    /// Fold the pending state into the base relation
    ///
    /// Waits until no merge scan is pinned, then holds all seven latches for
    /// the duration. Scans starting meanwhile block until the sync is done.
    /// On failure the pending state is kept.
    pub fn sync(&self) -> Result<(), StorageError> {
        let _exclusive = self.exclude_scans();
        let mut latches: Vec<_> = self.orders.iter().map(|o| o.write()).collect();
        let mut literals = self.literals.write();

        let order = DataOrder::SubjectPredicateObject;
        let timestamp = self.current_epoch();
        let mut inserts = Vec::new();
        let mut deletes = Vec::new();
        for (key, state) in resolve_states(latches[order.index()].iter(), timestamp) {
            let triple = order.unpermute(key);
            match state {
                DeltaState::Live => inserts.push(triple),
                DeltaState::Deleted => deletes.push(triple),
            }
        }

        self.database
            .apply_update(&literals.id2literal, &inserts, &deletes)?;
        log::info!(
            "differential index synced: {} literals, {} insertions, {} deletions",
            literals.id2literal.len(),
            inserts.len(),
            deletes.len()
        );

        for latch in latches.iter_mut() {
            **latch = Arc::new(VersionSet::new());
        }
        *literals = PendingLiterals::default();
        Ok(())
    }
}

impl Dictionary for DifferentialIndex {
    fn lookup(&self, text: &str, literal_type: LiteralType, sub_type: u32) -> Option<u32> {
        if let Some(id) = self.database.dictionary().lookup(text, literal_type, sub_type) {
            return Some(id);
        }
        let key = Literal::new(text, literal_type, sub_type);
        self.literals.read().literal2id.get(&key).copied()
    }

    fn lookup_by_id(&self, id: u32) -> Option<Literal> {
        let base = self.database.dictionary();
        let next = base.next_id();
        if id == NULL_ID {
            return None;
        }
        if id >= next {
            return self
                .literals
                .read()
                .id2literal
                .get((id - next) as usize)
                .cloned();
        }
        base.lookup_by_id(id)
    }

    fn next_id(&self) -> u32 {
        let pending = self.literals.read();
        self.database.dictionary().next_id() + pending.id2literal.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDatabase;

    fn spo(set: &VersionSet, timestamp: u32) -> Vec<([u32; 3], DeltaState)> {
        resolve_states(set.iter(), timestamp)
    }

    #[test]
    fn test_load_and_delete_versions() {
        let db = Arc::new(MemoryDatabase::with_triples(vec![Triple::new(1, 2, 3)]));
        let index = DifferentialIndex::new(db);
        index.load(&[Triple::new(1, 2, 5)], false);
        index.load(&[Triple::new(1, 2, 3)], true);

        let set = index.read_order(DataOrder::SubjectPredicateObject).clone();
        assert_eq!(
            spo(&set, 2),
            vec![([1, 2, 3], DeltaState::Deleted), ([1, 2, 5], DeltaState::Live)]
        );
        // before the deletion only the insert is visible
        assert_eq!(spo(&set, 1), vec![([1, 2, 5], DeltaState::Live)]);

        let ops = index.read_order(DataOrder::ObjectPredicateSubject).clone();
        assert_eq!(spo(&ops, 2)[1].0, [5, 2, 1]);
    }

    #[test]
    fn test_reinsert_after_delete() {
        let db = Arc::new(MemoryDatabase::new());
        let index = DifferentialIndex::new(db);
        let t = Triple::new(4, 5, 6);
        index.load(&[t], false);
        index.load(&[t], false);
        index.load(&[t], true);
        index.load(&[t], false);
        let set = index.read_order(DataOrder::SubjectPredicateObject).clone();
        assert_eq!(set.len(), 2);
        assert_eq!(spo(&set, 2), vec![([4, 5, 6], DeltaState::Live)]);
        assert_eq!(spo(&set, 3), vec![([4, 5, 6], DeltaState::Deleted)]);
        assert_eq!(spo(&set, 4), vec![([4, 5, 6], DeltaState::Live)]);
    }

    #[test]
    fn test_map_literals_continues_base_ids() {
        let db = Arc::new(MemoryDatabase::new());
        let known = db.uri("http://example.org/known");
        let index = DifferentialIndex::new(db.clone());
        let ids = index.map_literals(&[
            PendingLiteral::uri("http://example.org/known"),
            PendingLiteral::uri("http://example.org/new"),
            PendingLiteral::new("chat", LiteralType::CustomLanguage, Some("fr".into())),
            PendingLiteral::uri("http://example.org/new"),
        ]);
        assert_eq!(ids[0], known);
        assert_eq!(ids[1], 1);
        // "fr" got id 2, the literal itself 3
        assert_eq!(ids[2], 3);
        assert_eq!(ids[3], 1);
        assert_eq!(index.next_id(), 4);
        assert_eq!(
            index.lookup_by_id(3),
            Some(Literal::new("chat", LiteralType::CustomLanguage, 2))
        );
        assert_eq!(index.lookup("fr", LiteralType::Literal, 0), Some(2));
        assert_eq!(index.lookup_by_id(4), None);
    }

    #[test]
    fn test_sync_moves_state_into_base() {
        let db = Arc::new(MemoryDatabase::with_triples(vec![
            Triple::new(1, 2, 3),
            Triple::new(1, 2, 4),
        ]));
        let index = DifferentialIndex::new(db.clone());
        index.load(&[Triple::new(1, 2, 5)], false);
        index.load(&[Triple::new(1, 2, 3)], true);
        index.sync().unwrap();
        assert!(index.is_empty());
        let triples: Vec<Triple> = db.all_triples().into_iter().collect();
        assert_eq!(triples, vec![Triple::new(1, 2, 4), Triple::new(1, 2, 5)]);
    }

    #[test]
    fn test_clear_discards_everything() {
        let db = Arc::new(MemoryDatabase::new());
        let index = DifferentialIndex::new(db);
        index.map_literals(&[PendingLiteral::uri("x")]);
        index.load(&[Triple::new(0, 0, 0)], false);
        assert!(!index.is_empty());
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.next_id(), 0);
    }
}
