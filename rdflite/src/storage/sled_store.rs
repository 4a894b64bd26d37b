// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sled-backed base relation
//!
//! One tree per sort order, keyed by the big-endian encoding of the three
//! values so that byte order equals numeric order. Aggregated cursors group
//! the full order on the fly. Dictionary entries live in two trees,
//! `id2literal` and `literal2id`, with bincode-encoded literals.

use super::types::{DataOrder, FactsEntry, Literal, LiteralType, StorageError, Triple};
use super::{Database, Dictionary, FactsCursor};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

const ORDER_TREES: [&str; 6] = ["spo", "sop", "ops", "osp", "pso", "pos"];

fn backend(e: sled::Error) -> StorageError {
    StorageError::backend(e.to_string())
}

fn serialization(e: bincode::Error) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn encode_key(key: &[u32; 3]) -> [u8; 12] {
    let mut out = [0u8; 12];
    for (i, v) in key.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&v.to_be_bytes());
    }
    out
}

fn decode_key(bytes: &[u8]) -> Option<[u32; 3]> {
    if bytes.len() != 12 {
        return None;
    }
    let mut key = [0u32; 3];
    for (i, slot) in key.iter_mut().enumerate() {
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
        *slot = u32::from_be_bytes(word);
    }
    Some(key)
}

/// Cursor over one order tree, grouping on the first `width` values
struct SledFactsCursor {
    tree: sled::Tree,
    width: usize,
    iter: Option<sled::Iter>,
    pending: Option<[u32; 3]>,
    current: FactsEntry,
}

impl SledFactsCursor {
    fn new(tree: sled::Tree, width: usize) -> Self {
        Self {
            tree,
            width,
            iter: None,
            pending: None,
            current: FactsEntry {
                values: [0; 3],
                count: 0,
            },
        }
    }

    fn next_key(&mut self) -> Option<[u32; 3]> {
        match self.iter.as_mut()?.next()? {
            Ok((k, _)) => decode_key(&k),
            Err(e) => {
                log::warn!("sled cursor stopped: {}", e);
                None
            }
        }
    }

    fn load_group(&mut self) -> bool {
        let first = match self.pending.take() {
            Some(k) => k,
            None => return false,
        };
        let width = self.width;
        let mut values = [0u32; 3];
        values[..width].copy_from_slice(&first[..width]);
        let mut count = 1u32;
        loop {
            match self.next_key() {
                Some(k) if k[..width] == first[..width] => count += 1,
                other => {
                    self.pending = other;
                    break;
                }
            }
        }
        self.current = FactsEntry { values, count };
        true
    }
}

impl FactsCursor for SledFactsCursor {
    fn seek(&mut self, key: [u32; 3]) -> bool {
        let mut start = [0u32; 3];
        start[..self.width].copy_from_slice(&key[..self.width]);
        self.iter = Some(self.tree.range(encode_key(&start).to_vec()..));
        self.pending = self.next_key();
        self.load_group()
    }

    fn advance(&mut self) -> bool {
        self.load_group()
    }

    fn current(&self) -> FactsEntry {
        self.current
    }
}

/// Dictionary stored in sled
pub struct SledDictionary {
    id2literal: sled::Tree,
    literal2id: sled::Tree,
    next_id: AtomicU32,
}

impl SledDictionary {
    fn open(db: &sled::Db) -> Result<Self, StorageError> {
        let id2literal = db.open_tree("id2literal").map_err(backend)?;
        let literal2id = db.open_tree("literal2id").map_err(backend)?;
        let next_id = match id2literal.last().map_err(backend)? {
            Some((k, _)) if k.len() == 4 => {
                let mut word = [0u8; 4];
                word.copy_from_slice(&k);
                u32::from_be_bytes(word) + 1
            }
            Some(_) => return Err(StorageError::corrupt("malformed dictionary key")),
            None => 0,
        };
        Ok(Self {
            id2literal,
            literal2id,
            next_id: AtomicU32::new(next_id),
        })
    }

    fn append(&self, literal: &Literal) -> Result<u32, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let encoded = bincode::serialize(literal).map_err(serialization)?;
        self.id2literal
            .insert(id.to_be_bytes(), encoded.clone())
            .map_err(backend)?;
        self.literal2id
            .insert(encoded, id.to_be_bytes().to_vec())
            .map_err(backend)?;
        Ok(id)
    }

    fn find(&self, literal: &Literal) -> Result<Option<u32>, StorageError> {
        let encoded = bincode::serialize(literal).map_err(serialization)?;
        match self.literal2id.get(encoded).map_err(backend)? {
            Some(v) if v.len() == 4 => {
                let mut word = [0u8; 4];
                word.copy_from_slice(&v);
                Ok(Some(u32::from_be_bytes(word)))
            }
            Some(_) => Err(StorageError::corrupt("malformed dictionary id")),
            None => Ok(None),
        }
    }
}

impl Dictionary for SledDictionary {
    fn lookup(&self, text: &str, literal_type: LiteralType, sub_type: u32) -> Option<u32> {
        match self.find(&Literal::new(text, literal_type, sub_type)) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("dictionary lookup failed: {}", e);
                None
            }
        }
    }

    fn lookup_by_id(&self, id: u32) -> Option<Literal> {
        let bytes = match self.id2literal.get(id.to_be_bytes()) {
            Ok(v) => v?,
            Err(e) => {
                log::warn!("dictionary lookup failed: {}", e);
                return None;
            }
        };
        match bincode::deserialize(&bytes) {
            Ok(literal) => Some(literal),
            Err(e) => {
                log::warn!("dictionary entry {} unreadable: {}", id, e);
                None
            }
        }
    }

    fn next_id(&self) -> u32 {
        self.next_id.load(Ordering::SeqCst)
    }
}

/// Base relation persisted in a sled database
pub struct SledDatabase {
    db: sled::Db,
    orders: Vec<sled::Tree>,
    dictionary: SledDictionary,
}

impl SledDatabase {
    /// Open or create a database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(backend)?;
        Self::from_db(db)
    }

    /// Open a throwaway database that is removed on drop
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(backend)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let orders = ORDER_TREES
            .iter()
            .map(|name| db.open_tree(name).map_err(backend))
            .collect::<Result<Vec<_>, _>>()?;
        let dictionary = SledDictionary::open(&db)?;
        Ok(Self {
            db,
            orders,
            dictionary,
        })
    }

    /// Return the id of `literal`, adding it if unknown
    pub fn intern(&self, literal: &Literal) -> Result<u32, StorageError> {
        match self.dictionary.find(literal)? {
            Some(id) => Ok(id),
            None => self.dictionary.append(literal),
        }
    }

    /// Add triples to every order
    pub fn insert_triples(&self, triples: &[Triple]) -> Result<(), StorageError> {
        self.apply_update(&[], triples, &[])
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }

    fn cursor(&self, order: DataOrder, width: usize) -> Box<dyn FactsCursor> {
        Box::new(SledFactsCursor::new(
            self.orders[order.index()].clone(),
            width,
        ))
    }
}

impl Database for SledDatabase {
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
        for literal in literals {
            self.dictionary.append(literal)?;
        }
        for order in DataOrder::ALL {
            let tree = &self.orders[order.index()];
            for t in deletes {
                tree.remove(encode_key(&order.permute(t))).map_err(backend)?;
            }
            for t in inserts {
                tree.insert(encode_key(&order.permute(t)), &[] as &[u8])
                    .map_err(backend)?;
            }
        }
        self.flush()?;
        log::debug!(
            "sled database updated: {} literals, {} inserts, {} deletes",
            literals.len(),
            inserts.len(),
            deletes.len()
        );
        Ok(())
    }
}
