// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage contract consumed by the execution engine
//!
//! The engine never looks at pages or on-disk layouts. It needs three things
//! from the storage layer:
//!
//! - ordered, seekable cursors over the six sort orders of the triple
//!   relation, in full, aggregated and fully aggregated form ([`FactsCursor`])
//! - an id/literal dictionary ([`Dictionary`])
//! - a way to fold a batch of pending changes into the base relation
//!   ([`Database::apply_update`]), used when the differential index syncs
//!
//! [`MemoryDatabase`] is the in-process implementation; `SledDatabase` keeps
//! the same data in an embedded sled store.

pub mod memory;
#[cfg(feature = "sled-backend")]
pub mod sled_store;
pub mod term;
pub mod types;

pub use memory::MemoryDatabase;
#[cfg(feature = "sled-backend")]
pub use sled_store::SledDatabase;
pub use types::{
    DataOrder, FactsEntry, Literal, LiteralType, StorageError, Triple, NULL_ID,
};

/// Forward cursor over one sort order
pub trait FactsCursor: Send {
    /// Position on the first entry whose key is >= `key`. Returns false when
    /// no such entry exists.
    fn seek(&mut self, key: [u32; 3]) -> bool;

    /// Move to the following entry. Returns false at the end.
    fn advance(&mut self) -> bool;

    /// The entry under the cursor. Only meaningful after a successful
    /// `seek`/`advance`.
    fn current(&self) -> FactsEntry;
}

/// Id/literal dictionary
pub trait Dictionary: Send + Sync {
    /// Find the id of a literal
    fn lookup(&self, text: &str, literal_type: LiteralType, sub_type: u32) -> Option<u32>;

    /// Find the literal for an id
    fn lookup_by_id(&self, id: u32) -> Option<Literal>;

    /// First id not yet handed out
    fn next_id(&self) -> u32;
}

/// The base triple relation
pub trait Database: Send + Sync {
    /// Cursor over distinct triples in `order`
    fn facts(&self, order: DataOrder) -> Box<dyn FactsCursor>;

    /// Cursor over `(value1, value2)` prefixes of `order` with their counts
    fn aggregated_facts(&self, order: DataOrder) -> Box<dyn FactsCursor>;

    /// Cursor over `value1` of `order` with its count
    fn fully_aggregated_facts(&self, order: DataOrder) -> Box<dyn FactsCursor>;

    /// The dictionary
    fn dictionary(&self) -> &dyn Dictionary;

    /// Append new literals (ids are assigned consecutively from `next_id`)
    /// and apply triple insertions and deletions to every order.
    fn apply_update(
        &self,
        literals: &[Literal],
        inserts: &[Triple],
        deletes: &[Triple],
    ) -> Result<(), StorageError>;
}

