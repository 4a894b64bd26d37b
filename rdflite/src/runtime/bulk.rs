// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! String-level update batches
//!
//! A [`BulkOperation`] collects triples given as text. Strings the
//! dictionary does not know yet get a temporary id; `commit` assigns real ids
//! through the differential index and loads the batch as one epoch.

use super::differential::{DifferentialIndex, PendingLiteral};
use crate::storage::term::{parse_statement, Term};
use crate::storage::{Dictionary, LiteralType, StorageError, Triple};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermId {
    Known(u32),
    Temporary(usize),
}

/// A batch of insertions or deletions
pub struct BulkOperation {
    index: Arc<DifferentialIndex>,
    temporaries: Vec<PendingLiteral>,
    temporary_ids: HashMap<PendingLiteral, usize>,
    triples: Vec<[TermId; 3]>,
    delete: bool,
}

impl BulkOperation {
    pub fn new(index: Arc<DifferentialIndex>) -> Self {
        Self {
            index,
            temporaries: Vec::new(),
            temporary_ids: HashMap::new(),
            triples: Vec::new(),
            delete: false,
        }
    }

    /// Number of triples collected so far
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Turn the batch into a deletion batch
    pub fn mark_deleted(&mut self) {
        self.delete = true;
    }

    fn map_string(&mut self, literal: PendingLiteral) -> TermId {
        if let Some(index) = self.temporary_ids.get(&literal) {
            return TermId::Temporary(*index);
        }

        // custom types naming a builtin datatype use the builtin type
        if literal.literal_type == LiteralType::CustomType {
            if let Some(builtin) = literal
                .sub_type
                .as_deref()
                .and_then(LiteralType::from_xsd_iri)
            {
                return self.map_string(PendingLiteral::new(literal.text, builtin, None));
            }
        }

        let sub_type = match (&literal.sub_type, literal.literal_type.has_sub_type()) {
            (Some(text), true) => {
                let sub = PendingLiteral::new(text.clone(), literal.literal_type.sub_type_type(), None);
                Some(self.map_string(sub))
            }
            _ => None,
        };
        let known = match sub_type {
            None => self.index.lookup(&literal.text, literal.literal_type, 0),
            Some(TermId::Known(sub)) => self.index.lookup(&literal.text, literal.literal_type, sub),
            Some(TermId::Temporary(_)) => None,
        };
        if let Some(id) = known {
            return TermId::Known(id);
        }

        let index = self.temporaries.len();
        self.temporaries.push(literal.clone());
        self.temporary_ids.insert(literal, index);
        TermId::Temporary(index)
    }

    /// Add a triple; subject and predicate are IRIs
    pub fn insert(
        &mut self,
        subject: &str,
        predicate: &str,
        object: &str,
        object_type: LiteralType,
        object_sub_type: &str,
    ) {
        let s = self.map_string(PendingLiteral::uri(subject));
        let p = self.map_string(PendingLiteral::uri(predicate));
        let sub_type = if object_type.has_sub_type() {
            Some(object_sub_type.to_string())
        } else {
            None
        };
        let o = self.map_string(PendingLiteral::new(object, object_type, sub_type));
        self.triples.push([s, p, o]);
    }

    /// Add a triple written as `<s> <p> object .`
    pub fn insert_statement(&mut self, line: &str) -> Result<(), StorageError> {
        let (subject, predicate, object) = parse_statement(line)?;
        let subject = match subject {
            Term::Iri(iri) => iri,
            other => {
                return Err(StorageError::Serialization(format!(
                    "subject must be an IRI, got {:?}",
                    other
                )))
            }
        };
        let predicate = match predicate {
            Term::Iri(iri) => iri,
            other => {
                return Err(StorageError::Serialization(format!(
                    "predicate must be an IRI, got {:?}",
                    other
                )))
            }
        };
        let (text, object_type, sub_type) = object.into_parts();
        self.insert(
            &subject,
            &predicate,
            &text,
            object_type,
            sub_type.as_deref().unwrap_or(""),
        );
        Ok(())
    }

    /// Resolve temporary ids and load the batch; returns the number of triples
    pub fn commit(&mut self) -> usize {
        let real_ids = self.index.map_literals(&self.temporaries);
        let resolve = |id: TermId| match id {
            TermId::Known(id) => id,
            TermId::Temporary(index) => real_ids[index],
        };
        let batch: Vec<Triple> = self
            .triples
            .iter()
            .map(|[s, p, o]| Triple::new(resolve(*s), resolve(*p), resolve(*o)))
            .collect();
        self.index.load(&batch, self.delete);
        let count = batch.len();
        self.abort();
        count
    }

    /// Drop everything collected so far
    pub fn abort(&mut self) {
        self.temporaries.clear();
        self.temporary_ids.clear();
        self.triples.clear();
    }
}
