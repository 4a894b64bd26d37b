// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Core value types shared by the storage layer and the execution engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Id marking an unbound register or a missing value
pub const NULL_ID: u32 = u32::MAX;

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Create a backend error
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a corruption error
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Self::Corrupt(msg.into())
    }
}

/// A triple of dictionary ids in subject/predicate/object form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: u32,
    pub predicate: u32,
    pub object: u32,
}

impl Triple {
    pub fn new(subject: u32, predicate: u32, object: u32) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

/// The six physical sort orders of the triple relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataOrder {
    SubjectPredicateObject,
    SubjectObjectPredicate,
    ObjectPredicateSubject,
    ObjectSubjectPredicate,
    PredicateSubjectObject,
    PredicateObjectSubject,
}

impl DataOrder {
    /// All orders, in index order
    pub const ALL: [DataOrder; 6] = [
        DataOrder::SubjectPredicateObject,
        DataOrder::SubjectObjectPredicate,
        DataOrder::ObjectPredicateSubject,
        DataOrder::ObjectSubjectPredicate,
        DataOrder::PredicateSubjectObject,
        DataOrder::PredicateObjectSubject,
    ];

    /// Position of the order in [`DataOrder::ALL`]
    pub fn index(self) -> usize {
        match self {
            DataOrder::SubjectPredicateObject => 0,
            DataOrder::SubjectObjectPredicate => 1,
            DataOrder::ObjectPredicateSubject => 2,
            DataOrder::ObjectSubjectPredicate => 3,
            DataOrder::PredicateSubjectObject => 4,
            DataOrder::PredicateObjectSubject => 5,
        }
    }

    /// Which triple position (0 = subject, 1 = predicate, 2 = object) lands in value1..value3
    pub fn positions(self) -> [usize; 3] {
        match self {
            DataOrder::SubjectPredicateObject => [0, 1, 2],
            DataOrder::SubjectObjectPredicate => [0, 2, 1],
            DataOrder::ObjectPredicateSubject => [2, 1, 0],
            DataOrder::ObjectSubjectPredicate => [2, 0, 1],
            DataOrder::PredicateSubjectObject => [1, 0, 2],
            DataOrder::PredicateObjectSubject => [1, 2, 0],
        }
    }

    /// Reorder a triple into this order's key
    pub fn permute(self, triple: &Triple) -> [u32; 3] {
        let spo = [triple.subject, triple.predicate, triple.object];
        let p = self.positions();
        [spo[p[0]], spo[p[1]], spo[p[2]]]
    }

    /// Inverse of [`DataOrder::permute`]
    pub fn unpermute(self, key: [u32; 3]) -> Triple {
        let mut spo = [0u32; 3];
        for (slot, position) in self.positions().iter().enumerate() {
            spo[*position] = key[slot];
        }
        Triple::new(spo[0], spo[1], spo[2])
    }

    /// Short name used by the plan printer
    pub fn name(self) -> &'static str {
        match self {
            DataOrder::SubjectPredicateObject => "SubjectPredicateObject",
            DataOrder::SubjectObjectPredicate => "SubjectObjectPredicate",
            DataOrder::ObjectPredicateSubject => "ObjectPredicateSubject",
            DataOrder::ObjectSubjectPredicate => "ObjectSubjectPredicate",
            DataOrder::PredicateSubjectObject => "PredicateSubjectObject",
            DataOrder::PredicateObjectSubject => "PredicateObjectSubject",
        }
    }
}

/// One entry delivered by a facts cursor
///
/// Full scans deliver distinct triples with a count of one. Aggregated scans
/// leave `values[2]` at zero, fully aggregated scans leave `values[1..]` at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactsEntry {
    pub values: [u32; 3],
    pub count: u32,
}

/// Literal types known to the dictionary
///
/// The declaration order is the ordering used by sort.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LiteralType {
    Uri,
    Literal,
    CustomLanguage,
    CustomType,
    String,
    Integer,
    Decimal,
    Double,
    Boolean,
    Date,
}

impl LiteralType {
    /// Does the type carry a sub-type id (language tag or datatype IRI)?
    pub fn has_sub_type(self) -> bool {
        matches!(self, LiteralType::CustomLanguage | LiteralType::CustomType)
    }

    /// The type of the sub-type entry
    pub fn sub_type_type(self) -> LiteralType {
        match self {
            LiteralType::CustomLanguage => LiteralType::Literal,
            _ => LiteralType::Uri,
        }
    }

    /// Numeric types take part in arithmetic and numeric comparison
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            LiteralType::Integer | LiteralType::Decimal | LiteralType::Double
        )
    }

    /// Builtin XSD datatype IRI, if the type has one
    pub fn xsd_iri(self) -> Option<&'static str> {
        match self {
            LiteralType::String => Some(XSD_STRING),
            LiteralType::Integer => Some(XSD_INTEGER),
            LiteralType::Decimal => Some(XSD_DECIMAL),
            LiteralType::Double => Some(XSD_DOUBLE),
            LiteralType::Boolean => Some(XSD_BOOLEAN),
            LiteralType::Date => Some(XSD_DATE_TIME),
            _ => None,
        }
    }

    /// Map a datatype IRI onto a builtin type
    pub fn from_xsd_iri(iri: &str) -> Option<LiteralType> {
        match iri {
            XSD_STRING => Some(LiteralType::String),
            XSD_INTEGER => Some(LiteralType::Integer),
            XSD_DECIMAL => Some(LiteralType::Decimal),
            XSD_DOUBLE => Some(LiteralType::Double),
            XSD_BOOLEAN => Some(LiteralType::Boolean),
            XSD_DATE_TIME => Some(LiteralType::Date),
            _ => None,
        }
    }
}

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// A dictionary entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub text: String,
    pub literal_type: LiteralType,
    /// Id of the language tag or datatype IRI, 0 when the type has none
    pub sub_type: u32,
}

impl Literal {
    pub fn new<S: Into<String>>(text: S, literal_type: LiteralType, sub_type: u32) -> Self {
        Self {
            text: text.into(),
            literal_type,
            sub_type,
        }
    }

    pub fn uri<S: Into<String>>(text: S) -> Self {
        Self::new(text, LiteralType::Uri, 0)
    }

    pub fn plain<S: Into<String>>(text: S) -> Self {
        Self::new(text, LiteralType::Literal, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permute_roundtrips_every_order() {
        let t = Triple::new(1, 2, 3);
        for order in DataOrder::ALL {
            assert_eq!(order.unpermute(order.permute(&t)), t);
        }
        assert_eq!(DataOrder::ObjectSubjectPredicate.permute(&t), [3, 1, 2]);
        assert_eq!(DataOrder::PredicateObjectSubject.permute(&t), [2, 3, 1]);
    }

    #[test]
    fn test_sub_type_rules() {
        assert!(LiteralType::CustomLanguage.has_sub_type());
        assert_eq!(
            LiteralType::CustomLanguage.sub_type_type(),
            LiteralType::Literal
        );
        assert_eq!(LiteralType::CustomType.sub_type_type(), LiteralType::Uri);
        assert!(!LiteralType::Integer.has_sub_type());
        assert_eq!(
            LiteralType::from_xsd_iri(XSD_DOUBLE),
            Some(LiteralType::Double)
        );
    }
}
