// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Textual RDF terms
//!
//! Table functions and bulk loads exchange values as N-Triples style terms:
//! `<iri>`, `_:blank`, `"text"`, `"text"@lang` and `"text"^^<datatype>`.
//! This module parses those terms with nom and formats dictionary entries
//! back into the same syntax.

use super::types::{LiteralType, StorageError};
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_till, take_while1},
    character::complete::{char, multispace0, none_of},
    combinator::{all_consuming, map, opt, value},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

/// A parsed term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Iri(String),
    Literal {
        text: String,
        language: Option<String>,
        datatype: Option<String>,
    },
}

impl Term {
    /// Split into dictionary text, type and the text of the sub-type entry
    ///
    /// Datatypes naming one of the builtin XSD types map onto that type and
    /// lose their sub-type.
    pub fn into_parts(self) -> (String, LiteralType, Option<String>) {
        match self {
            Term::Iri(text) => (text, LiteralType::Uri, None),
            Term::Literal {
                text,
                language: Some(language),
                ..
            } => (text, LiteralType::CustomLanguage, Some(language)),
            Term::Literal {
                text,
                datatype: Some(datatype),
                ..
            } => match LiteralType::from_xsd_iri(&datatype) {
                Some(builtin) => (text, builtin, None),
                None => (text, LiteralType::CustomType, Some(datatype)),
            },
            Term::Literal { text, .. } => (text, LiteralType::Literal, None),
        }
    }
}

fn escaped_text(input: &str) -> IResult<&str, String> {
    map(
        opt(escaped_transform(
            none_of("\\\""),
            '\\',
            alt((
                value("\\", tag("\\")),
                value("\"", tag("\"")),
                value("\n", tag("n")),
                value("\r", tag("r")),
                value("\t", tag("t")),
                value(" ", tag(" ")),
            )),
        )),
        |s: Option<String>| s.unwrap_or_default(),
    )(input)
}

fn iri(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('<'), take_till(|c| c == '>'), char('>')),
        |s: &str| s.to_string(),
    )(input)
}

fn blank_node(input: &str) -> IResult<&str, String> {
    map(
        preceded(
            tag("_:"),
            take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-'),
        ),
        |name: &str| format!("_:{}", name),
    )(input)
}

fn language_tag(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-')(input)
}

enum Suffix {
    Language(String),
    Datatype(String),
}

fn literal(input: &str) -> IResult<&str, Term> {
    let (rest, text) = delimited(char('"'), escaped_text, char('"'))(input)?;
    let (rest, suffix) = opt(alt((
        map(preceded(char('@'), language_tag), |l: &str| {
            Suffix::Language(l.to_string())
        }),
        map(preceded(tag("^^"), iri), Suffix::Datatype),
    )))(rest)?;
    let term = match suffix {
        Some(Suffix::Language(l)) => Term::Literal {
            text,
            language: Some(l),
            datatype: None,
        },
        Some(Suffix::Datatype(d)) => Term::Literal {
            text,
            language: None,
            datatype: Some(d),
        },
        None => Term::Literal {
            text,
            language: None,
            datatype: None,
        },
    };
    Ok((rest, term))
}

fn term(input: &str) -> IResult<&str, Term> {
    alt((map(iri, Term::Iri), map(blank_node, Term::Iri), literal))(input)
}

fn spaced<'a, O>(
    parser: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, parser, multispace0)
}

/// Parse a single term
pub fn parse_term(input: &str) -> Result<Term, StorageError> {
    all_consuming(spaced(term))(input)
        .map(|(_, t)| t)
        .map_err(|e| StorageError::Serialization(format!("malformed term '{}': {}", input, e)))
}

/// Parse a `subject predicate object .` statement
pub fn parse_statement(input: &str) -> Result<(Term, Term, Term), StorageError> {
    all_consuming(terminated(
        tuple((spaced(term), spaced(term), spaced(term))),
        opt(spaced(char('.'))),
    ))(input)
    .map(|(_, t)| t)
    .map_err(|e| StorageError::Serialization(format!("malformed statement '{}': {}", input, e)))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Format a dictionary entry as a term
///
/// `sub_type_text` is the text of the language tag or datatype IRI entry for
/// types that carry one.
pub fn format_term(text: &str, literal_type: LiteralType, sub_type_text: Option<&str>) -> String {
    match literal_type {
        LiteralType::Uri => format!("<{}>", text),
        LiteralType::Literal => format!("\"{}\"", escape(text)),
        LiteralType::CustomLanguage => match sub_type_text {
            Some(lang) => format!("\"{}\"@{}", escape(text), lang),
            None => format!("\"{}\"", escape(text)),
        },
        LiteralType::CustomType => match sub_type_text {
            Some(dt) => format!("\"{}\"^^<{}>", escape(text), dt),
            None => format!("\"{}\"", escape(text)),
        },
        other => match other.xsd_iri() {
            Some(dt) => format!("\"{}\"^^<{}>", escape(text), dt),
            None => format!("\"{}\"", escape(text)),
        },
    }
}
