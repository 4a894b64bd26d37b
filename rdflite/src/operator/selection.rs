// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Generic predicate evaluation
//!
//! A [`Predicate`] is an expression tree over registers and constants. Values
//! stay ids as long as possible; the dictionary is consulted only when an
//! expression needs the text or the type of a term.

use super::{BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::{DictionaryHandle, RegisterRef};
use crate::storage::types::XSD_STRING;
use crate::storage::{Dictionary, Literal, LiteralType, NULL_ID};
use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

/// Intermediate result of an expression
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Id(u32),
    Boolean(bool),
    Term(Literal),
}

impl Value {
    fn literal(&self, dict: &DictionaryHandle) -> Option<Literal> {
        match self {
            Value::Id(id) if *id == NULL_ID => None,
            Value::Id(id) => dict.lookup_by_id(*id),
            Value::Boolean(b) => Some(Literal::new(
                if *b { "true" } else { "false" },
                LiteralType::Boolean,
                0,
            )),
            Value::Term(literal) => Some(literal.clone()),
        }
    }

    fn text(&self, dict: &DictionaryHandle) -> String {
        match self.literal(dict) {
            Some(literal) => literal.text,
            None => "NULL".to_string(),
        }
    }

    fn truth(&self, dict: &DictionaryHandle) -> bool {
        match self {
            Value::Boolean(b) => *b,
            other => other.text(dict) == "true",
        }
    }

    fn number(&self, dict: &DictionaryHandle) -> f64 {
        self.text(dict).trim().parse::<f64>().unwrap_or(0.0)
    }

    fn literal_text(text: String) -> Value {
        Value::Term(Literal::plain(text))
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if text.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

fn values_equal(l: &Value, r: &Value, dict: &DictionaryHandle) -> bool {
    if let (Value::Id(a), Value::Id(b)) = (l, r) {
        return a == b;
    }
    let (ll, rl) = (l.literal(dict), r.literal(dict));
    let ls = ll.as_ref().map(|x| x.text.as_str()).unwrap_or("NULL");
    let rs = rl.as_ref().map(|x| x.text.as_str()).unwrap_or("NULL");

    if let (Some(a), Some(b)) = (parse_date(ls), parse_date(rs)) {
        return a == b;
    }
    let numeric = ll
        .iter()
        .chain(rl.iter())
        .any(|x| x.literal_type.is_numeric());
    if numeric {
        if let (Ok(a), Ok(b)) = (ls.trim().parse::<f64>(), rs.trim().parse::<f64>()) {
            return a == b;
        }
    }
    ls == rs
}

fn compare_values(l: &Value, r: &Value, dict: &DictionaryHandle) -> Option<Ordering> {
    let ls = l.text(dict);
    let rs = r.text(dict);
    if let (Some(a), Some(b)) = (parse_date(&ls), parse_date(&rs)) {
        return Some(a.cmp(&b));
    }
    if let (Ok(a), Ok(b)) = (ls.trim().parse::<f64>(), rs.trim().parse::<f64>()) {
        return a.partial_cmp(&b);
    }
    Some(ls.cmp(&rs))
}

fn lang_matches(tag: &str, range: &str) -> bool {
    if range == "*" {
        return !tag.is_empty();
    }
    let tag = tag.to_lowercase();
    let range = range.to_lowercase();
    tag == range || (tag.starts_with(&range) && tag[range.len()..].starts_with('-'))
}

fn build_regex(pattern: &str, flags: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .dot_matches_new_line(flags.contains('s'))
        .multi_line(flags.contains('m'))
        .ignore_whitespace(flags.contains('x'))
        .build()
}

/// Expression tree evaluated per tuple
#[derive(Debug)]
pub enum Predicate {
    Or(Box<Predicate>, Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Equal(Box<Predicate>, Box<Predicate>),
    NotEqual(Box<Predicate>, Box<Predicate>),
    Less(Box<Predicate>, Box<Predicate>),
    LessOrEqual(Box<Predicate>, Box<Predicate>),
    Plus(Box<Predicate>, Box<Predicate>),
    Minus(Box<Predicate>, Box<Predicate>),
    Mul(Box<Predicate>, Box<Predicate>),
    Div(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Neg(Box<Predicate>),
    Null,
    False,
    Variable(RegisterRef),
    /// A term known to the dictionary
    Constant(u32),
    /// A literal that is not in the dictionary
    TemporaryLiteral(String),
    /// An IRI that is not in the dictionary
    TemporaryIri(String),
    /// Extension function; unsupported, evaluates to NULL
    FunctionCall {
        iri: String,
        args: Vec<Predicate>,
    },
    Str(Box<Predicate>),
    Lang(Box<Predicate>),
    LangMatches(Box<Predicate>, Box<Predicate>),
    Datatype(Box<Predicate>),
    Bound(Box<Predicate>),
    SameTerm(Box<Predicate>, Box<Predicate>),
    IsIri(Box<Predicate>),
    IsBlank(Box<Predicate>),
    IsLiteral(Box<Predicate>),
    Regex {
        text: Box<Predicate>,
        pattern: Box<Predicate>,
        flags: Option<Box<Predicate>>,
        compiled: Option<Regex>,
    },
    In {
        probe: Box<Predicate>,
        values: Vec<Predicate>,
    },
}

impl Predicate {
    /// `regex(text, pattern [, flags])`, compiled up front when pattern and
    /// flags are constant text
    pub fn regex(
        text: Predicate,
        pattern: Predicate,
        flags: Option<Predicate>,
    ) -> Result<Predicate, regex::Error> {
        let constant_flags = match &flags {
            None => Some(String::new()),
            Some(Predicate::TemporaryLiteral(f)) => Some(f.clone()),
            Some(_) => None,
        };
        let compiled = match (&pattern, constant_flags) {
            (Predicate::TemporaryLiteral(p), Some(f)) => Some(build_regex(p, &f)?),
            _ => None,
        };
        Ok(Predicate::Regex {
            text: Box::new(text),
            pattern: Box::new(pattern),
            flags: flags.map(Box::new),
            compiled,
        })
    }

    fn binary(
        make: fn(Box<Predicate>, Box<Predicate>) -> Predicate,
        left: Predicate,
        right: Predicate,
    ) -> Predicate {
        make(Box::new(left), Box::new(right))
    }

    pub fn and(left: Predicate, right: Predicate) -> Predicate {
        Self::binary(Predicate::And, left, right)
    }

    pub fn equal(left: Predicate, right: Predicate) -> Predicate {
        Self::binary(Predicate::Equal, left, right)
    }

    /// Evaluate as a condition
    pub fn check(&self, dict: &DictionaryHandle) -> bool {
        self.eval(dict).truth(dict)
    }

    fn eval(&self, dict: &DictionaryHandle) -> Value {
        match self {
            Predicate::Or(l, r) => Value::Boolean(l.check(dict) || r.check(dict)),
            Predicate::And(l, r) => Value::Boolean(l.check(dict) && r.check(dict)),
            Predicate::Equal(l, r) => {
                Value::Boolean(values_equal(&l.eval(dict), &r.eval(dict), dict))
            }
            Predicate::NotEqual(l, r) => {
                Value::Boolean(!values_equal(&l.eval(dict), &r.eval(dict), dict))
            }
            Predicate::Less(l, r) => Value::Boolean(matches!(
                compare_values(&l.eval(dict), &r.eval(dict), dict),
                Some(Ordering::Less)
            )),
            Predicate::LessOrEqual(l, r) => Value::Boolean(matches!(
                compare_values(&l.eval(dict), &r.eval(dict), dict),
                Some(Ordering::Less | Ordering::Equal)
            )),
            Predicate::Plus(l, r) => arithmetic(l, r, dict, |a, b| a + b),
            Predicate::Minus(l, r) => arithmetic(l, r, dict, |a, b| a - b),
            Predicate::Mul(l, r) => arithmetic(l, r, dict, |a, b| a * b),
            Predicate::Div(l, r) => arithmetic(l, r, dict, |a, b| a / b),
            Predicate::Not(input) => Value::Boolean(!input.check(dict)),
            Predicate::Neg(input) => number_value(-input.eval(dict).number(dict)),
            Predicate::Null => Value::Id(NULL_ID),
            Predicate::False => Value::Boolean(false),
            Predicate::Variable(reg) => Value::Id(reg.get()),
            Predicate::Constant(id) => Value::Id(*id),
            Predicate::TemporaryLiteral(text) => Value::literal_text(text.clone()),
            Predicate::TemporaryIri(text) => Value::Term(Literal::uri(text.clone())),
            Predicate::FunctionCall { .. } => Value::Id(NULL_ID),
            Predicate::Str(input) => Value::literal_text(input.eval(dict).text(dict)),
            Predicate::Lang(input) => {
                let tag = match input.eval(dict).literal(dict) {
                    Some(l) if l.literal_type == LiteralType::CustomLanguage => dict
                        .lookup_by_id(l.sub_type)
                        .map(|sub| sub.text)
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                Value::literal_text(tag)
            }
            Predicate::LangMatches(l, r) => {
                let tag = l.eval(dict).text(dict);
                let range = r.eval(dict).text(dict);
                Value::Boolean(lang_matches(&tag, &range))
            }
            Predicate::Datatype(input) => match input.eval(dict).literal(dict) {
                None => Value::Id(NULL_ID),
                Some(l) => match l.literal_type {
                    LiteralType::Uri => Value::Id(NULL_ID),
                    LiteralType::Literal | LiteralType::CustomLanguage => {
                        Value::Term(Literal::uri(XSD_STRING))
                    }
                    LiteralType::CustomType => match dict.lookup_by_id(l.sub_type) {
                        Some(sub) => Value::Term(Literal::uri(sub.text)),
                        None => Value::Id(NULL_ID),
                    },
                    other => match other.xsd_iri() {
                        Some(iri) => Value::Term(Literal::uri(iri)),
                        None => Value::Id(NULL_ID),
                    },
                },
            },
            Predicate::Bound(input) => match input.eval(dict) {
                Value::Id(id) => Value::Boolean(id != NULL_ID),
                _ => Value::Boolean(true),
            },
            Predicate::SameTerm(l, r) => {
                let (lv, rv) = (l.eval(dict), r.eval(dict));
                if let (Value::Id(a), Value::Id(b)) = (&lv, &rv) {
                    return Value::Boolean(a == b);
                }
                let same = match (lv.literal(dict), rv.literal(dict)) {
                    (Some(a), Some(b)) => {
                        a.literal_type == b.literal_type
                            && (!a.literal_type.has_sub_type() || a.sub_type == b.sub_type)
                            && a.text == b.text
                    }
                    (None, None) => true,
                    _ => false,
                };
                Value::Boolean(same)
            }
            Predicate::IsIri(input) => Value::Boolean(
                input
                    .eval(dict)
                    .literal(dict)
                    .is_some_and(|l| l.literal_type == LiteralType::Uri),
            ),
            Predicate::IsBlank(input) => Value::Boolean(
                input
                    .eval(dict)
                    .literal(dict)
                    .is_some_and(|l| l.literal_type == LiteralType::Uri && l.text.starts_with("_:")),
            ),
            Predicate::IsLiteral(input) => Value::Boolean(
                input
                    .eval(dict)
                    .literal(dict)
                    .is_some_and(|l| l.literal_type != LiteralType::Uri),
            ),
            Predicate::Regex {
                text,
                pattern,
                flags,
                compiled,
            } => {
                let text = text.eval(dict).text(dict);
                let matched = match compiled {
                    Some(re) => re.is_match(&text),
                    None => {
                        let pattern = pattern.eval(dict).text(dict);
                        let flags = flags
                            .as_ref()
                            .map(|f| f.eval(dict).text(dict))
                            .unwrap_or_default();
                        match build_regex(&pattern, &flags) {
                            Ok(re) => re.is_match(&text),
                            Err(e) => {
                                log::warn!("invalid regular expression '{}': {}", pattern, e);
                                false
                            }
                        }
                    }
                };
                Value::Boolean(matched)
            }
            Predicate::In { probe, values } => {
                let probe = probe.eval(dict);
                Value::Boolean(
                    values
                        .iter()
                        .any(|v| values_equal(&probe, &v.eval(dict), dict)),
                )
            }
        }
    }

    /// Render for plan output
    pub fn print(&self, out: &dyn PlanPrinter) -> String {
        match self {
            Predicate::Or(l, r) => print_binary(out, "||", l, r),
            Predicate::And(l, r) => print_binary(out, "&&", l, r),
            Predicate::Equal(l, r) => print_binary(out, "==", l, r),
            Predicate::NotEqual(l, r) => print_binary(out, "!=", l, r),
            Predicate::Less(l, r) => print_binary(out, "<", l, r),
            Predicate::LessOrEqual(l, r) => print_binary(out, "<=", l, r),
            Predicate::Plus(l, r) => print_binary(out, "+", l, r),
            Predicate::Minus(l, r) => print_binary(out, "-", l, r),
            Predicate::Mul(l, r) => print_binary(out, "*", l, r),
            Predicate::Div(l, r) => print_binary(out, "/", l, r),
            Predicate::Not(input) => format!("!{}", input.print(out)),
            Predicate::Neg(input) => format!("-{}", input.print(out)),
            Predicate::Null => "NULL".to_string(),
            Predicate::False => "false".to_string(),
            Predicate::Variable(reg) => out.format_register(reg),
            Predicate::Constant(id) => out.format_value(*id),
            Predicate::TemporaryLiteral(text) => format!("\"{}\"", text),
            Predicate::TemporaryIri(text) => format!("<{}>", text),
            Predicate::FunctionCall { iri, args } => {
                let args: Vec<&Predicate> = args.iter().collect();
                print_call(out, &format!("<{}>", iri), &args)
            }
            Predicate::Str(input) => print_call(out, "str", &[&**input]),
            Predicate::Lang(input) => print_call(out, "lang", &[&**input]),
            Predicate::LangMatches(l, r) => print_call(out, "langMatches", &[&**l, &**r]),
            Predicate::Datatype(input) => print_call(out, "datatype", &[&**input]),
            Predicate::Bound(input) => print_call(out, "bound", &[&**input]),
            Predicate::SameTerm(l, r) => print_call(out, "sameTerm", &[&**l, &**r]),
            Predicate::IsIri(input) => print_call(out, "isIRI", &[&**input]),
            Predicate::IsBlank(input) => print_call(out, "isBlank", &[&**input]),
            Predicate::IsLiteral(input) => print_call(out, "isLiteral", &[&**input]),
            Predicate::Regex {
                text,
                pattern,
                flags,
                ..
            } => match flags {
                Some(f) => print_call(out, "regex", &[&**text, &**pattern, &**f]),
                None => print_call(out, "regex", &[&**text, &**pattern]),
            },
            Predicate::In { probe, values } => {
                let mut args: Vec<&Predicate> = vec![&**probe];
                args.extend(values.iter());
                print_call(out, "in", &args)
            }
        }
    }
}

fn print_binary(out: &dyn PlanPrinter, op: &str, l: &Predicate, r: &Predicate) -> String {
    format!("({}){}({})", l.print(out), op, r.print(out))
}

fn print_call(out: &dyn PlanPrinter, name: &str, args: &[&Predicate]) -> String {
    let args: Vec<String> = args.iter().map(|a| a.print(out)).collect();
    format!("{}({})", name, args.join(","))
}

fn number_value(v: f64) -> Value {
    Value::Term(Literal::new(format!("{}", v), LiteralType::Double, 0))
}

fn arithmetic(
    l: &Predicate,
    r: &Predicate,
    dict: &DictionaryHandle,
    op: fn(f64, f64) -> f64,
) -> Value {
    number_value(op(l.eval(dict).number(dict), r.eval(dict).number(dict)))
}

/// Passes tuples for which the predicate holds
pub struct Selection {
    input: BoxedOperator,
    predicate: Predicate,
    dictionary: DictionaryHandle,
    expected: f64,
    observed: u64,
}

impl Selection {
    pub fn new(
        input: BoxedOperator,
        predicate: Predicate,
        dictionary: DictionaryHandle,
        expected: f64,
    ) -> Self {
        Self {
            input,
            predicate,
            dictionary,
            expected,
            observed: 0,
        }
    }

    fn skip_rejected(&mut self, mut count: u32) -> u32 {
        while count != 0 && !self.predicate.check(&self.dictionary) {
            count = self.input.next();
        }
        self.observed += count as u64;
        count
    }
}

impl Operator for Selection {
    fn first(&mut self) -> u32 {
        self.observed = 0;
        let count = self.input.first();
        self.skip_rejected(count)
    }

    fn next(&mut self) -> u32 {
        let count = self.input.next();
        self.skip_rejected(count)
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("Selection", self.expected, self.observed);
        let text = self.predicate.print(out);
        out.add_generic_annotation(&text);
        self.input.print(out);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, reg1: &RegisterRef, reg2: &RegisterRef) {
        self.input.add_merge_hint(reg1, reg2);
    }

    fn async_input_candidates(&mut self, scheduler: &mut Scheduler) {
        self.input.async_input_candidates(scheduler);
    }

    fn expected_cardinality(&self) -> f64 {
        self.expected
    }

    fn observed_cardinality(&self) -> u64 {
        self.observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::testing::{drain, reg, ValuesScan};
    use crate::storage::{Database, MemoryDatabase};
    use std::sync::Arc;

    struct Fixture {
        db: Arc<MemoryDatabase>,
        dict: DictionaryHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Arc::new(MemoryDatabase::new());
            let database: Arc<dyn Database> = db.clone();
            Self {
                db,
                dict: DictionaryHandle::new(database, None),
            }
        }

        fn intern(&self, text: &str, literal_type: LiteralType, sub_type: u32) -> u32 {
            self.db
                .memory_dictionary()
                .intern(Literal::new(text, literal_type, sub_type))
        }
    }

    fn var(r: &RegisterRef) -> Box<Predicate> {
        Box::new(Predicate::Variable(r.clone()))
    }

    fn lit(text: &str) -> Box<Predicate> {
        Box::new(Predicate::TemporaryLiteral(text.to_string()))
    }

    #[test]
    fn test_numeric_and_string_comparison() {
        let f = Fixture::new();
        let x = reg(0);
        let nine = f.intern("9", LiteralType::Integer, 0);
        x.set(nine);

        // numerically 9 < 10, as text "9" > "10"
        assert!(Predicate::Less(var(&x), lit("10")).check(&f.dict));
        assert!(!Predicate::Less(lit("b"), lit("a")).check(&f.dict));
        assert!(Predicate::LessOrEqual(lit("a"), lit("a")).check(&f.dict));
        assert!(Predicate::Equal(var(&x), lit("9.0")).check(&f.dict));
        assert!(!Predicate::Equal(lit("9"), lit("9.0")).check(&f.dict));
        assert!(Predicate::NotEqual(var(&x), lit("8")).check(&f.dict));
    }

    #[test]
    fn test_dates_compare_as_dates() {
        let f = Fixture::new();
        assert!(Predicate::Less(lit("2009-02-01"), lit("2010-01-01")).check(&f.dict));
        assert!(Predicate::Equal(lit("2010-01-01"), lit("2010-01-01")).check(&f.dict));
        assert!(!Predicate::Less(lit("2010-01-02"), lit("2010-01-01")).check(&f.dict));
    }

    #[test]
    fn test_arithmetic() {
        let f = Fixture::new();
        let sum = Predicate::Plus(lit("2"), lit("3.5"));
        assert!(Predicate::Equal(Box::new(sum), lit("5.5")).check(&f.dict));
        let neg = Predicate::Neg(lit("4"));
        assert!(Predicate::Less(Box::new(neg), lit("0")).check(&f.dict));
    }

    #[test]
    fn test_builtins() {
        let f = Fixture::new();
        let en = f.intern("en-GB", LiteralType::Literal, 0);
        let hello = f.intern("hello", LiteralType::CustomLanguage, en);
        let iri = f.intern("http://example.org/a", LiteralType::Uri, 0);
        let blank = f.intern("_:b1", LiteralType::Uri, 0);
        let x = reg(0);

        x.set(hello);
        assert!(Predicate::LangMatches(Box::new(Predicate::Lang(var(&x))), lit("en")).check(&f.dict));
        assert!(Predicate::LangMatches(Box::new(Predicate::Lang(var(&x))), lit("*")).check(&f.dict));
        assert!(!Predicate::LangMatches(Box::new(Predicate::Lang(var(&x))), lit("de")).check(&f.dict));
        assert!(Predicate::IsLiteral(var(&x)).check(&f.dict));
        assert!(Predicate::Equal(Box::new(Predicate::Str(var(&x))), lit("hello")).check(&f.dict));

        x.set(iri);
        assert!(Predicate::IsIri(var(&x)).check(&f.dict));
        assert!(!Predicate::IsBlank(var(&x)).check(&f.dict));
        x.set(blank);
        assert!(Predicate::IsBlank(var(&x)).check(&f.dict));

        x.set(NULL_ID);
        assert!(!Predicate::Bound(var(&x)).check(&f.dict));
        assert!(!Predicate::IsIri(var(&x)).check(&f.dict));
        assert!(!Predicate::IsLiteral(var(&x)).check(&f.dict));
    }

    #[test]
    fn test_datatype_and_same_term() {
        let f = Fixture::new();
        let five = f.intern("5", LiteralType::Integer, 0);
        let other_five = f.intern("5", LiteralType::Literal, 0);
        let x = reg(0);
        x.set(five);
        let datatype = Predicate::Datatype(var(&x));
        assert!(Predicate::Equal(
            Box::new(datatype),
            Box::new(Predicate::TemporaryIri(
                "http://www.w3.org/2001/XMLSchema#integer".to_string()
            ))
        )
        .check(&f.dict));
        assert!(!Predicate::SameTerm(var(&x), Box::new(Predicate::Constant(other_five))).check(&f.dict));
        assert!(Predicate::SameTerm(var(&x), Box::new(Predicate::Constant(five))).check(&f.dict));
    }

    #[test]
    fn test_regex_and_in() {
        let f = Fixture::new();
        let x = reg(0);
        x.set(f.intern("Hello World", LiteralType::Literal, 0));
        let re = Predicate::regex(
            Predicate::Variable(x.clone()),
            Predicate::TemporaryLiteral("^hello".into()),
            Some(Predicate::TemporaryLiteral("i".into())),
        )
        .unwrap();
        assert!(re.check(&f.dict));
        assert!(Predicate::regex(
            Predicate::Variable(x.clone()),
            Predicate::TemporaryLiteral("(".into()),
            None
        )
        .is_err());

        let a = f.intern("a", LiteralType::Uri, 0);
        let y = reg(1);
        y.set(a);
        let within = Predicate::In {
            probe: var(&y),
            values: vec![Predicate::Constant(a + 100), Predicate::Constant(a)],
        };
        assert!(within.check(&f.dict));
    }

    #[test]
    fn test_selection_operator() {
        let f = Fixture::new();
        let (x, y) = (reg(0), reg(1));
        let rows: &[&[u32]] = &[&[1, 1], &[1, 2], &[3, 3]];
        let mut op = Selection::new(
            Box::new(ValuesScan::ones(&[x.clone(), y.clone()], rows)),
            Predicate::Equal(var(&x), var(&y)),
            f.dict.clone(),
            1.0,
        );
        assert_eq!(drain(&mut op, &[x, y]), vec![(vec![1, 1], 1), (vec![3, 3], 1)]);
        assert_eq!(op.observed_cardinality(), 2);
    }
}
