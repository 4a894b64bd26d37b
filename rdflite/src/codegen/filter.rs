// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Filter expressions to predicates

use super::{Bindings, TranslationError};
use crate::plan::FilterExpr;
use crate::operator::Predicate;
use crate::runtime::RegisterRef;

/// A filter that fits a value-set [`Filter`](crate::operator::Filter)
#[derive(Debug)]
pub(crate) struct ValueFilter {
    pub(crate) register: RegisterRef,
    pub(crate) values: Vec<u32>,
    pub(crate) exclude: bool,
}

/// `var = c`, `var != c` and `var IN (c, ...)` over a bound variable
///
/// Constants missing from the dictionary match nothing, so they are dropped
/// from the value set.
pub(crate) fn value_filter(filter: &FilterExpr, bindings: &Bindings) -> Option<ValueFilter> {
    let bound = |expr: &FilterExpr| match expr {
        FilterExpr::Variable(v) => bindings.get(v).cloned(),
        _ => None,
    };

    match filter {
        FilterExpr::Equal(l, r) | FilterExpr::NotEqual(l, r) => {
            let exclude = matches!(filter, FilterExpr::NotEqual(..));
            let (register, constant) = match (bound(l), bound(r)) {
                (Some(reg), _) if r.is_constant() => (reg, r),
                (_, Some(reg)) if l.is_constant() => (reg, l),
                _ => return None,
            };
            Some(ValueFilter {
                register,
                values: constant.constant_id().into_iter().collect(),
                exclude,
            })
        }
        FilterExpr::In { probe, values } => {
            let register = bound(probe)?;
            if !values.iter().all(FilterExpr::is_constant) {
                return None;
            }
            Some(ValueFilter {
                register,
                values: values.iter().filter_map(FilterExpr::constant_id).collect(),
                exclude: false,
            })
        }
        _ => None,
    }
}

fn boxed(
    make: fn(Box<Predicate>, Box<Predicate>) -> Predicate,
    left: &FilterExpr,
    right: &FilterExpr,
    bindings: &Bindings,
) -> Result<Predicate, TranslationError> {
    Ok(make(
        Box::new(build_predicate(left, bindings)?),
        Box::new(build_predicate(right, bindings)?),
    ))
}

fn unary(
    make: fn(Box<Predicate>) -> Predicate,
    input: &FilterExpr,
    bindings: &Bindings,
) -> Result<Predicate, TranslationError> {
    Ok(make(Box::new(build_predicate(input, bindings)?)))
}

/// Regex patterns and flags given as literals are passed as text so the
/// expression compiles once
fn regex_argument(expr: &FilterExpr, bindings: &Bindings) -> Result<Predicate, TranslationError> {
    match expr {
        FilterExpr::Literal { value, .. } => Ok(Predicate::TemporaryLiteral(value.clone())),
        other => build_predicate(other, bindings),
    }
}

/// Generic predicate over the registers in `bindings`; variables without a
/// binding evaluate to NULL
pub(crate) fn build_predicate(
    filter: &FilterExpr,
    bindings: &Bindings,
) -> Result<Predicate, TranslationError> {
    use FilterExpr as F;
    Ok(match filter {
        F::Or(l, r) => boxed(Predicate::Or, l, r, bindings)?,
        F::And(l, r) => boxed(Predicate::And, l, r, bindings)?,
        F::Equal(l, r) => boxed(Predicate::Equal, l, r, bindings)?,
        F::NotEqual(l, r) => boxed(Predicate::NotEqual, l, r, bindings)?,
        F::Less(l, r) => boxed(Predicate::Less, l, r, bindings)?,
        F::LessOrEqual(l, r) => boxed(Predicate::LessOrEqual, l, r, bindings)?,
        // a > b is b < a
        F::Greater(l, r) => boxed(Predicate::Less, r, l, bindings)?,
        F::GreaterOrEqual(l, r) => boxed(Predicate::LessOrEqual, r, l, bindings)?,
        F::Plus(l, r) => boxed(Predicate::Plus, l, r, bindings)?,
        F::Minus(l, r) => boxed(Predicate::Minus, l, r, bindings)?,
        F::Mul(l, r) => boxed(Predicate::Mul, l, r, bindings)?,
        F::Div(l, r) => boxed(Predicate::Div, l, r, bindings)?,
        F::Not(input) => unary(Predicate::Not, input, bindings)?,
        F::UnaryPlus(input) => build_predicate(input, bindings)?,
        F::UnaryMinus(input) => unary(Predicate::Neg, input, bindings)?,
        F::Literal { id: Some(id), .. } | F::Iri { id: Some(id), .. } => Predicate::Constant(*id),
        F::Literal { id: None, value } => Predicate::TemporaryLiteral(value.clone()),
        F::Iri { id: None, value } => Predicate::TemporaryIri(value.clone()),
        F::Variable(var) => match bindings.get(var) {
            Some(reg) => Predicate::Variable(reg.clone()),
            None => Predicate::Null,
        },
        F::Null => Predicate::Null,
        F::Function { iri, args } => {
            if iri.is_empty() {
                return Err(TranslationError::MalformedFilter(
                    "function call without an IRI".to_string(),
                ));
            }
            Predicate::FunctionCall {
                iri: iri.clone(),
                args: args
                    .iter()
                    .map(|arg| build_predicate(arg, bindings))
                    .collect::<Result<_, _>>()?,
            }
        }
        F::Str(input) => unary(Predicate::Str, input, bindings)?,
        F::Lang(input) => unary(Predicate::Lang, input, bindings)?,
        F::LangMatches(l, r) => boxed(Predicate::LangMatches, l, r, bindings)?,
        F::Datatype(input) => unary(Predicate::Datatype, input, bindings)?,
        F::Bound(input) => unary(Predicate::Bound, input, bindings)?,
        F::SameTerm(l, r) => boxed(Predicate::SameTerm, l, r, bindings)?,
        F::IsIri(input) => unary(Predicate::IsIri, input, bindings)?,
        F::IsBlank(input) => unary(Predicate::IsBlank, input, bindings)?,
        F::IsLiteral(input) => unary(Predicate::IsLiteral, input, bindings)?,
        F::Regex {
            text,
            pattern,
            flags,
        } => {
            let flags = match flags {
                Some(flags) => Some(regex_argument(flags, bindings)?),
                None => None,
            };
            Predicate::regex(
                build_predicate(text, bindings)?,
                regex_argument(pattern, bindings)?,
                flags,
            )
            .map_err(|e| TranslationError::MalformedFilter(format!("regex: {}", e)))?
        }
        F::In { probe, values } => Predicate::In {
            probe: Box::new(build_predicate(probe, bindings)?),
            values: values
                .iter()
                .map(|value| build_predicate(value, bindings))
                .collect::<Result<_, _>>()?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::testing::reg;

    fn bindings() -> Bindings {
        [(1, reg(0)), (2, reg(1))].into_iter().collect()
    }

    #[test]
    fn test_value_filter_forms() {
        let b = bindings();
        let eq = value_filter(
            &FilterExpr::equal(FilterExpr::literal(Some(7), "x"), FilterExpr::variable(1)),
            &b,
        )
        .unwrap();
        assert_eq!((eq.values.clone(), eq.exclude, eq.register.slot()), (vec![7], false, 0));

        let ne = value_filter(
            &FilterExpr::not_equal(FilterExpr::variable(2), FilterExpr::iri(None, "http://x")),
            &b,
        )
        .unwrap();
        assert!(ne.exclude);
        assert!(ne.values.is_empty());

        let list = FilterExpr::In {
            probe: Box::new(FilterExpr::variable(1)),
            values: vec![FilterExpr::literal(Some(3), "a"), FilterExpr::literal(None, "b")],
        };
        assert_eq!(value_filter(&list, &b).unwrap().values, vec![3]);

        // unbound variable or non-constant operand
        let unbound = FilterExpr::equal(FilterExpr::variable(9), FilterExpr::literal(Some(1), "y"));
        assert!(value_filter(&unbound, &b).is_none());
        let vars = FilterExpr::equal(FilterExpr::variable(1), FilterExpr::variable(2));
        assert!(value_filter(&vars, &b).is_none());
    }

    #[test]
    fn test_greater_swaps_operands() {
        let p = build_predicate(
            &FilterExpr::Greater(
                Box::new(FilterExpr::variable(1)),
                Box::new(FilterExpr::literal(Some(5), "5")),
            ),
            &bindings(),
        )
        .unwrap();
        match p {
            Predicate::Less(l, r) => {
                assert!(matches!(*l, Predicate::Constant(5)));
                assert!(matches!(*r, Predicate::Variable(_)));
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_invalid_regex_is_malformed() {
        let filter = FilterExpr::Regex {
            text: Box::new(FilterExpr::variable(1)),
            pattern: Box::new(FilterExpr::literal(Some(4), "(unclosed")),
            flags: None,
        };
        assert!(matches!(
            build_predicate(&filter, &bindings()),
            Err(TranslationError::MalformedFilter(_))
        ));
    }

    #[test]
    fn test_unbound_variable_is_null() {
        let p = build_predicate(&FilterExpr::Bound(Box::new(FilterExpr::variable(8))), &bindings())
            .unwrap();
        assert!(matches!(p, Predicate::Bound(inner) if matches!(*inner, Predicate::Null)));
    }
}
