// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query graph handed over by the front end
//!
//! A query is a tree of subqueries: triple patterns, filters, table function
//! calls, optional parts and unions. Variables are plain numbers; constants
//! are dictionary ids resolved by the front end.

use crate::operator::results::DuplicateMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a query variable
pub type VariableId = u32;

/// Subject, predicate or object of a triple pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternSlot {
    /// A dictionary id
    Constant(u32),
    Variable(VariableId),
}

impl PatternSlot {
    pub fn variable(&self) -> Option<VariableId> {
        match self {
            PatternSlot::Variable(v) => Some(*v),
            PatternSlot::Constant(_) => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, PatternSlot::Constant(_))
    }
}

/// A triple pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub subject: PatternSlot,
    pub predicate: PatternSlot,
    pub object: PatternSlot,
}

impl Node {
    pub fn new(subject: PatternSlot, predicate: PatternSlot, object: PatternSlot) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Slot by position: 0 subject, 1 predicate, 2 object
    pub fn slot(&self, position: usize) -> PatternSlot {
        match position {
            0 => self.subject,
            1 => self.predicate,
            _ => self.object,
        }
    }

    pub fn slots(&self) -> [PatternSlot; 3] {
        [self.subject, self.predicate, self.object]
    }

    /// Do both patterns share a variable?
    pub fn can_join(&self, other: &Node) -> bool {
        self.slots().iter().filter_map(|s| s.variable()).any(|v| {
            other
                .slots()
                .iter()
                .any(|o| o.variable() == Some(v))
        })
    }
}

/// Filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    Or(Box<FilterExpr>, Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Equal(Box<FilterExpr>, Box<FilterExpr>),
    NotEqual(Box<FilterExpr>, Box<FilterExpr>),
    Less(Box<FilterExpr>, Box<FilterExpr>),
    LessOrEqual(Box<FilterExpr>, Box<FilterExpr>),
    Greater(Box<FilterExpr>, Box<FilterExpr>),
    GreaterOrEqual(Box<FilterExpr>, Box<FilterExpr>),
    Plus(Box<FilterExpr>, Box<FilterExpr>),
    Minus(Box<FilterExpr>, Box<FilterExpr>),
    Mul(Box<FilterExpr>, Box<FilterExpr>),
    Div(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    UnaryPlus(Box<FilterExpr>),
    UnaryMinus(Box<FilterExpr>),
    /// A literal; `id` is `None` when the dictionary does not know it
    Literal { id: Option<u32>, value: String },
    /// An IRI; `id` is `None` when the dictionary does not know it
    Iri { id: Option<u32>, value: String },
    Variable(VariableId),
    Null,
    Function { iri: String, args: Vec<FilterExpr> },
    Str(Box<FilterExpr>),
    Lang(Box<FilterExpr>),
    LangMatches(Box<FilterExpr>, Box<FilterExpr>),
    Datatype(Box<FilterExpr>),
    Bound(Box<FilterExpr>),
    SameTerm(Box<FilterExpr>, Box<FilterExpr>),
    IsIri(Box<FilterExpr>),
    IsBlank(Box<FilterExpr>),
    IsLiteral(Box<FilterExpr>),
    Regex {
        text: Box<FilterExpr>,
        pattern: Box<FilterExpr>,
        flags: Option<Box<FilterExpr>>,
    },
    In {
        probe: Box<FilterExpr>,
        values: Vec<FilterExpr>,
    },
}

impl FilterExpr {
    pub fn variable(id: VariableId) -> Self {
        FilterExpr::Variable(id)
    }

    pub fn literal(id: Option<u32>, value: impl Into<String>) -> Self {
        FilterExpr::Literal {
            id,
            value: value.into(),
        }
    }

    pub fn iri(id: Option<u32>, value: impl Into<String>) -> Self {
        FilterExpr::Iri {
            id,
            value: value.into(),
        }
    }

    pub fn equal(left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::Equal(Box::new(left), Box::new(right))
    }

    pub fn not_equal(left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::NotEqual(Box::new(left), Box::new(right))
    }

    pub fn less(left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::Less(Box::new(left), Box::new(right))
    }

    pub fn and(left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::And(Box::new(left), Box::new(right))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, FilterExpr::Literal { .. } | FilterExpr::Iri { .. })
    }

    /// Dictionary id of a constant
    pub fn constant_id(&self) -> Option<u32> {
        match self {
            FilterExpr::Literal { id, .. } | FilterExpr::Iri { id, .. } => *id,
            _ => None,
        }
    }

    /// Direct children
    fn children(&self) -> Vec<&FilterExpr> {
        use FilterExpr::*;
        match self {
            Or(a, b) | And(a, b) | Equal(a, b) | NotEqual(a, b) | Less(a, b)
            | LessOrEqual(a, b) | Greater(a, b) | GreaterOrEqual(a, b) | Plus(a, b)
            | Minus(a, b) | Mul(a, b) | Div(a, b) | LangMatches(a, b) | SameTerm(a, b) => {
                vec![a.as_ref(), b.as_ref()]
            }
            Not(a) | UnaryPlus(a) | UnaryMinus(a) | Str(a) | Lang(a) | Datatype(a) | Bound(a)
            | IsIri(a) | IsBlank(a) | IsLiteral(a) => vec![a.as_ref()],
            Literal { .. } | Iri { .. } | Variable(_) | Null => Vec::new(),
            Function { args, .. } => args.iter().collect(),
            Regex {
                text,
                pattern,
                flags,
            } => {
                let mut c = vec![text.as_ref(), pattern.as_ref()];
                if let Some(f) = flags {
                    c.push(f.as_ref());
                }
                c
            }
            In { probe, values } => std::iter::once(probe.as_ref()).chain(values.iter()).collect(),
        }
    }

    /// Every variable mentioned
    pub fn collect_variables(&self, variables: &mut BTreeSet<VariableId>) {
        if let FilterExpr::Variable(v) = self {
            variables.insert(*v);
        }
        for child in self.children() {
            child.collect_variables(variables);
        }
    }

    /// Can the filter be evaluated with `variables` available?
    pub fn is_applicable(&self, variables: &BTreeSet<VariableId>) -> bool {
        let mut used = BTreeSet::new();
        self.collect_variables(&mut used);
        used.is_subset(variables)
    }
}

/// Argument of a table function call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableFunctionArgument {
    Variable(VariableId),
    Value(String),
}

/// Call of a host table function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFunctionCall {
    pub name: String,
    pub input: Vec<TableFunctionArgument>,
    pub output: Vec<VariableId>,
}

/// A group of patterns with its filters and nested parts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    pub nodes: Vec<Node>,
    pub filters: Vec<FilterExpr>,
    pub optional: Vec<SubQuery>,
    pub unions: Vec<Vec<SubQuery>>,
    pub table_functions: Vec<TableFunctionCall>,
}

impl SubQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_optional(mut self, optional: SubQuery) -> Self {
        self.optional.push(optional);
        self
    }

    pub fn with_union(mut self, branches: Vec<SubQuery>) -> Self {
        self.unions.push(branches);
        self
    }

    pub fn with_table_function(mut self, call: TableFunctionCall) -> Self {
        self.table_functions.push(call);
        self
    }
}

/// Duplicate handling requested by the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicateHandling {
    #[default]
    All,
    Count,
    Reduced,
    NoDuplicates,
    Show,
}

impl From<DuplicateHandling> for DuplicateMode {
    fn from(handling: DuplicateHandling) -> Self {
        match handling {
            DuplicateHandling::All => DuplicateMode::Expand,
            DuplicateHandling::Count => DuplicateMode::Count,
            DuplicateHandling::Reduced | DuplicateHandling::NoDuplicates => DuplicateMode::Reduce,
            DuplicateHandling::Show => DuplicateMode::ShowOnlyDuplicates,
        }
    }
}

/// ORDER BY entry; `variable == None` orders by multiplicity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub variable: Option<VariableId>,
    pub descending: bool,
}

/// Identifies a triple pattern or table function in allocation order
///
/// Patterns and calls are numbered by a depth-first walk: a subquery's own
/// items first, then its optional parts, then its union branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// A whole query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryGraph {
    query: SubQuery,
    projection: Vec<VariableId>,
    names: BTreeMap<VariableId, String>,
    duplicate_handling: DuplicateHandling,
    order: Vec<OrderBy>,
    limit: Option<usize>,
    known_empty: bool,
}

impl QueryGraph {
    pub fn new(query: SubQuery) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    pub fn query(&self) -> &SubQuery {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut SubQuery {
        &mut self.query
    }

    pub fn add_projection(&mut self, variable: VariableId) {
        self.projection.push(variable);
    }

    /// Project a variable under a column name
    pub fn add_named_projection(&mut self, variable: VariableId, name: impl Into<String>) {
        self.projection.push(variable);
        self.names.insert(variable, name.into());
    }

    pub fn projection(&self) -> &[VariableId] {
        &self.projection
    }

    /// Column name of a variable, `?<id>` when none was given
    pub fn column_name(&self, variable: VariableId) -> String {
        self.names
            .get(&variable)
            .cloned()
            .unwrap_or_else(|| format!("?{}", variable))
    }

    pub fn set_duplicate_handling(&mut self, handling: DuplicateHandling) {
        self.duplicate_handling = handling;
    }

    pub fn duplicate_handling(&self) -> DuplicateHandling {
        self.duplicate_handling
    }

    pub fn add_order(&mut self, order: OrderBy) {
        self.order.push(order);
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn mark_known_empty(&mut self) {
        self.known_empty = true;
    }

    pub fn known_empty(&self) -> bool {
        self.known_empty
    }

    /// Every triple pattern in allocation order
    pub fn patterns(&self) -> Vec<&Node> {
        fn walk<'a>(query: &'a SubQuery, out: &mut Vec<&'a Node>) {
            out.extend(query.nodes.iter());
            for optional in &query.optional {
                walk(optional, out);
            }
            for branch in query.unions.iter().flatten() {
                walk(branch, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.query, &mut out);
        out
    }

    /// Every table function call in allocation order
    pub fn table_function_calls(&self) -> Vec<&TableFunctionCall> {
        fn walk<'a>(query: &'a SubQuery, out: &mut Vec<&'a TableFunctionCall>) {
            out.extend(query.table_functions.iter());
            for optional in &query.optional {
                walk(optional, out);
            }
            for branch in query.unions.iter().flatten() {
                walk(branch, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.query, &mut out);
        out
    }

    pub fn pattern(&self, id: NodeId) -> Option<&Node> {
        self.patterns().get(id.0).copied()
    }

    pub fn table_function_call(&self, id: NodeId) -> Option<&TableFunctionCall> {
        self.table_function_calls().get(id.0).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(v: VariableId) -> PatternSlot {
        PatternSlot::Variable(v)
    }

    #[test]
    fn test_can_join() {
        let a = Node::new(var(0), PatternSlot::Constant(5), var(1));
        let b = Node::new(var(1), PatternSlot::Constant(6), var(2));
        let c = Node::new(var(3), PatternSlot::Constant(5), PatternSlot::Constant(1));
        assert!(a.can_join(&b));
        assert!(!a.can_join(&c));
    }

    #[test]
    fn test_filter_variables() {
        let f = FilterExpr::and(
            FilterExpr::equal(FilterExpr::variable(1), FilterExpr::literal(Some(4), "x")),
            FilterExpr::In {
                probe: Box::new(FilterExpr::variable(2)),
                values: vec![FilterExpr::variable(3)],
            },
        );
        let mut vars = BTreeSet::new();
        f.collect_variables(&mut vars);
        assert_eq!(vars.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(f.is_applicable(&[1, 2, 3, 4].into_iter().collect()));
        assert!(!f.is_applicable(&[1, 2].into_iter().collect()));
    }

    #[test]
    fn test_allocation_order_walks_nested_parts() {
        let p = |s| Node::new(PatternSlot::Constant(s), var(0), var(1));
        let query = SubQuery::new()
            .with_node(p(1))
            .with_optional(SubQuery::new().with_node(p(2)))
            .with_union(vec![
                SubQuery::new().with_node(p(3)),
                SubQuery::new().with_node(p(4)),
            ])
            .with_node(p(5));
        let graph = QueryGraph::new(query);
        let subjects: Vec<PatternSlot> = graph.patterns().iter().map(|n| n.subject).collect();
        assert_eq!(
            subjects,
            [1, 5, 2, 3, 4].iter().map(|s| PatternSlot::Constant(*s)).collect::<Vec<_>>()
        );
        assert_eq!(graph.pattern(NodeId(2)).map(|n| n.subject), Some(PatternSlot::Constant(2)));
        assert!(graph.pattern(NodeId(9)).is_none());
    }

    #[test]
    fn test_duplicate_mapping() {
        assert_eq!(DuplicateMode::from(DuplicateHandling::NoDuplicates), DuplicateMode::Reduce);
        assert_eq!(DuplicateMode::from(DuplicateHandling::Show), DuplicateMode::ShowOnlyDuplicates);
        assert_eq!(DuplicateMode::from(DuplicateHandling::All), DuplicateMode::Expand);
    }
}
