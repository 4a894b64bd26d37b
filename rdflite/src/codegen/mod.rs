// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan to operator translation
//!
//! [`CodeGen`] walks an optimizer [`Plan`] once and builds the executable
//! operator tree below a [`ResultsCollector`]. While walking it carries
//!
//! - a context: variables bound by an enclosing scope,
//! - a projection: variables the caller still needs,
//! - the bindings of the current subtree: variable to output register.
//!
//! Registers and shared domains are laid out up front by
//! [`registers::RegisterLayout`].

mod filter;
mod registers;

use crate::operator::{
    BoxedOperator, DifferentialScan, EmptyScan, Filter, FunctionArgument, HashGroupify, HashJoin,
    HashOptional, IndexScan, MergeJoin, MergeUnion, NestedLoopJoin, Operator, Predicate,
    ResultsCollector, ScanKind, Selection, SingletonScan, Sort, TableFunction, Union,
};
use crate::plan::{
    FilterExpr, Node, NodeId, PatternSlot, Plan, PlanNode, QueryGraph, TableFunctionArgument,
    TableFunctionCall, VariableId,
};
use crate::runtime::{same_register, DictionaryHandle, Register, RegisterRef, Runtime};
use crate::storage::DataOrder;
use filter::{build_predicate, value_filter};
use registers::RegisterLayout;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Variable to register
pub(crate) type Bindings = BTreeMap<VariableId, RegisterRef>;

type Projection = BTreeSet<VariableId>;

/// Semantic errors found while translating a plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Unknown pattern: {0}")]
    UnknownNode(usize),

    #[error("Unknown table function call: {0}")]
    UnknownTableFunction(usize),

    #[error("Argument ?{variable} of table function '{function}' is not bound")]
    UnboundArgument {
        function: String,
        variable: VariableId,
    },

    #[error("Malformed filter: {0}")]
    MalformedFilter(String),

    #[error("Arity mismatch: {0}")]
    ArityMismatch(String),

    #[error("Missing join variable: {0}")]
    MissingJoinVariable(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
}

/// The plan translator
pub struct CodeGen;

impl CodeGen {
    /// Translate a plan into an executable tree
    ///
    /// Semantic errors are logged and produce a tree with an empty result.
    /// `plan == None` stands for a query without patterns, which yields one
    /// row of unbound values.
    pub fn translate(
        runtime: &mut Runtime,
        query: &QueryGraph,
        plan: Option<&Plan>,
    ) -> ResultsCollector {
        match Self::try_translate(runtime, query, plan) {
            Ok(root) => root,
            Err(e) => {
                log::warn!("translation failed, query yields no rows: {}", e);
                Self::empty_result(runtime, query)
            }
        }
    }

    /// Like [`CodeGen::translate`], handing semantic errors to the caller
    pub fn try_translate(
        runtime: &mut Runtime,
        query: &QueryGraph,
        plan: Option<&Plan>,
    ) -> Result<ResultsCollector, TranslationError> {
        check_table_function_arities(query)?;

        let layout = RegisterLayout::new(query);
        layout.install(runtime);
        let runtime: &Runtime = runtime;
        let unbound = runtime
            .register(layout.count())
            .cloned()
            .ok_or_else(|| TranslationError::InvalidPlan("register array too small".into()))?;

        let translator = Translator {
            runtime,
            patterns: query.patterns(),
            calls: query.table_function_calls(),
            layout: &layout,
            dictionary: runtime.dictionary(),
            table_size: runtime.config().hash_table_size(),
        };

        let mut bindings = Bindings::new();
        let tree: BoxedOperator = if query.known_empty() {
            Box::new(EmptyScan::new())
        } else if let Some(plan) = plan {
            let mut projection: Projection = query.projection().iter().copied().collect();
            projection.extend(query.order().iter().filter_map(|o| o.variable));

            let context = Bindings::new();
            let mut tree = translator.translate_plan(&context, &projection, &mut bindings, plan)?;

            if !query.order().is_empty() {
                let lookup = |var: VariableId| {
                    bindings.get(&var).cloned().unwrap_or_else(|| unbound.clone())
                };
                let values: Vec<RegisterRef> = projection.iter().map(|v| lookup(*v)).collect();
                let order: Vec<(Option<RegisterRef>, bool)> = query
                    .order()
                    .iter()
                    .map(|o| (o.variable.map(&lookup), o.descending))
                    .collect();
                let expected = tree.expected_cardinality();
                tree = Box::new(Sort::new(
                    tree,
                    values,
                    &order,
                    translator.dictionary.clone(),
                    expected,
                ));
            }
            tree
        } else {
            Box::new(SingletonScan::new())
        };

        let output = query
            .projection()
            .iter()
            .map(|var| bindings.get(var).cloned().unwrap_or_else(|| unbound.clone()))
            .collect();
        Ok(Self::collector(query, tree, output))
    }

    fn collector(
        query: &QueryGraph,
        tree: BoxedOperator,
        output: Vec<RegisterRef>,
    ) -> ResultsCollector {
        let columns = query
            .projection()
            .iter()
            .map(|var| query.column_name(*var))
            .collect();
        let expected = tree.expected_cardinality();
        ResultsCollector::new(
            tree,
            output,
            columns,
            query.duplicate_handling().into(),
            query.limit(),
            expected,
        )
    }

    fn empty_result(runtime: &mut Runtime, query: &QueryGraph) -> ResultsCollector {
        if runtime.register_count() == 0 {
            runtime.allocate_registers(1);
        }
        let unbound = match runtime.registers().last() {
            Some(reg) => reg.clone(),
            None => Arc::new(Register::new(0)),
        };
        let output = vec![unbound; query.projection().len()];
        Self::collector(query, Box::new(EmptyScan::new()), output)
    }

    /// Variables produced by a plan that are not bound by `context`
    pub fn collect_variables(
        query: &QueryGraph,
        plan: &Plan,
    ) -> Result<BTreeSet<VariableId>, TranslationError> {
        let patterns = query.patterns();
        let calls = query.table_function_calls();
        let mut variables = BTreeSet::new();
        collect_variables(&patterns, &calls, &Bindings::new(), &mut variables, plan)?;
        Ok(variables)
    }
}

/// Every call of a table function must use the same output width
fn check_table_function_arities(query: &QueryGraph) -> Result<(), TranslationError> {
    let mut widths: BTreeMap<&str, usize> = BTreeMap::new();
    for call in query.table_function_calls() {
        let width = call.output.len();
        match widths.get(call.name.as_str()) {
            Some(seen) if *seen != width => {
                return Err(TranslationError::ArityMismatch(format!(
                    "table function '{}' used with {} and {} outputs",
                    call.name, seen, width
                )));
            }
            Some(_) => {}
            None => {
                widths.insert(call.name.as_str(), width);
            }
        }
    }
    Ok(())
}

fn scan_kind(node: &PlanNode) -> ScanKind {
    match node {
        PlanNode::AggregatedIndexScan { .. } => ScanKind::Aggregated,
        PlanNode::FullyAggregatedIndexScan { .. } => ScanKind::FullyAggregated,
        _ => ScanKind::Full,
    }
}

fn collect_variables(
    patterns: &[&Node],
    calls: &[&TableFunctionCall],
    context: &Bindings,
    variables: &mut BTreeSet<VariableId>,
    plan: &Plan,
) -> Result<(), TranslationError> {
    match &plan.node {
        PlanNode::IndexScan { order, pattern }
        | PlanNode::AggregatedIndexScan { order, pattern }
        | PlanNode::FullyAggregatedIndexScan { order, pattern } => {
            let node = patterns
                .get(pattern.0)
                .ok_or(TranslationError::UnknownNode(pattern.0))?;
            let unused = scan_kind(&plan.node).unused_positions(*order);
            for (position, slot) in node.slots().iter().enumerate() {
                if unused.contains(&position) {
                    continue;
                }
                if let Some(var) = slot.variable() {
                    if !context.contains_key(&var) {
                        variables.insert(var);
                    }
                }
            }
        }
        PlanNode::NestedLoopJoin { left, right }
        | PlanNode::MergeJoin { left, right, .. }
        | PlanNode::HashJoin { left, right }
        | PlanNode::Union { left, right }
        | PlanNode::MergeUnion { left, right } => {
            collect_variables(patterns, calls, context, variables, left)?;
            collect_variables(patterns, calls, context, variables, right)?;
        }
        PlanNode::HashOptional { required, optional } => {
            collect_variables(patterns, calls, context, variables, required)?;
            collect_variables(patterns, calls, context, variables, optional)?;
        }
        PlanNode::HashGroupify { input } | PlanNode::Filter { input, .. } => {
            collect_variables(patterns, calls, context, variables, input)?;
        }
        PlanNode::TableFunction { input, function } => {
            let call = calls
                .get(function.0)
                .ok_or(TranslationError::UnknownTableFunction(function.0))?;
            variables.extend(call.output.iter().copied());
            collect_variables(patterns, calls, context, variables, input)?;
        }
        PlanNode::Singleton => {}
    }
    Ok(())
}

/// Copy the projected bindings of two join inputs, `first` taking precedence
fn merge_bindings(projection: &Projection, bindings: &mut Bindings, first: &Bindings, second: &Bindings) {
    for (var, reg) in first {
        if projection.contains(var) {
            bindings.insert(*var, reg.clone());
        }
    }
    for (var, reg) in second {
        if projection.contains(var) {
            bindings.entry(*var).or_insert_with(|| reg.clone());
        }
    }
}

/// Bound registers other than the join key
fn tail(bindings: &Bindings, key: VariableId) -> Vec<RegisterRef> {
    bindings
        .iter()
        .filter(|(var, _)| **var != key)
        .map(|(_, reg)| reg.clone())
        .collect()
}

fn binding(bindings: &Bindings, var: VariableId, side: &str) -> Result<RegisterRef, TranslationError> {
    bindings.get(&var).cloned().ok_or_else(|| {
        TranslationError::InvalidPlan(format!("?{} is not bound by the {} input", var, side))
    })
}

/// Conjunction of register equalities; identical registers need no check
fn equalities(pairs: Vec<(RegisterRef, RegisterRef)>) -> Option<Predicate> {
    pairs
        .into_iter()
        .filter(|(l, r)| !same_register(l, r))
        .map(|(l, r)| Predicate::equal(Predicate::Variable(l), Predicate::Variable(r)))
        .reduce(Predicate::and)
}

struct JoinInputs {
    left: BoxedOperator,
    left_bindings: Bindings,
    right: BoxedOperator,
    right_bindings: Bindings,
}

struct Translator<'a> {
    runtime: &'a Runtime,
    patterns: Vec<&'a Node>,
    calls: Vec<&'a TableFunctionCall>,
    layout: &'a RegisterLayout,
    dictionary: DictionaryHandle,
    table_size: usize,
}

impl<'a> Translator<'a> {
    fn register(&self, slot: usize) -> Result<RegisterRef, TranslationError> {
        self.runtime
            .register(slot)
            .cloned()
            .ok_or_else(|| TranslationError::InvalidPlan(format!("register {} out of range", slot)))
    }

    fn translate_plan(
        &self,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        match &plan.node {
            PlanNode::IndexScan { order, pattern } => {
                self.translate_scan(ScanKind::Full, *order, *pattern, context, projection, bindings, plan)
            }
            PlanNode::AggregatedIndexScan { order, pattern } => self.translate_scan(
                ScanKind::Aggregated,
                *order,
                *pattern,
                context,
                projection,
                bindings,
                plan,
            ),
            PlanNode::FullyAggregatedIndexScan { order, pattern } => self.translate_scan(
                ScanKind::FullyAggregated,
                *order,
                *pattern,
                context,
                projection,
                bindings,
                plan,
            ),
            PlanNode::NestedLoopJoin { left, right } => {
                self.translate_nested_loop_join(context, projection, bindings, left, right, plan)
            }
            PlanNode::MergeJoin { left, right, on } => {
                self.translate_merge_join(context, projection, bindings, left, right, *on, plan)
            }
            PlanNode::HashJoin { left, right } => {
                self.translate_hash_join(context, projection, bindings, left, right, plan)
            }
            PlanNode::HashOptional { required, optional } => {
                self.translate_hash_optional(context, projection, bindings, required, optional, plan)
            }
            PlanNode::HashGroupify { input } => {
                let tree = self.translate_plan(context, projection, bindings, input)?;
                let output = bindings.values().cloned().collect();
                Ok(Box::new(HashGroupify::new(tree, output, plan.cardinality)))
            }
            PlanNode::Filter { input, filter } => {
                self.translate_filter(context, projection, bindings, input, filter, plan)
            }
            PlanNode::Union { .. } => self.translate_union(context, projection, bindings, plan),
            PlanNode::MergeUnion { left, right } => {
                self.translate_merge_union(context, projection, bindings, left, right, plan)
            }
            PlanNode::TableFunction { input, function } => {
                self.translate_table_function(context, projection, bindings, input, *function, plan)
            }
            PlanNode::Singleton => Ok(Box::new(SingletonScan::new())),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn translate_scan(
        &self,
        kind: ScanKind,
        order: DataOrder,
        pattern: NodeId,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        let node = self
            .patterns
            .get(pattern.0)
            .copied()
            .ok_or(TranslationError::UnknownNode(pattern.0))?;
        let base = self
            .layout
            .patterns
            .get(pattern.0)
            .copied()
            .ok_or(TranslationError::UnknownNode(pattern.0))?;
        let unused = kind.unused_positions(order);

        let mut registers: [Option<RegisterRef>; 3] = [None, None, None];
        let mut bound = [false; 3];
        let mut first_seen: Bindings = Bindings::new();
        let mut repeated = Vec::new();
        for position in 0..3 {
            match node.slot(position) {
                PatternSlot::Constant(value) => {
                    let reg = self.register(base + position)?;
                    reg.set(value);
                    registers[position] = Some(reg);
                    bound[position] = true;
                }
                // aggregated away
                PatternSlot::Variable(_) if unused.contains(&position) => {}
                PatternSlot::Variable(var) => {
                    if let Some(outer) = context.get(&var) {
                        registers[position] = Some(outer.clone());
                        bound[position] = true;
                        continue;
                    }
                    let reg = self.register(base + position)?;
                    if let Some(first) = first_seen.get(&var).cloned() {
                        // ?x <p> ?x
                        repeated.push((first, reg.clone()));
                    } else {
                        first_seen.insert(var, reg.clone());
                        if projection.contains(&var) {
                            bindings.insert(var, reg.clone());
                        }
                    }
                    registers[position] = Some(reg);
                }
            }
        }

        let scan = IndexScan::new(
            self.runtime.database().clone(),
            kind,
            order,
            registers,
            bound,
            plan.cardinality,
        );
        let mut tree: BoxedOperator = match self.runtime.differential_index() {
            Some(index) => Box::new(DifferentialScan::new(scan, index.clone())),
            None => Box::new(scan),
        };
        if let Some(predicate) = equalities(repeated) {
            tree = Box::new(Selection::new(
                tree,
                predicate,
                self.dictionary.clone(),
                plan.cardinality,
            ));
        }
        Ok(tree)
    }

    fn join_variables(
        &self,
        context: &Bindings,
        left: &Plan,
        right: &Plan,
    ) -> Result<BTreeSet<VariableId>, TranslationError> {
        let mut left_vars = BTreeSet::new();
        let mut right_vars = BTreeSet::new();
        collect_variables(&self.patterns, &self.calls, context, &mut left_vars, left)?;
        collect_variables(&self.patterns, &self.calls, context, &mut right_vars, right)?;
        Ok(left_vars.intersection(&right_vars).copied().collect())
    }

    /// Translate both inputs of a join, projecting the join variables too
    fn translate_join_inputs(
        &self,
        context: &Bindings,
        projection: &Projection,
        join_variables: &BTreeSet<VariableId>,
        left: &Plan,
        right: &Plan,
    ) -> Result<JoinInputs, TranslationError> {
        let mut inner = projection.clone();
        inner.extend(join_variables.iter().copied());

        let mut left_bindings = Bindings::new();
        let left = self.translate_plan(context, &inner, &mut left_bindings, left)?;
        let mut right_bindings = Bindings::new();
        let right = self.translate_plan(context, &inner, &mut right_bindings, right)?;
        Ok(JoinInputs {
            left,
            left_bindings,
            right,
            right_bindings,
        })
    }

    /// Equality checks for the join variables the join itself does not compare
    fn add_residual_selections(
        &self,
        input: BoxedOperator,
        join_variables: &BTreeSet<VariableId>,
        left: &Bindings,
        right: &Bindings,
        joined_on: Option<VariableId>,
    ) -> Result<BoxedOperator, TranslationError> {
        let mut pairs = Vec::new();
        for var in join_variables {
            if Some(*var) == joined_on {
                continue;
            }
            pairs.push((binding(left, *var, "left")?, binding(right, *var, "right")?));
        }
        Ok(match equalities(pairs) {
            Some(predicate) => {
                let expected = input.expected_cardinality();
                Box::new(Selection::new(input, predicate, self.dictionary.clone(), expected))
            }
            None => input,
        })
    }

    fn translate_nested_loop_join(
        &self,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        left: &Plan,
        right: &Plan,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        let join_variables = self.join_variables(context, left, right)?;
        let inputs = self.translate_join_inputs(context, projection, &join_variables, left, right)?;
        merge_bindings(projection, bindings, &inputs.left_bindings, &inputs.right_bindings);

        let tree = Box::new(NestedLoopJoin::new(inputs.left, inputs.right, plan.cardinality));
        self.add_residual_selections(
            tree,
            &join_variables,
            &inputs.left_bindings,
            &inputs.right_bindings,
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn translate_merge_join(
        &self,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        left: &Plan,
        right: &Plan,
        on: VariableId,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        let join_variables = self.join_variables(context, left, right)?;
        if !join_variables.contains(&on) {
            return Err(TranslationError::MissingJoinVariable(format!(
                "merge join on ?{}, which is not shared by both inputs",
                on
            )));
        }
        let inputs = self.translate_join_inputs(context, projection, &join_variables, left, right)?;
        merge_bindings(projection, bindings, &inputs.left_bindings, &inputs.right_bindings);

        let left_value = binding(&inputs.left_bindings, on, "left")?;
        let right_value = binding(&inputs.right_bindings, on, "right")?;
        let tree = Box::new(MergeJoin::new(
            inputs.left,
            left_value,
            tail(&inputs.left_bindings, on),
            inputs.right,
            right_value,
            tail(&inputs.right_bindings, on),
            plan.cardinality,
        ));
        self.add_residual_selections(
            tree,
            &join_variables,
            &inputs.left_bindings,
            &inputs.right_bindings,
            Some(on),
        )
    }

    fn translate_hash_join(
        &self,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        left: &Plan,
        right: &Plan,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        let join_variables = self.join_variables(context, left, right)?;
        let Some(on) = join_variables.iter().next().copied() else {
            return Err(TranslationError::MissingJoinVariable(
                "hash join inputs share no variable".into(),
            ));
        };
        let inputs = self.translate_join_inputs(context, projection, &join_variables, left, right)?;
        merge_bindings(projection, bindings, &inputs.left_bindings, &inputs.right_bindings);

        let left_value = binding(&inputs.left_bindings, on, "left")?;
        let right_value = binding(&inputs.right_bindings, on, "right")?;
        // the smaller build side is wanted first, the larger probe side too
        let tree = Box::new(HashJoin::new(
            inputs.left,
            left_value,
            tail(&inputs.left_bindings, on),
            inputs.right,
            right_value,
            tail(&inputs.right_bindings, on),
            -left.costs,
            right.costs,
            self.table_size,
            plan.cardinality,
        ));
        self.add_residual_selections(
            tree,
            &join_variables,
            &inputs.left_bindings,
            &inputs.right_bindings,
            Some(on),
        )
    }

    /// Builds on the optional input and probes with the required one
    ///
    /// The remaining shared variables are checked inside the operator so that
    /// a failed check still produces the NULL-extended row.
    fn translate_hash_optional(
        &self,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        required: &Plan,
        optional: &Plan,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        let join_variables = self.join_variables(context, optional, required)?;
        let Some(on) = join_variables.iter().next().copied() else {
            return Err(TranslationError::MissingJoinVariable(
                "optional part shares no variable with the required part".into(),
            ));
        };
        let inputs =
            self.translate_join_inputs(context, projection, &join_variables, optional, required)?;
        // required values win over the NULLs of unmatched rows
        merge_bindings(projection, bindings, &inputs.right_bindings, &inputs.left_bindings);

        let mut residuals = Vec::new();
        for var in join_variables.iter().filter(|v| **v != on) {
            let build = binding(&inputs.left_bindings, *var, "optional")?;
            let probe = binding(&inputs.right_bindings, *var, "required")?;
            if !same_register(&build, &probe) {
                residuals.push((build, probe));
            }
        }

        let optional_value = binding(&inputs.left_bindings, on, "optional")?;
        let required_value = binding(&inputs.right_bindings, on, "required")?;
        Ok(Box::new(HashOptional::new(
            inputs.left,
            optional_value,
            tail(&inputs.left_bindings, on),
            inputs.right,
            required_value,
            tail(&inputs.right_bindings, on),
            residuals,
            optional.costs,
            -required.costs,
            self.table_size,
            plan.cardinality,
        )))
    }

    fn translate_filter(
        &self,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        input: &Plan,
        filter: &FilterExpr,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        let mut filter_variables = BTreeSet::new();
        filter.collect_variables(&mut filter_variables);
        let mut inner = projection.clone();
        inner.extend(filter_variables.iter().copied());

        let tree = self.translate_plan(context, &inner, bindings, input)?;
        let result: BoxedOperator = match value_filter(filter, bindings) {
            Some(values) => Box::new(Filter::new(
                tree,
                values.register,
                values.values,
                values.exclude,
                plan.cardinality,
            )),
            None => Box::new(Selection::new(
                tree,
                build_predicate(filter, bindings)?,
                self.dictionary.clone(),
                plan.cardinality,
            )),
        };

        for var in &filter_variables {
            if !projection.contains(var) {
                bindings.remove(var);
            }
        }
        Ok(result)
    }

    fn translate_union(
        &self,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        // flatten the right-leaning chain
        let mut parts = Vec::new();
        let mut current = plan;
        while let PlanNode::Union { left, right } = &current.node {
            parts.push(left.as_ref());
            current = right.as_ref();
        }
        parts.push(current);

        let mut trees = Vec::with_capacity(parts.len());
        let mut branch_bindings = Vec::with_capacity(parts.len());
        for part in parts {
            let mut sub = Bindings::new();
            trees.push(self.translate_plan(context, projection, &mut sub, part)?);
            branch_bindings.push(sub);
        }

        for sub in &branch_bindings {
            for (var, reg) in sub {
                bindings.entry(*var).or_insert_with(|| reg.clone());
            }
        }

        let mut mappings = Vec::with_capacity(trees.len());
        let mut initializations = Vec::with_capacity(trees.len());
        for sub in &branch_bindings {
            let mut mapping = Vec::new();
            for (var, reg) in sub {
                if let Some(result) = bindings.get(var) {
                    if !same_register(result, reg) {
                        mapping.push((reg.clone(), result.clone()));
                    }
                }
            }
            let missing = bindings
                .iter()
                .filter(|(var, _)| !sub.contains_key(var))
                .map(|(_, reg)| reg.clone())
                .collect();
            mappings.push(mapping);
            initializations.push(missing);
        }

        Ok(Box::new(Union::new(
            trees,
            mappings,
            initializations,
            plan.cardinality,
        )))
    }

    fn translate_merge_union(
        &self,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        left: &Plan,
        right: &Plan,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        let mut left_bindings = Bindings::new();
        let left_tree = self.translate_plan(context, projection, &mut left_bindings, left)?;
        let mut right_bindings = Bindings::new();
        let right_tree = self.translate_plan(context, projection, &mut right_bindings, right)?;

        if left_bindings.len() != 1 || right_bindings.len() != 1 {
            return Err(TranslationError::ArityMismatch(format!(
                "merge union needs one binding per input, got {} and {}",
                left_bindings.len(),
                right_bindings.len()
            )));
        }
        let (var, left_reg) = left_bindings
            .into_iter()
            .next()
            .ok_or_else(|| TranslationError::InvalidPlan("empty merge union input".into()))?;
        let right_reg = right_bindings
            .into_values()
            .next()
            .ok_or_else(|| TranslationError::InvalidPlan("empty merge union input".into()))?;
        bindings.insert(var, left_reg.clone());

        Ok(Box::new(MergeUnion::new(
            left_reg.clone(),
            left_tree,
            left_reg,
            right_tree,
            right_reg,
            plan.cardinality,
        )))
    }

    fn translate_table_function(
        &self,
        context: &Bindings,
        projection: &Projection,
        bindings: &mut Bindings,
        input: &Plan,
        function: NodeId,
        plan: &Plan,
    ) -> Result<BoxedOperator, TranslationError> {
        let call = self
            .calls
            .get(function.0)
            .copied()
            .ok_or(TranslationError::UnknownTableFunction(function.0))?;
        let base = self
            .layout
            .functions
            .get(function.0)
            .copied()
            .ok_or(TranslationError::UnknownTableFunction(function.0))?;

        let input_variables: Vec<VariableId> = call
            .input
            .iter()
            .filter_map(|arg| match arg {
                TableFunctionArgument::Variable(var) => Some(*var),
                TableFunctionArgument::Value(_) => None,
            })
            .collect();
        let mut inner = projection.clone();
        inner.extend(input_variables.iter().copied());
        let tree = self.translate_plan(context, &inner, bindings, input)?;

        let arguments = call
            .input
            .iter()
            .map(|arg| match arg {
                TableFunctionArgument::Variable(var) => bindings
                    .get(var)
                    .cloned()
                    .map(FunctionArgument::Register)
                    .ok_or_else(|| TranslationError::UnboundArgument {
                        function: call.name.clone(),
                        variable: *var,
                    }),
                TableFunctionArgument::Value(value) => Ok(FunctionArgument::Value(value.clone())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut outputs = Vec::with_capacity(call.output.len());
        for (offset, var) in call.output.iter().enumerate() {
            let reg = self.register(base + offset)?;
            if projection.contains(var) {
                bindings.insert(*var, reg.clone());
            }
            outputs.push(reg);
        }

        let result = Box::new(TableFunction::new(
            tree,
            self.runtime.table_functions().cloned(),
            self.dictionary.clone(),
            call.name.clone(),
            arguments,
            outputs,
            plan.cardinality,
        ));

        for var in &input_variables {
            if !projection.contains(var) && !call.output.contains(var) {
                bindings.remove(var);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::results::DuplicateMode;
    use crate::plan::{DuplicateHandling, OrderBy, SubQuery};
    use crate::storage::{Database, MemoryDatabase, Triple};
    use crate::runtime::{TableFunctionError, TableFunctionHandler};

    const SPO: DataOrder = DataOrder::SubjectPredicateObject;
    const PSO: DataOrder = DataOrder::PredicateSubjectObject;
    const POS: DataOrder = DataOrder::PredicateObjectSubject;

    struct Fixture {
        db: Arc<MemoryDatabase>,
        knows: u32,
        name: u32,
        people: Vec<u32>,
        names: Vec<u32>,
    }

    /// alice knows bob and carol, bob knows carol; everyone but carol has a name
    fn fixture() -> Fixture {
        let db = Arc::new(MemoryDatabase::new());
        let knows = db.uri("http://example.org/knows");
        let name = db.uri("http://example.org/name");
        let people: Vec<u32> = ["alice", "bob", "carol"]
            .iter()
            .map(|p| db.uri(&format!("http://example.org/{}", p)))
            .collect();
        let names: Vec<u32> = ["Alice", "Bob"].iter().map(|n| db.literal(n)).collect();
        db.insert_triples(&[
            Triple::new(people[0], knows, people[1]),
            Triple::new(people[0], knows, people[2]),
            Triple::new(people[1], knows, people[2]),
            Triple::new(people[0], name, names[0]),
            Triple::new(people[1], name, names[1]),
        ]);
        Fixture {
            db,
            knows,
            name,
            people,
            names,
        }
    }

    fn var(v: VariableId) -> PatternSlot {
        PatternSlot::Variable(v)
    }

    fn constant(id: u32) -> PatternSlot {
        PatternSlot::Constant(id)
    }

    fn run(db: &Arc<MemoryDatabase>, query: &QueryGraph, plan: Option<&Plan>) -> Vec<(Vec<Option<u32>>, u32)> {
        let mut runtime = Runtime::new(db.clone() as Arc<dyn Database>);
        let mut root = CodeGen::try_translate(&mut runtime, query, plan).unwrap();
        root.first();
        let mut rows: Vec<_> = root
            .take_result()
            .rows
            .into_iter()
            .map(|r| (r.values, r.count))
            .collect();
        rows.sort();
        rows
    }

    /// ?a knows ?b . ?b name ?n
    fn knows_and_name(f: &Fixture) -> QueryGraph {
        let mut query = QueryGraph::new(
            SubQuery::new()
                .with_node(Node::new(var(0), constant(f.knows), var(1)))
                .with_node(Node::new(var(1), constant(f.name), var(2))),
        );
        query.add_projection(0);
        query.add_projection(2);
        query
    }

    #[test]
    fn test_join_algorithms_agree() {
        let f = fixture();
        let query = knows_and_name(&f);
        let knows = || Plan::index_scan(POS, 0, 3.0);
        let names = || Plan::index_scan(PSO, 1, 2.0);

        let expected = vec![(vec![Some(f.people[0]), Some(f.names[1])], 1)];
        let plans = [
            Plan::hash_join(knows(), names(), 1.0),
            Plan::hash_join(names(), knows(), 1.0),
            Plan::merge_join(knows(), names(), 1, 1.0),
            Plan::nested_loop_join(knows(), names(), 1.0),
        ];
        for plan in &plans {
            assert_eq!(run(&f.db, &query, Some(plan)), expected, "{}", plan);
        }
    }

    #[test]
    fn test_optional_keeps_unmatched_rows() {
        let f = fixture();
        let mut query = knows_and_name(&f);
        query.query_mut().nodes.pop();
        query
            .query_mut()
            .optional
            .push(SubQuery::new().with_node(Node::new(var(1), constant(f.name), var(2))));
        query.add_projection(1);

        let plan = Plan::hash_optional(
            Plan::index_scan(PSO, 0, 3.0),
            Plan::index_scan(PSO, 1, 2.0),
            3.0,
        );
        let (alice, bob, carol) = (f.people[0], f.people[1], f.people[2]);
        assert_eq!(
            run(&f.db, &query, Some(&plan)),
            vec![
                (vec![Some(alice), None, Some(carol)], 1),
                (vec![Some(alice), Some(f.names[1]), Some(bob)], 1),
                (vec![Some(bob), None, Some(carol)], 1),
            ]
        );
    }

    #[test]
    fn test_filter_forms() {
        let f = fixture();
        let mut query = QueryGraph::new(
            SubQuery::new().with_node(Node::new(var(0), constant(f.knows), var(1))),
        );
        query.add_projection(0);
        let scan = || Plan::index_scan(SPO, 0, 3.0);

        let carol = FilterExpr::iri(Some(f.people[2]), "http://example.org/carol");
        let eq = Plan::filter(scan(), FilterExpr::equal(FilterExpr::variable(1), carol.clone()), 2.0);
        assert_eq!(run(&f.db, &query, Some(&eq)).len(), 2);

        let ne = Plan::filter(scan(), FilterExpr::not_equal(carol, FilterExpr::variable(1)), 1.0);
        assert_eq!(
            run(&f.db, &query, Some(&ne)),
            vec![(vec![Some(f.people[0])], 1)]
        );

        // unknown constants match nothing
        let unknown = FilterExpr::iri(None, "http://example.org/nobody");
        let none = Plan::filter(scan(), FilterExpr::equal(FilterExpr::variable(1), unknown), 0.0);
        assert!(run(&f.db, &query, Some(&none)).is_empty());

        // generic predicate: ?a != ?b holds everywhere
        let generic = Plan::filter(
            scan(),
            FilterExpr::not_equal(FilterExpr::variable(0), FilterExpr::variable(1)),
            3.0,
        );
        assert_eq!(run(&f.db, &query, Some(&generic)).len(), 3);
    }

    #[test]
    fn test_union_fills_missing_bindings_with_null() {
        let f = fixture();
        let branch1 = SubQuery::new().with_node(Node::new(var(0), constant(f.knows), constant(f.people[1])));
        let branch2 = SubQuery::new().with_node(Node::new(var(0), constant(f.name), var(1)));
        let mut query = QueryGraph::new(SubQuery::new().with_union(vec![branch1, branch2]));
        query.add_projection(0);
        query.add_projection(1);

        let plan = Plan::union(vec![Plan::index_scan(POS, 0, 1.0), Plan::index_scan(PSO, 1, 2.0)]);
        let (alice, bob) = (f.people[0], f.people[1]);
        assert_eq!(
            run(&f.db, &query, Some(&plan)),
            vec![
                (vec![Some(alice), None], 1),
                (vec![Some(alice), Some(f.names[0])], 1),
                (vec![Some(bob), Some(f.names[1])], 1),
            ]
        );
    }

    #[test]
    fn test_aggregated_scan_and_count() {
        let f = fixture();
        let mut query = QueryGraph::new(
            SubQuery::new().with_node(Node::new(var(0), constant(f.knows), var(1))),
        );
        query.add_projection(0);
        query.set_duplicate_handling(DuplicateHandling::Count);
        let plan = Plan::aggregated_index_scan(PSO, 0, 2.0);
        assert_eq!(
            run(&f.db, &query, Some(&plan)),
            vec![(vec![Some(f.people[0])], 2), (vec![Some(f.people[1])], 1)]
        );
    }

    #[test]
    fn test_order_by_descending() {
        let f = fixture();
        let mut query = QueryGraph::new(
            SubQuery::new().with_node(Node::new(var(0), constant(f.name), var(1))),
        );
        query.add_projection(1);
        query.add_order(OrderBy {
            variable: Some(1),
            descending: true,
        });
        let mut runtime = Runtime::new(f.db.clone() as Arc<dyn Database>);
        let plan = Plan::index_scan(PSO, 0, 2.0);
        let mut root = CodeGen::translate(&mut runtime, &query, Some(&plan));
        root.first();
        let result = root.take_result();
        assert_eq!(result.columns, vec!["?1".to_string()]);
        assert_eq!(result.render(&runtime.dictionary()), vec!["Bob", "Alice"]);
    }

    #[test]
    fn test_repeated_variable_in_pattern() {
        let f = fixture();
        f.db.insert_triples(&[Triple::new(f.people[2], f.knows, f.people[2])]);
        let mut query = QueryGraph::new(
            SubQuery::new().with_node(Node::new(var(0), constant(f.knows), var(0))),
        );
        query.add_projection(0);
        let plan = Plan::index_scan(PSO, 0, 1.0);
        assert_eq!(
            run(&f.db, &query, Some(&plan)),
            vec![(vec![Some(f.people[2])], 1)]
        );
    }

    #[test]
    fn test_semantic_errors_yield_empty_results() {
        let f = fixture();
        let query = knows_and_name(&f);
        let mut runtime = Runtime::new(f.db.clone() as Arc<dyn Database>);

        let plan = Plan::merge_join(Plan::index_scan(POS, 0, 3.0), Plan::index_scan(PSO, 1, 2.0), 7, 1.0);
        assert!(matches!(
            CodeGen::try_translate(&mut runtime, &query, Some(&plan)),
            Err(TranslationError::MissingJoinVariable(_))
        ));
        let mut root = CodeGen::translate(&mut runtime, &query, Some(&plan));
        assert_eq!(root.first(), 1);
        let result = root.take_result();
        assert!(result.is_empty());
        assert_eq!(result.columns.len(), 2);

        let unknown = Plan::index_scan(SPO, 9, 1.0);
        assert_eq!(
            CodeGen::try_translate(&mut runtime, &query, Some(&unknown)).err(),
            Some(TranslationError::UnknownNode(9))
        );
    }

    #[test]
    fn test_known_empty_and_missing_plan() {
        let f = fixture();
        let mut query = knows_and_name(&f);
        assert_eq!(run(&f.db, &query, None), vec![(vec![None, None], 1)]);
        query.mark_known_empty();
        assert!(run(&f.db, &query, Some(&Plan::index_scan(SPO, 0, 1.0))).is_empty());
    }

    struct Upper;

    impl TableFunctionHandler for Upper {
        fn call(
            &self,
            _name: &str,
            arguments: &[String],
            _output_width: usize,
        ) -> Result<Vec<Vec<String>>, TableFunctionError> {
            Ok(vec![vec![arguments[0].to_uppercase()]])
        }
    }

    #[test]
    fn test_table_function() {
        let f = fixture();
        let shout = f.db.literal("ALICE");
        let call = TableFunctionCall {
            name: "upper".into(),
            input: vec![TableFunctionArgument::Variable(1)],
            output: vec![2],
        };
        let mut query = QueryGraph::new(
            SubQuery::new()
                .with_node(Node::new(constant(f.people[0]), constant(f.name), var(1)))
                .with_table_function(call.clone()),
        );
        query.add_projection(2);

        let plan = Plan::table_function(Plan::index_scan(SPO, 0, 1.0), 0, 1.0);
        let mut runtime = Runtime::new(f.db.clone() as Arc<dyn Database>)
            .with_table_functions(Arc::new(Upper) as Arc<dyn TableFunctionHandler>);
        let mut root = CodeGen::try_translate(&mut runtime, &query, Some(&plan)).unwrap();
        root.first();
        let result = root.take_result();
        assert_eq!(result.rows[0].values, vec![Some(shout)]);
        assert_eq!(result.mode, DuplicateMode::Expand);

        // the argument is bound by nothing
        let unbound = Plan::table_function(Plan::singleton(), 0, 1.0);
        assert_eq!(
            CodeGen::try_translate(&mut runtime, &query, Some(&unbound)).err(),
            Some(TranslationError::UnboundArgument {
                function: "upper".into(),
                variable: 1
            })
        );

        // same function, different widths
        let mut inconsistent = query.clone();
        inconsistent.query_mut().table_functions.push(TableFunctionCall {
            output: vec![3, 4],
            ..call
        });
        assert!(matches!(
            CodeGen::try_translate(&mut runtime, &inconsistent, Some(&plan)),
            Err(TranslationError::ArityMismatch(_))
        ));
    }
}
