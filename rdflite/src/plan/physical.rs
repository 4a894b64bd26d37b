// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Physical plans produced by the optimizer

use super::query_graph::{FilterExpr, NodeId, VariableId};
use crate::storage::DataOrder;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator of a plan node with its inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    IndexScan {
        order: DataOrder,
        pattern: NodeId,
    },
    AggregatedIndexScan {
        order: DataOrder,
        pattern: NodeId,
    },
    FullyAggregatedIndexScan {
        order: DataOrder,
        pattern: NodeId,
    },
    NestedLoopJoin {
        left: Box<Plan>,
        right: Box<Plan>,
    },
    /// Both inputs sorted on `on`
    MergeJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        on: VariableId,
    },
    /// Builds on `left`, probes with `right`
    HashJoin {
        left: Box<Plan>,
        right: Box<Plan>,
    },
    /// Left outer join keeping every `required` tuple
    HashOptional {
        required: Box<Plan>,
        optional: Box<Plan>,
    },
    HashGroupify {
        input: Box<Plan>,
    },
    Filter {
        input: Box<Plan>,
        filter: FilterExpr,
    },
    /// Binary; chains of unions nest to the right
    Union {
        left: Box<Plan>,
        right: Box<Plan>,
    },
    /// Union of two inputs binding one variable each, both sorted
    MergeUnion {
        left: Box<Plan>,
        right: Box<Plan>,
    },
    TableFunction {
        input: Box<Plan>,
        function: NodeId,
    },
    Singleton,
}

/// A plan node with the optimizer's estimates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub node: PlanNode,
    pub cardinality: f64,
    pub costs: f64,
}

impl Plan {
    pub fn new(node: PlanNode, cardinality: f64, costs: f64) -> Self {
        Self {
            node,
            cardinality,
            costs,
        }
    }

    pub fn index_scan(order: DataOrder, pattern: usize, cardinality: f64) -> Self {
        Self::new(
            PlanNode::IndexScan {
                order,
                pattern: NodeId(pattern),
            },
            cardinality,
            cardinality,
        )
    }

    pub fn aggregated_index_scan(order: DataOrder, pattern: usize, cardinality: f64) -> Self {
        Self::new(
            PlanNode::AggregatedIndexScan {
                order,
                pattern: NodeId(pattern),
            },
            cardinality,
            cardinality,
        )
    }

    pub fn fully_aggregated_index_scan(order: DataOrder, pattern: usize, cardinality: f64) -> Self {
        Self::new(
            PlanNode::FullyAggregatedIndexScan {
                order,
                pattern: NodeId(pattern),
            },
            cardinality,
            cardinality,
        )
    }

    fn join_costs(left: &Plan, right: &Plan, cardinality: f64) -> f64 {
        left.costs + right.costs + cardinality
    }

    pub fn nested_loop_join(left: Plan, right: Plan, cardinality: f64) -> Self {
        let costs = Self::join_costs(&left, &right, cardinality);
        Self::new(
            PlanNode::NestedLoopJoin {
                left: Box::new(left),
                right: Box::new(right),
            },
            cardinality,
            costs,
        )
    }

    pub fn merge_join(left: Plan, right: Plan, on: VariableId, cardinality: f64) -> Self {
        let costs = Self::join_costs(&left, &right, cardinality);
        Self::new(
            PlanNode::MergeJoin {
                left: Box::new(left),
                right: Box::new(right),
                on,
            },
            cardinality,
            costs,
        )
    }

    pub fn hash_join(left: Plan, right: Plan, cardinality: f64) -> Self {
        let costs = Self::join_costs(&left, &right, cardinality);
        Self::new(
            PlanNode::HashJoin {
                left: Box::new(left),
                right: Box::new(right),
            },
            cardinality,
            costs,
        )
    }

    pub fn hash_optional(required: Plan, optional: Plan, cardinality: f64) -> Self {
        let costs = Self::join_costs(&required, &optional, cardinality);
        Self::new(
            PlanNode::HashOptional {
                required: Box::new(required),
                optional: Box::new(optional),
            },
            cardinality,
            costs,
        )
    }

    pub fn hash_groupify(input: Plan, cardinality: f64) -> Self {
        let costs = input.costs + input.cardinality;
        Self::new(
            PlanNode::HashGroupify {
                input: Box::new(input),
            },
            cardinality,
            costs,
        )
    }

    pub fn filter(input: Plan, filter: FilterExpr, cardinality: f64) -> Self {
        let costs = input.costs;
        Self::new(
            PlanNode::Filter {
                input: Box::new(input),
                filter,
            },
            cardinality,
            costs,
        )
    }

    /// Union of two or more branches
    pub fn union(mut branches: Vec<Plan>) -> Self {
        let mut plan = branches.pop().unwrap_or_else(Plan::singleton);
        while let Some(left) = branches.pop() {
            let cardinality = left.cardinality + plan.cardinality;
            let costs = left.costs + plan.costs;
            plan = Self::new(
                PlanNode::Union {
                    left: Box::new(left),
                    right: Box::new(plan),
                },
                cardinality,
                costs,
            );
        }
        plan
    }

    pub fn merge_union(left: Plan, right: Plan) -> Self {
        let cardinality = left.cardinality + right.cardinality;
        let costs = left.costs + right.costs;
        Self::new(
            PlanNode::MergeUnion {
                left: Box::new(left),
                right: Box::new(right),
            },
            cardinality,
            costs,
        )
    }

    pub fn table_function(input: Plan, function: usize, cardinality: f64) -> Self {
        let costs = input.costs + cardinality;
        Self::new(
            PlanNode::TableFunction {
                input: Box::new(input),
                function: NodeId(function),
            },
            cardinality,
            costs,
        )
    }

    pub fn singleton() -> Self {
        Self::new(PlanNode::Singleton, 1.0, 0.0)
    }

    pub fn operator_name(&self) -> &'static str {
        match &self.node {
            PlanNode::IndexScan { .. } => "IndexScan",
            PlanNode::AggregatedIndexScan { .. } => "AggregatedIndexScan",
            PlanNode::FullyAggregatedIndexScan { .. } => "FullyAggregatedIndexScan",
            PlanNode::NestedLoopJoin { .. } => "NestedLoopJoin",
            PlanNode::MergeJoin { .. } => "MergeJoin",
            PlanNode::HashJoin { .. } => "HashJoin",
            PlanNode::HashOptional { .. } => "HashOptional",
            PlanNode::HashGroupify { .. } => "HashGroupify",
            PlanNode::Filter { .. } => "Filter",
            PlanNode::Union { .. } => "Union",
            PlanNode::MergeUnion { .. } => "MergeUnion",
            PlanNode::TableFunction { .. } => "TableFunction",
            PlanNode::Singleton => "Singleton",
        }
    }

    /// Inputs in left to right order
    pub fn children(&self) -> Vec<&Plan> {
        match &self.node {
            PlanNode::IndexScan { .. }
            | PlanNode::AggregatedIndexScan { .. }
            | PlanNode::FullyAggregatedIndexScan { .. }
            | PlanNode::Singleton => Vec::new(),
            PlanNode::NestedLoopJoin { left, right }
            | PlanNode::MergeJoin { left, right, .. }
            | PlanNode::HashJoin { left, right }
            | PlanNode::Union { left, right }
            | PlanNode::MergeUnion { left, right } => vec![left.as_ref(), right.as_ref()],
            PlanNode::HashOptional { required, optional } => {
                vec![required.as_ref(), optional.as_ref()]
            }
            PlanNode::HashGroupify { input }
            | PlanNode::Filter { input, .. }
            | PlanNode::TableFunction { input, .. } => vec![input.as_ref()],
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        writeln!(
            f,
            "{:indent$}{} cardinality={} costs={}",
            "",
            self.operator_name(),
            self.cardinality,
            self.costs,
            indent = indent
        )?;
        for child in self.children() {
            child.write_indented(f, indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
