// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Inputs of the translator
//!
//! - [`QueryGraph`]: the query as produced by the front end
//! - [`Plan`]: the join tree picked by the optimizer, referring to the
//!   query's patterns and table function calls by [`NodeId`]

pub mod physical;
pub mod query_graph;

pub use physical::{Plan, PlanNode};
pub use query_graph::{
    DuplicateHandling, FilterExpr, Node, NodeId, OrderBy, PatternSlot, QueryGraph, SubQuery,
    TableFunctionArgument, TableFunctionCall, VariableId,
};
