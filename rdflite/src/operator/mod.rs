// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Physical operators
//!
//! Every operator follows the same pull protocol: `first()` positions on the
//! first tuple and `next()` advances. Both return the multiplicity of the
//! tuple now held in the operator's output registers, or 0 when the input is
//! exhausted. Multiplicities stand for duplicates that are never materialized.
//!
//! Besides the pull protocol operators can be printed, forward merge-join
//! hints down to their scans and hand independent subtrees to the
//! [`Scheduler`] so they can start ahead of the main pull loop.

pub mod differential_scan;
pub mod filter;
pub mod hash_groupify;
pub mod hash_join;
pub mod hash_optional;
pub mod index_scan;
pub mod merge_join;
pub mod merge_union;
pub mod nested_loop_join;
pub mod printer;
pub mod results;
pub mod scans;
pub mod scheduler;
pub mod selection;
pub mod sort;
pub mod table_function;
#[cfg(test)]
pub(crate) mod testing;
pub mod union;

pub use differential_scan::DifferentialScan;
pub use filter::{Filter, NestedLoopFilter};
pub use hash_groupify::HashGroupify;
pub use hash_join::HashJoin;
pub use hash_optional::HashOptional;
pub use index_scan::{IndexScan, ScanKind};
pub use merge_join::MergeJoin;
pub use merge_union::MergeUnion;
pub use nested_loop_join::NestedLoopJoin;
pub use printer::{DebugPlanPrinter, PlanPrinter};
pub use results::ResultsCollector;
pub use scans::{EmptyScan, SingletonScan};
pub use scheduler::{AsyncPoint, Scheduler};
pub use selection::{Predicate, Selection};
pub use sort::Sort;
pub use table_function::{FunctionArgument, TableFunction};
pub use union::Union;

use crate::runtime::RegisterRef;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide switch for index skipping
///
/// When off, scans read sequentially and merge joins drain their inputs to
/// the end. Results must not change; only the amount of work does.
static SKIPPING_ENABLED: AtomicBool = AtomicBool::new(true);

/// Whether scans may skip with hints
pub fn skipping_enabled() -> bool {
    SKIPPING_ENABLED.load(Ordering::Relaxed)
}

/// Turn index skipping on or off for every query in the process
pub fn set_skipping_enabled(enabled: bool) {
    SKIPPING_ENABLED.store(enabled, Ordering::Relaxed);
}

/// A node of the executable tree
pub trait Operator: Send {
    /// Produce the first tuple
    fn first(&mut self) -> u32;

    /// Produce the next tuple
    fn next(&mut self) -> u32;

    /// Print the operator tree
    fn print(&self, out: &mut dyn PlanPrinter);

    /// Both registers are compared for equality further up the tree
    fn add_merge_hint(&mut self, reg1: &RegisterRef, reg2: &RegisterRef);

    /// Register subtrees that can run ahead of time
    fn async_input_candidates(&mut self, scheduler: &mut Scheduler);

    /// Output cardinality estimated by the plan generator
    fn expected_cardinality(&self) -> f64;

    /// Sum of multiplicities produced since the last `first()`
    fn observed_cardinality(&self) -> u64;
}

/// An owned subtree
pub type BoxedOperator = Box<dyn Operator>;

/// Product of two multiplicities
#[inline]
pub(crate) fn multiply(left: u32, right: u32) -> u32 {
    left.saturating_mul(right)
}
