// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Output stage: collects the rows of a query

use super::{BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::{DictionaryHandle, RegisterRef};
use crate::storage::NULL_ID;
use serde::{Deserialize, Serialize};

/// How duplicate rows are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DuplicateMode {
    /// Every duplicate is a row of its own
    #[default]
    Expand,
    /// Each distinct row once
    Reduce,
    /// Each distinct row once, with its multiplicity
    Count,
    /// Only rows occurring at least twice, with their multiplicity
    ShowOnlyDuplicates,
}

impl DuplicateMode {
    fn min_count(self) -> u32 {
        match self {
            DuplicateMode::ShowOnlyDuplicates => 2,
            _ => 1,
        }
    }

    fn shows_count(self) -> bool {
        matches!(self, DuplicateMode::Count | DuplicateMode::ShowOnlyDuplicates)
    }
}

/// One output row; `None` is an unbound value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub values: Vec<Option<u32>>,
    pub count: u32,
}

/// Rows of a query in projection order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    pub mode: DuplicateMode,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// An empty result over `columns`
    pub fn empty(columns: Vec<String>, mode: DuplicateMode) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            mode,
            execution_time_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Sum of row counts
    pub fn total_count(&self) -> u64 {
        self.rows.iter().map(|r| r.count as u64).sum()
    }

    /// Text rows: values separated by spaces, NULL for unbound values, the
    /// count appended when the mode reports it
    pub fn render(&self, dictionary: &DictionaryHandle) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| {
                let mut line = row
                    .values
                    .iter()
                    .map(|v| dictionary.display(*v))
                    .collect::<Vec<_>>()
                    .join(" ");
                if self.mode.shows_count() {
                    line.push(' ');
                    line.push_str(&row.count.to_string());
                }
                line
            })
            .collect()
    }
}

/// Root of every executable tree
///
/// Pulls the whole input on `first()`, merging adjacent equal rows, and
/// keeps the rows for [`ResultsCollector::take_result`].
pub struct ResultsCollector {
    input: BoxedOperator,
    output: Vec<RegisterRef>,
    columns: Vec<String>,
    mode: DuplicateMode,
    limit: Option<usize>,
    rows: Vec<ResultRow>,
    expected: f64,
    observed: u64,
}

impl ResultsCollector {
    pub fn new(
        input: BoxedOperator,
        output: Vec<RegisterRef>,
        columns: Vec<String>,
        mode: DuplicateMode,
        limit: Option<usize>,
        expected: f64,
    ) -> Self {
        debug_assert_eq!(output.len(), columns.len());
        Self {
            input,
            output,
            columns,
            mode,
            limit,
            rows: Vec::new(),
            expected,
            observed: 0,
        }
    }

    /// Keep a finished row; false once the limit is reached
    fn accept(&mut self, values: Vec<Option<u32>>, count: u32) -> bool {
        if count < self.mode.min_count() {
            return true;
        }
        match self.mode {
            DuplicateMode::Expand => {
                for _ in 0..count {
                    self.rows.push(ResultRow {
                        values: values.clone(),
                        count: 1,
                    });
                }
            }
            DuplicateMode::Reduce => self.rows.push(ResultRow { values, count: 1 }),
            DuplicateMode::Count | DuplicateMode::ShowOnlyDuplicates => {
                self.rows.push(ResultRow { values, count })
            }
        }
        self.observed += 1;
        self.limit.map_or(true, |limit| (self.observed as usize) < limit)
    }

    fn current_values(&self) -> Vec<Option<u32>> {
        self.output
            .iter()
            .map(|r| match r.get() {
                NULL_ID => None,
                v => Some(v),
            })
            .collect()
    }

    /// Hand out the collected rows
    pub fn take_result(&mut self) -> QueryResult {
        QueryResult {
            columns: self.columns.clone(),
            rows: std::mem::take(&mut self.rows),
            mode: self.mode,
            execution_time_ms: 0,
        }
    }
}

impl Operator for ResultsCollector {
    fn first(&mut self) -> u32 {
        self.observed = 0;
        self.rows.clear();
        if self.limit == Some(0) {
            return 1;
        }

        let mut pending: Option<(Vec<Option<u32>>, u32)> = None;
        let mut count = self.input.first();
        while count != 0 {
            let values = self.current_values();
            pending = match pending.take() {
                Some((prev, total)) if prev == values => Some((prev, total.saturating_add(count))),
                Some((prev, total)) => {
                    if !self.accept(prev, total) {
                        return 1;
                    }
                    Some((values, count))
                }
                None => Some((values, count)),
            };
            count = self.input.next();
        }
        if let Some((values, total)) = pending {
            self.accept(values, total);
        }
        1
    }

    fn next(&mut self) -> u32 {
        0
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("ResultsCollector", self.expected, self.observed);
        out.add_materialization_annotation(&self.output);
        self.input.print(out);
        out.end_operator();
    }

    fn add_merge_hint(&mut self, _reg1: &RegisterRef, _reg2: &RegisterRef) {}

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
    use crate::operator::testing::{reg, ValuesScan};
    use crate::storage::{Database, MemoryDatabase};
    use std::sync::Arc;

    fn collect(
        rows: Vec<(Vec<u32>, u32)>,
        mode: DuplicateMode,
        limit: Option<usize>,
    ) -> QueryResult {
        let (x, y) = (reg(0), reg(1));
        let input = ValuesScan::new(&[x.clone(), y.clone()], rows);
        let mut collector = ResultsCollector::new(
            Box::new(input),
            vec![x, y],
            vec!["x".to_string(), "y".to_string()],
            mode,
            limit,
            1.0,
        );
        assert_eq!(collector.first(), 1);
        assert_eq!(collector.next(), 0);
        collector.take_result()
    }

    fn rows(result: &QueryResult) -> Vec<(Vec<Option<u32>>, u32)> {
        result.rows.iter().map(|r| (r.values.clone(), r.count)).collect()
    }

    #[test]
    fn test_duplicate_modes() {
        let input = vec![(vec![1, 2], 2), (vec![1, 2], 1), (vec![3, NULL_ID], 1)];

        let expand = collect(input.clone(), DuplicateMode::Expand, None);
        assert_eq!(expand.len(), 4);
        assert!(expand.rows.iter().all(|r| r.count == 1));

        let reduce = collect(input.clone(), DuplicateMode::Reduce, None);
        assert_eq!(
            rows(&reduce),
            vec![(vec![Some(1), Some(2)], 1), (vec![Some(3), None], 1)]
        );

        let count = collect(input.clone(), DuplicateMode::Count, None);
        assert_eq!(
            rows(&count),
            vec![(vec![Some(1), Some(2)], 3), (vec![Some(3), None], 1)]
        );

        let dups = collect(input, DuplicateMode::ShowOnlyDuplicates, None);
        assert_eq!(rows(&dups), vec![(vec![Some(1), Some(2)], 3)]);
        assert_eq!(dups.total_count(), 3);
    }

    #[test]
    fn test_limit_counts_distinct_rows() {
        let input = vec![(vec![1, 1], 3), (vec![2, 2], 1), (vec![3, 3], 1)];
        let limited = collect(input.clone(), DuplicateMode::Expand, Some(2));
        assert_eq!(limited.len(), 4);
        assert_eq!(limited.rows[3].values, vec![Some(2), Some(2)]);
        assert!(collect(input, DuplicateMode::Count, Some(0)).is_empty());
    }

    #[test]
    fn test_render_and_serialize() {
        let db = Arc::new(MemoryDatabase::new());
        let iri = db.uri("http://example.org/a");
        let text = db.literal("hello");
        let dictionary = DictionaryHandle::new(db.clone() as Arc<dyn Database>, None);
        let result = collect(
            vec![(vec![iri, text], 2), (vec![iri, NULL_ID], 1)],
            DuplicateMode::Count,
            None,
        );
        assert_eq!(
            result.render(&dictionary),
            vec!["http://example.org/a hello 2", "http://example.org/a NULL 1"]
        );

        let json = serde_json::to_string(&result).unwrap();
        let back: QueryResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
