// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Materializing sort

use super::{BoxedOperator, Operator, PlanPrinter, Scheduler};
use crate::runtime::{same_register, DictionaryHandle, RegisterRef};
use crate::storage::{Dictionary, Literal, NULL_ID};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One sort criterion; `slot == None` sorts by multiplicity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SortKey {
    slot: Option<usize>,
    descending: bool,
}

/// Drains its input and replays it ordered by literal value
///
/// Values are compared by type, then sub-type, then text bytes, with NULL
/// before everything else.
pub struct Sort {
    input: BoxedOperator,
    values: Vec<RegisterRef>,
    order: Vec<SortKey>,
    dictionary: DictionaryHandle,
    tuples: Vec<(Vec<u32>, u32)>,
    pos: usize,
    expected: f64,
    observed: u64,
}

impl Sort {
    /// `order` lists (register, descending); a `None` register orders by
    /// count. Registers outside `values` are ignored.
    pub fn new(
        input: BoxedOperator,
        values: Vec<RegisterRef>,
        order: &[(Option<RegisterRef>, bool)],
        dictionary: DictionaryHandle,
        expected: f64,
    ) -> Self {
        let order = order
            .iter()
            .filter_map(|(reg, descending)| match reg {
                None => Some(SortKey {
                    slot: None,
                    descending: *descending,
                }),
                Some(reg) => values
                    .iter()
                    .position(|v| same_register(v, reg))
                    .map(|slot| SortKey {
                        slot: Some(slot),
                        descending: *descending,
                    }),
            })
            .collect();
        Self {
            input,
            values,
            order,
            dictionary,
            tuples: Vec::new(),
            pos: 0,
            expected,
            observed: 0,
        }
    }

    fn compare_ids(
        literals: &HashMap<u32, Option<Literal>>,
        v1: u32,
        v2: u32,
    ) -> Ordering {
        if v1 == v2 {
            return Ordering::Equal;
        }
        if v1 == NULL_ID {
            return Ordering::Less;
        }
        if v2 == NULL_ID {
            return Ordering::Greater;
        }
        let (Some(Some(a)), Some(Some(b))) = (literals.get(&v1), literals.get(&v2)) else {
            // unknown ids do not decide
            return Ordering::Equal;
        };
        a.literal_type
            .cmp(&b.literal_type)
            .then_with(|| {
                if a.literal_type.has_sub_type() {
                    a.sub_type.cmp(&b.sub_type)
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| a.text.as_bytes().cmp(b.text.as_bytes()))
            .then_with(|| v1.cmp(&v2))
    }

    fn compare(
        order: &[SortKey],
        literals: &HashMap<u32, Option<Literal>>,
        a: &(Vec<u32>, u32),
        b: &(Vec<u32>, u32),
    ) -> Ordering {
        for key in order {
            let ord = match key.slot {
                Some(slot) => {
                    let (v1, v2) = if key.descending {
                        (b.0[slot], a.0[slot])
                    } else {
                        (a.0[slot], b.0[slot])
                    };
                    Self::compare_ids(literals, v1, v2)
                }
                None if key.descending => b.1.cmp(&a.1),
                None => a.1.cmp(&b.1),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl Operator for Sort {
    fn first(&mut self) -> u32 {
        self.observed = 0;

        self.tuples.clear();
        let mut count = self.input.first();
        while count != 0 {
            self.tuples
                .push((self.values.iter().map(|r| r.get()).collect(), count));
            count = self.input.next();
        }

        // resolve every sort value once
        let mut literals: HashMap<u32, Option<Literal>> = HashMap::new();
        for key in &self.order {
            if let Some(slot) = key.slot {
                for (values, _) in &self.tuples {
                    let id = values[slot];
                    if id != NULL_ID {
                        literals
                            .entry(id)
                            .or_insert_with(|| self.dictionary.lookup_by_id(id));
                    }
                }
            }
        }

        let order = &self.order;
        self.tuples
            .sort_by(|a, b| Self::compare(order, &literals, a, b));

        self.pos = 0;
        self.next()
    }

    fn next(&mut self) -> u32 {
        let Some((values, count)) = self.tuples.get(self.pos) else {
            return 0;
        };
        for (reg, value) in self.values.iter().zip(values) {
            reg.set(*value);
        }
        let count = *count;
        self.pos += 1;
        self.observed += count as u64;
        count
    }

    fn print(&self, out: &mut dyn PlanPrinter) {
        out.begin_operator("Sort", self.expected, self.observed);
        let keys: Vec<String> = self
            .order
            .iter()
            .map(|key| {
                let name = match key.slot {
                    Some(slot) => out.format_register(&self.values[slot]),
                    None => "count".to_string(),
                };
                if key.descending {
                    format!("{} desc", name)
                } else {
                    name
                }
            })
            .collect();
        out.add_generic_annotation(&format!("[{}]", keys.join(" ")));
        out.add_materialization_annotation(&self.values);
        self.input.print(out);
        out.end_operator();
    }

    // output order differs from the input's
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
    use crate::operator::testing::{drain, reg, ValuesScan};
    use crate::storage::{Database, MemoryDatabase};
    use std::sync::Arc;

    fn fixture() -> (Arc<MemoryDatabase>, DictionaryHandle) {
        let db = Arc::new(MemoryDatabase::new());
        let handle = DictionaryHandle::new(db.clone() as Arc<dyn Database>, None);
        (db, handle)
    }

    #[test]
    fn test_sorts_by_literal_text_not_id() {
        let (db, dictionary) = fixture();
        let pear = db.literal("pear");
        let apple = db.literal("apple");
        let fig = db.literal("fig");
        let x = reg(0);
        let input = ValuesScan::ones(&[x.clone()], &[&[pear], &[apple], &[NULL_ID], &[fig]]);
        let mut sort = Sort::new(
            Box::new(input),
            vec![x.clone()],
            &[(Some(x.clone()), false)],
            dictionary.clone(),
            4.0,
        );
        let order: Vec<u32> = drain(&mut sort, &[x.clone()]).into_iter().map(|r| r.0[0]).collect();
        assert_eq!(order, vec![NULL_ID, apple, fig, pear]);

        let input = ValuesScan::ones(&[x.clone()], &[&[pear], &[apple], &[fig]]);
        let mut sort = Sort::new(
            Box::new(input),
            vec![x.clone()],
            &[(Some(x.clone()), true)],
            dictionary,
            3.0,
        );
        let order: Vec<u32> = drain(&mut sort, &[x]).into_iter().map(|r| r.0[0]).collect();
        assert_eq!(order, vec![pear, fig, apple]);
    }

    #[test]
    fn test_iris_sort_before_literals() {
        let (db, dictionary) = fixture();
        let text = db.literal("a");
        let iri = db.uri("http://z.example/");
        let x = reg(0);
        let mut sort = Sort::new(
            Box::new(ValuesScan::ones(&[x.clone()], &[&[text], &[iri]])),
            vec![x.clone()],
            &[(Some(x.clone()), false)],
            dictionary,
            2.0,
        );
        let order: Vec<u32> = drain(&mut sort, &[x]).into_iter().map(|r| r.0[0]).collect();
        assert_eq!(order, vec![iri, text]);
    }

    #[test]
    fn test_sort_by_count_then_value() {
        let (db, dictionary) = fixture();
        let (a, b, c) = (db.literal("a"), db.literal("b"), db.literal("c"));
        let x = reg(0);
        let input = ValuesScan::new(
            &[x.clone()],
            vec![(vec![c], 1), (vec![a], 5), (vec![b], 1)],
        );
        let mut sort = Sort::new(
            Box::new(input),
            vec![x.clone()],
            &[(None, true), (Some(x.clone()), false)],
            dictionary,
            3.0,
        );
        assert_eq!(
            drain(&mut sort, &[x]),
            vec![(vec![a], 5), (vec![b], 1), (vec![c], 1)]
        );
        assert_eq!(sort.observed_cardinality(), 7);
    }
}
