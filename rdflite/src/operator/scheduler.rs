// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Ahead-of-time execution of independent subtrees
//!
//! Operators announce work that does not depend on the main pull loop (a
//! hash table build, the first tuple of a probe side) as [`AsyncPoint`]s.
//! With worker threads configured the scheduler runs those points on a rayon
//! pool, respecting their dependencies, before it drives the root operator.

use super::Operator;
use std::sync::mpsc;
use std::sync::Arc;

/// A unit of work that may run on a worker thread
///
/// `run` must be idempotent: the operator that registered the point calls it
/// again when it is pulled, and only the first call does any work.
pub trait AsyncPoint: Send + Sync {
    fn run(&self);

    /// Name used in log output
    fn name(&self) -> &'static str;
}

struct RegisteredPoint {
    point: Arc<dyn AsyncPoint>,
    class: u32,
    priority: f64,
    dependencies: Vec<usize>,
}

/// Collects async points and executes operator trees
pub struct Scheduler {
    threads: usize,
    points: Vec<RegisteredPoint>,
}

impl Scheduler {
    /// `threads` below two means everything runs on the calling thread
    pub fn new(threads: usize) -> Self {
        let threads = if (2..=1000).contains(&threads) { threads } else { 0 };
        Self {
            threads,
            points: Vec::new(),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Number of points registered so far; pass it back as
    /// `first_dependency` to depend on everything registered afterwards
    pub fn registered_points(&self) -> usize {
        self.points.len()
    }

    /// Register a point. It depends on all points registered at or after
    /// index `first_dependency`. Lower classes run first; within a class
    /// higher priorities win.
    pub fn register_async_point(
        &mut self,
        point: Arc<dyn AsyncPoint>,
        class: u32,
        priority: f64,
        first_dependency: usize,
    ) {
        let dependencies = (first_dependency..self.points.len()).collect();
        self.points.push(RegisteredPoint {
            point,
            class,
            priority,
            dependencies,
        });
    }

    /// Run the whole tree to exhaustion
    pub fn execute(&mut self, root: &mut dyn Operator) {
        if self.threads > 0 {
            self.points.clear();
            root.async_input_candidates(self);
            if !self.points.is_empty() {
                self.run_points();
            }
            self.points.clear();
        }

        if root.first() != 0 {
            while root.next() != 0 {}
        }
    }

    /// Best ready point: no open dependencies, lowest class, highest priority
    fn pick(&self, started: &[bool], finished: &[bool]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (index, point) in self.points.iter().enumerate() {
            if started[index] || point.dependencies.iter().any(|d| !finished[*d]) {
                continue;
            }
            best = match best {
                None => Some(index),
                Some(b) => {
                    let current = &self.points[b];
                    if point.class < current.class
                        || (point.class == current.class && point.priority > current.priority)
                    {
                        Some(index)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best
    }

    fn run_points(&self) {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!("could not start worker pool, running async points inline: {}", e);
                self.run_points_inline();
                return;
            }
        };

        let count = self.points.len();
        let mut started = vec![false; count];
        let mut finished = vec![false; count];
        let (tx, rx) = mpsc::channel::<usize>();

        pool.scope(move |scope| {
            let mut running = 0usize;
            loop {
                while running < self.threads {
                    let Some(index) = self.pick(&started, &finished) else {
                        break;
                    };
                    started[index] = true;
                    running += 1;
                    let point = self.points[index].point.clone();
                    log::debug!(
                        "dispatching {} (class {}, priority {})",
                        point.name(),
                        self.points[index].class,
                        self.points[index].priority
                    );
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        point.run();
                        let _ = tx.send(index);
                    });
                }
                if running == 0 {
                    break;
                }
                match rx.recv() {
                    Ok(index) => {
                        running -= 1;
                        finished[index] = true;
                    }
                    Err(_) => break,
                }
            }
        });
    }

    fn run_points_inline(&self) {
        let count = self.points.len();
        let mut started = vec![false; count];
        let mut finished = vec![false; count];
        while let Some(index) = self.pick(&started, &finished) {
            started[index] = true;
            self.points[index].point.run();
            finished[index] = true;
        }
    }
}
