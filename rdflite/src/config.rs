// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution configuration

use serde::{Deserialize, Serialize};

/// Environment variable overriding the worker thread count
pub const MAX_THREADS_ENV: &str = "RDFLITE_MAXTHREADS";

/// Configuration of the execution engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker threads used to run async points ahead of the main pull loop.
    /// Fewer than two means single-threaded execution.
    pub worker_threads: usize,

    /// Initial state of the scan skip switch
    pub skip_scans: bool,

    /// Initial bucket count of hash join tables (rounded up to a power of two)
    pub hash_table_initial_size: usize,

    /// Show observed cardinalities when printing plans
    pub show_observed_cardinalities: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            skip_scans: true,
            hash_table_initial_size: 1024,
            show_observed_cardinalities: false,
        }
    }
}

impl ExecutionConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(MAX_THREADS_ENV) {
            match value.trim().parse::<usize>() {
                Ok(threads) => config.worker_threads = threads,
                Err(_) => log::warn!("ignoring {}={}", MAX_THREADS_ENV, value),
            }
        }
        config
    }

    /// Worker threads actually used; 0 means run on the calling thread
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads < 2 || self.worker_threads > 1000 {
            0
        } else {
            self.worker_threads
        }
    }

    /// Hash table bucket count as a power of two
    pub fn hash_table_size(&self) -> usize {
        self.hash_table_initial_size.max(16).next_power_of_two()
    }
}
