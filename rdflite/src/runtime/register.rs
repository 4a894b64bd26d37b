// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Registers: the single-value slots operators communicate through

use super::domain::PotentialDomain;
use crate::storage::NULL_ID;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared handle to a register owned by the runtime's register array
pub type RegisterRef = Arc<Register>;

/// A mutable value slot plus an optional potential domain
///
/// Values are stored atomically so that operator subtrees can be handed to
/// worker threads; a register is only ever written by one subtree at a time.
#[derive(Debug)]
pub struct Register {
    slot: usize,
    value: AtomicU32,
    domain: OnceCell<Arc<PotentialDomain>>,
}

impl Register {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            value: AtomicU32::new(NULL_ID),
            domain: OnceCell::new(),
        }
    }

    /// Position in the runtime's register array
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: u32) {
        self.value.store(value, Ordering::Relaxed)
    }

    /// Reset to NULL
    #[inline]
    pub fn clear(&self) {
        self.set(NULL_ID)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.get() == NULL_ID
    }

    /// The shared potential domain, if the register belongs to a join variable
    pub fn domain(&self) -> Option<&Arc<PotentialDomain>> {
        self.domain.get()
    }

    /// Attach a potential domain. Only the first attachment wins.
    pub fn attach_domain(&self, domain: Arc<PotentialDomain>) -> bool {
        self.domain.set(domain).is_ok()
    }
}

/// Registers are compared by identity
pub fn same_register(a: &RegisterRef, b: &RegisterRef) -> bool {
    Arc::ptr_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_starts_unbound() {
        let r = Register::new(4);
        assert!(r.is_null());
        r.set(17);
        assert_eq!(r.get(), 17);
        r.clear();
        assert_eq!(r.get(), NULL_ID);
        assert_eq!(r.slot(), 4);
    }

    #[test]
    fn test_domain_attaches_once() {
        let r = Register::new(0);
        assert!(r.attach_domain(Arc::new(PotentialDomain::new())));
        assert!(!r.attach_domain(Arc::new(PotentialDomain::new())));
        assert!(r.domain().is_some());
    }
}
