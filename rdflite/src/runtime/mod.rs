// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Runtime state shared by the operators of a query
//!
//! - [`Register`]: value slots wired between operators
//! - [`PotentialDomain`] / [`ObservedDomain`]: value summaries used to skip
//! - [`Runtime`]: register and domain arrays plus the storage handles
//! - [`DifferentialIndex`] / [`BulkOperation`]: pending updates

pub mod bulk;
pub mod differential;
pub mod domain;
pub mod register;
#[allow(clippy::module_inception)]
pub mod runtime;

pub use bulk::BulkOperation;
pub use differential::{
    resolve_states, DeltaState, DifferentialIndex, PendingLiteral, ScanPin, VersionSet,
    VersionedTriple,
};
pub use domain::{ObservedDomain, PotentialDomain};
pub use register::{same_register, Register, RegisterRef};
pub use runtime::{DictionaryHandle, Runtime, TableFunctionError, TableFunctionHandler};
