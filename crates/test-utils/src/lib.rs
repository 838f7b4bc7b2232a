//! Shared test utilities for the Daml ledger client crates.
//!
//! - [`strategies`] - proptest generators for identifiers, values and
//!   transaction trees

#![deny(unsafe_code)]

pub mod strategies;
