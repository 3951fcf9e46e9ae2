//! Storage abstraction and implementations for fieldops.
//!
//! This crate provides a trait-based storage interface with a JSON-file
//! reference implementation and an in-memory backend for tests and
//! ephemeral deployments.

#![warn(missing_docs)]

pub mod json_store;
pub mod memory;
pub mod trait_;

pub use json_store::JsonStore;
pub use memory::MemoryStore;
pub use trait_::{Result, Store, StoreError};
