//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented contracts for items and source state.
//! - Isolate file-system layout details from the reconciliation engine.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `AlreadyExists`,
//!   `CorruptRecord`) in addition to IO errors.
//! - No dirty in-memory item state survives a call boundary.

pub mod file_store;
pub mod item_repo;
pub mod state_repo;
