//! Source adapter contracts and in-process registration.
//!
//! Sources are compiled in and registered by name; runtime code loading is
//! not supported.

pub mod adapter;
pub mod registry;
