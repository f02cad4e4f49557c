//! Domain model for aggregated items.
//!
//! # Responsibility
//! - Define the stored item record and the candidate shape adapters return.
//! - Keep lifecycle policy helpers (`ttl`, `ttd`, `tts`) next to the data.
//!
//! # Invariants
//! - Every stored item is identified by its `(source, id)` pair.
//! - `created` is stamped once at creation and never changes afterwards.

pub mod item;
