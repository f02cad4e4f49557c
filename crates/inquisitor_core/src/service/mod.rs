//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and source calls into use-case level APIs.
//! - Keep presentation and CLI layers decoupled from storage details.

pub mod error_report;
pub mod item_service;
pub mod reconcile;
