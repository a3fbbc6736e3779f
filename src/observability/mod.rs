//! Observability
//!
//! Structured audit events for every verification run.

pub mod audit;
