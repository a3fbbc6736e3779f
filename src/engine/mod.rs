//! Pipeline orchestration
//!
//! The engine alone decides step order and gating; validators never look at
//! each other's results.

pub mod orchestrator;

pub use orchestrator::{preflight, VerificationEngine};
