//! genverify: admission gate for dataset generator submissions
//!
//! A submission arrives as a zip archive. It is unpacked into a throwaway
//! directory, checked for the required layout and naming conventions, and,
//! if those checks pass, executed once inside an isolated environment whose
//! output is then inspected sample by sample.
//!
//! # Architecture
//!
//! ## Configuration & Policy ([`config`])
//! - [`config::types`]: Issues, step results, run results, errors
//! - [`config::policy`]: Declarative submission policy tables
//! - [`config::loader`]: Verifier configuration and JSON loading
//! - [`config::validator`]: Startup config validation
//!
//! ## Pipeline
//! - [`archive::extractor`]: Archive extraction and root resolution
//! - [`validators`]: Structure, format and output steps
//! - [`engine`]: Step ordering and gating
//! - [`report`]: JSON and text reports
//!
//! ## Execution Control
//! - [`sandbox`]: Runtime adapters and the sandbox state machine
//! - [`exec::executor`]: Process execution with hard wall-clock timeouts
//! - [`safety::workspace`]: Run-scoped workspace isolation
//! - [`utils::env_hygiene`]: Environment hygiene
//! - [`utils::output`]: Bounded output collection
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events

// Configuration & Policy
pub mod config;

// Pipeline
pub mod archive;
pub mod engine;
pub mod report;
pub mod validators;

// Execution Control
pub mod exec;
pub mod safety;
pub mod sandbox;
pub mod utils;

// Observability
pub mod observability;

// CLI entrypoint wiring for the genverify binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
pub use engine::{preflight, VerificationEngine};
pub use report::ReportGenerator;
