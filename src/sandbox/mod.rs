//! Sandbox runtimes.
//!
//! The session drives a fixed state machine; adapters define the command
//! for each stage of a given runtime.

pub mod adapter;
pub mod python;
pub mod session;
