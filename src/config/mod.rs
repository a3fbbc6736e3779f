//! Configuration and policy
//!
//! Data model, verifier configuration, declarative submission policy and
//! startup validation.

pub mod loader;
pub mod policy;
pub mod types;
pub mod validator;
