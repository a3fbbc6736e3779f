//! Validation steps
//!
//! Each validator owns one step and turns every defect it finds into an
//! [`Issue`](crate::config::types::Issue); none of them aborts on the first
//! defect.

pub mod domain;
pub mod format;
pub mod media;
pub mod output;
pub mod samples;
pub mod structure;
