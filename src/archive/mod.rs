//! Submission archives

pub mod extractor;
