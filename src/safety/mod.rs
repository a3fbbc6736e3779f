//! Safety and cleanup
//!
//! Run-scoped workspaces that are removed on every exit path.

pub mod workspace;
