//! Process hygiene helpers

pub mod env_hygiene;
pub mod output;
