//! Subcommand implementations

pub mod alert;
pub mod patch;
pub mod show;
