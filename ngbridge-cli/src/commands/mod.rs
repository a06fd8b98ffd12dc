//! Subcommand implementations.

pub mod copy;
pub mod draw;
pub mod notify;
