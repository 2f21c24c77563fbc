//! CLI subcommand implementations.

pub mod load;
