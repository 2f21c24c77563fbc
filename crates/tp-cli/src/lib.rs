//! Activity post CLI library.
//!
//! This crate provides the CLI interface for creating and reconciling posts.

mod cli;
pub mod commands;
mod config;
mod console;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use console::Console;
