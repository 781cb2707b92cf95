//! CLI module for leadflow - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
