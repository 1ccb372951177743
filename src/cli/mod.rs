//! CLI module for crunner - command-line interface and subcommands.
//!
//! Provides the daemon entry point plus client subcommands that talk to a
//! running daemon over its socket.

pub mod commands;

pub use commands::Cli;
