//! Request handlers for the daemon
//!
//! Each submodule handles a category of IPC methods:
//! - compile: source submission and compilation
//! - run: run lifecycle (start, poll)

pub mod compile;
pub mod run;

pub use compile::*;
pub use run::*;
