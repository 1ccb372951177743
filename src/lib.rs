//! Crunner - compile and run C programs behind a polling gateway
//!
//! Submitted sources are compiled with the host toolchain, launched as
//! supervised processes, and observed through repeated polls until their
//! records are reclaimed after a retention window.

pub mod compiler;
pub mod config;
pub mod daemon;
pub mod error;
pub mod id;
pub mod ipc;
pub mod jobs;
pub mod workspace;

pub use error::{CrunnerError, Result};
