//! Core building blocks shared by every cargo-relay command
//!
//! - **config**: relay.toml parsing, validation and CLI overrides
//! - **context**: workspace context, loaded once in main
//! - **error**: error types with contextual help messages and exit codes
//! - **logging**: tracing subscriber setup
//! - **vcs**: git operations abstraction (SystemGit)

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod vcs;
