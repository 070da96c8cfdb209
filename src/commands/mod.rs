//! CLI commands for cargo-relay
//!
//! - **run**: release every changed crate, in dependency order
//! - **plan**: dry-run that prints the release decisions (table or JSON)
//!
//! Both commands take `&WorkspaceContext` so the workspace is loaded once.

pub mod plan;
pub mod run;

pub use plan::run_plan;
pub use run::run_release;
