//! Coordinated release of interdependent workspace crates
//!
//! Every crate is a [`unit::Unit`] driven by its own task through the release
//! lifecycle. The pieces:
//!
//! - **commits / severity**: classify history since the last tag into a severity
//! - **propagation**: raise dependents' severities through local dependency edges
//! - **prerelease**: `X.Y.Z-<id>.N` versions for a pre-release channel
//! - **resolver**: decide how dependents' version requirements change
//! - **notes / tags**: render release notes and tag names
//! - **driver**: the per-unit pipeline, coordinated through the synchronizer
//! - **run**: build the graph, spawn the pipelines, report the outcome
//!
//! # Example relay.toml
//!
//! ```toml
//! [release]
//! tag_format = "{name}@v{version}"
//!
//! [deps]
//! strategy = "satisfy"
//! release = "inherit"
//! ```

pub mod commits;
pub mod driver;
pub mod notes;
pub mod prerelease;
pub mod propagation;
pub mod resolver;
pub mod run;
pub mod severity;
pub mod tags;
pub mod unit;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::Collaborators;
pub use run::{RunReport, execute};
