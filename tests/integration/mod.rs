//! Integration tests for cargo-relay: real git repositories, real Cargo workspaces

mod helpers;
mod test_plan;
mod test_run;
