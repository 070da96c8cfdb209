//! Cargo workspace integration
//!
//! - **metadata**: Enumerate workspace members using cargo_metadata
//! - **manifest**: Read and edit Cargo.toml files with toml_edit
//! - **registry**: Package and publish crates through cargo

pub mod manifest;
pub mod metadata;
pub mod registry;
