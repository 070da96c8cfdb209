//! Cross-unit coordination for a release run

pub mod synchronizer;

pub use synchronizer::{Probe, Synchronizer};
