//! Publishing crates to crates.io

use crate::core::error::{RelayError, RelayResult, ResultExt};
use crate::release::unit::Unit;
use async_trait::async_trait;
use semver::Version;
use serde::Serialize;
use std::env;
use tokio::process::Command;

/// What a successful release produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseDescriptor {
  pub name: String,
  pub version: Version,
  /// Where the release can be found, if it was uploaded
  pub url: Option<String>,
}

/// Package registry used by the release pipeline
#[async_trait]
pub trait Registry: Send + Sync {
  /// Check that the crate can be published at all
  async fn verify(&self, unit: &Unit) -> RelayResult<()>;

  /// Package the crate ahead of upload
  async fn prepare(&self, unit: &Unit, version: &Version) -> RelayResult<()>;

  /// Upload the crate
  async fn publish(&self, unit: &Unit, version: &Version) -> RelayResult<ReleaseDescriptor>;
}

/// crates.io through `cargo package` / `cargo publish`
#[derive(Debug, Clone)]
pub struct CargoRegistry {
  upload: bool,
}

impl CargoRegistry {
  pub fn new(upload: bool) -> Self {
    Self { upload }
  }

  fn uploads(&self, unit: &Unit) -> bool {
    self.upload && !unit.private
  }

  async fn cargo(&self, subcommand: &str, unit: &Unit) -> RelayResult<()> {
    let output = Command::new("cargo")
      .arg(subcommand)
      .arg("--manifest-path")
      .arg(&unit.manifest_path)
      .arg("--allow-dirty")
      .output()
      .await
      .with_context(|| format!("Failed to run cargo {}", subcommand))?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(RelayError::message(format!(
        "cargo {} failed for {}:\n{}",
        subcommand,
        unit.name,
        stderr.trim()
      )));
    }
    Ok(())
  }
}

#[async_trait]
impl Registry for CargoRegistry {
  async fn verify(&self, unit: &Unit) -> RelayResult<()> {
    if self.uploads(unit) && env::var("CARGO_REGISTRY_TOKEN").is_err() {
      return Err(RelayError::with_help(
        "CARGO_REGISTRY_TOKEN not found in environment",
        "Set your token with `export CARGO_REGISTRY_TOKEN=<your-token>` (get one from https://crates.io/me), or pass --no-publish",
      ));
    }
    Ok(())
  }

  async fn prepare(&self, unit: &Unit, _version: &Version) -> RelayResult<()> {
    if !self.uploads(unit) {
      return Ok(());
    }
    self.cargo("package", unit).await
  }

  async fn publish(&self, unit: &Unit, version: &Version) -> RelayResult<ReleaseDescriptor> {
    if !self.uploads(unit) {
      return Ok(ReleaseDescriptor {
        name: unit.name.clone(),
        version: version.clone(),
        url: None,
      });
    }

    self.cargo("publish", unit).await?;
    Ok(ReleaseDescriptor {
      name: unit.name.clone(),
      version: version.clone(),
      url: Some(format!("https://crates.io/crates/{}/{}", unit.name, version)),
    })
  }
}
