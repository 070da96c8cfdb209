use crate::cargo::manifest::{CargoManifest, ManifestStore};
use crate::core::error::{ConfigError, RelayError, RelayResult};
use crate::release::unit::UnitSpec;
use cargo_metadata::{MetadataCommand, Package};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Workspace introspection using cargo_metadata
#[derive(Clone)]
pub struct WorkspaceMetadata {
  metadata: cargo_metadata::Metadata,
}

impl WorkspaceMetadata {
  pub fn load(workspace_root: &Path) -> RelayResult<Self> {
    let manifest_path = workspace_root.join("Cargo.toml");
    if !manifest_path.is_file() {
      return Err(RelayError::Config(ConfigError::NotFound {
        workspace_root: workspace_root.to_path_buf(),
      }));
    }

    let metadata = MetadataCommand::new()
      .manifest_path(manifest_path)
      .no_deps()
      .exec()?;
    Ok(Self { metadata })
  }

  pub fn members(&self) -> Vec<&Package> {
    self.metadata.workspace_packages()
  }

  pub fn workspace_root(&self) -> &Path {
    self.metadata.workspace_root.as_std_path()
  }

  pub fn root_manifest_path(&self) -> PathBuf {
    self.workspace_root().join("Cargo.toml")
  }

  /// Read every member manifest (in parallel) into a unit spec
  pub fn unit_specs(&self, store: &dyn ManifestStore) -> RelayResult<Vec<UnitSpec>> {
    let root = store.load(&self.root_manifest_path())?;
    let manifest_paths: Vec<PathBuf> = self
      .members()
      .into_iter()
      .map(|pkg| pkg.manifest_path.clone().into_std_path_buf())
      .collect();

    manifest_paths
      .par_iter()
      .map(|path| {
        let manifest = store.load(path)?;
        self.unit_spec(&manifest, &root)
      })
      .collect()
  }

  fn unit_spec(&self, manifest: &CargoManifest, root: &CargoManifest) -> RelayResult<UnitSpec> {
    let manifest_path = manifest.path().to_path_buf();
    let dir = manifest_path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| self.workspace_root().to_path_buf());
    let name = match manifest.package_name() {
      Some(name) => name.to_string(),
      None => dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
    };

    let spec = UnitSpec {
      name,
      manifest_version: manifest.version()?,
      private: manifest.is_private(),
      requirements: manifest.requirements(Some(root)),
      dir,
      manifest_path,
    };
    debug!(unit = %spec.name, version = %spec.manifest_version, "loaded manifest");
    Ok(spec)
  }
}
