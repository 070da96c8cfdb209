//! Workspace context - build once in main, pass to every command
//!
//! Loads cargo metadata, relay.toml and the git repository a single time. Commands
//! turn the context into a set of collaborators plus resolved options.

use crate::cargo::manifest::{FsManifestStore, ManifestStore};
use crate::cargo::metadata::WorkspaceMetadata;
use crate::cargo::registry::CargoRegistry;
use crate::core::config::{RelayConfig, ReleaseOptions, ReleaseOverrides};
use crate::core::error::RelayResult;
use crate::core::vcs::SystemGit;
use crate::release::Collaborators;
use crate::release::unit::UnitSpec;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Everything a release command needs about the workspace
pub struct WorkspaceContext {
  /// Workspace root directory (absolute path)
  pub root: PathBuf,

  /// Cargo metadata (workspace members)
  pub metadata: WorkspaceMetadata,

  /// relay.toml, or defaults when there is none
  pub config: RelayConfig,

  git: Arc<SystemGit>,
}

impl WorkspaceContext {
  /// Load metadata, config and the git repository for `workspace_root`
  pub async fn build(workspace_root: &Path) -> RelayResult<Self> {
    let metadata = WorkspaceMetadata::load(workspace_root)?;
    let root = metadata.workspace_root().to_path_buf();
    let config = RelayConfig::load(&root)?;
    let git = Arc::new(SystemGit::open(&root).await?);
    debug!(root = %root.display(), members = metadata.members().len(), "workspace loaded");

    Ok(Self {
      root,
      metadata,
      config,
      git,
    })
  }

  /// Resolve run options from relay.toml and command-line overrides
  pub fn options(&self, overrides: ReleaseOverrides) -> RelayResult<ReleaseOptions> {
    self.config.resolve(overrides)
  }

  /// Unit specs for every workspace member
  pub fn unit_specs(&self) -> RelayResult<Vec<UnitSpec>> {
    self.metadata.unit_specs(&FsManifestStore)
  }

  /// Production collaborators: system git, the cargo registry and manifests on disk
  pub fn collaborators(&self, options: &ReleaseOptions) -> Collaborators {
    let manifests: Arc<dyn ManifestStore> = Arc::new(FsManifestStore);
    Collaborators {
      vcs: self.git.clone(),
      registry: Arc::new(CargoRegistry::new(options.publish)),
      manifests,
    }
  }

  pub fn root_manifest_path(&self) -> PathBuf {
    self.metadata.root_manifest_path()
  }
}
