//! In-memory collaborators for release pipeline tests

use crate::cargo::manifest::{CargoManifest, ManifestStore};
use crate::cargo::registry::{Registry, ReleaseDescriptor};
use crate::core::error::{GitError, RelayError, RelayResult};
use crate::core::vcs::{CommitInfo, LastRelease, VersionControl};
use crate::release::driver::Collaborators;
use crate::release::prerelease::Channel;
use crate::release::tags::TagFormat;
use crate::release::unit::{Unit, UnitSpec};
use async_trait::async_trait;
use parking_lot::Mutex;
use semver::Version;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) const ROOT_MANIFEST: &str = "Cargo.toml";

/// Manifests kept as strings, keyed by path
#[derive(Default)]
pub(crate) struct MemoryManifestStore {
  files: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryManifestStore {
  pub(crate) fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
    self.files.lock().insert(path.into(), content.into());
  }

  pub(crate) fn content(&self, path: impl AsRef<Path>) -> String {
    self.files.lock().get(path.as_ref()).cloned().unwrap_or_default()
  }
}

impl ManifestStore for MemoryManifestStore {
  fn load(&self, path: &Path) -> RelayResult<CargoManifest> {
    let content = self
      .files
      .lock()
      .get(path)
      .cloned()
      .ok_or_else(|| RelayError::message(format!("no manifest at {}", path.display())))?;
    CargoManifest::parse(path, &content)
  }

  fn save(&self, manifest: &CargoManifest) -> RelayResult<()> {
    self.insert(manifest.path(), manifest.to_string());
    Ok(())
  }
}

/// Git history and tags held in memory
#[derive(Default)]
pub(crate) struct FakeVcs {
  releases: Mutex<HashMap<String, LastRelease>>,
  commits: Mutex<HashMap<String, Vec<CommitInfo>>>,
  pub(crate) release_commits: Mutex<Vec<String>>,
  pub(crate) tags: Mutex<Vec<String>>,
  pub(crate) fail_tags: Mutex<HashSet<String>>,
  writers: AtomicUsize,
  pub(crate) max_writers: AtomicUsize,
}

#[async_trait]
impl VersionControl for FakeVcs {
  async fn verify(&self) -> RelayResult<()> {
    Ok(())
  }

  async fn last_release(
    &self,
    unit: &Unit,
    _format: &TagFormat,
    _channel: Option<&Channel>,
  ) -> RelayResult<Option<LastRelease>> {
    Ok(self.releases.lock().get(&unit.name).cloned())
  }

  async fn commits(&self, unit: &Unit, _since: Option<&str>, _first_parent: bool) -> RelayResult<Vec<CommitInfo>> {
    Ok(self.commits.lock().get(&unit.name).cloned().unwrap_or_default())
  }

  async fn commit_release(&self, _paths: &[PathBuf], message: &str) -> RelayResult<String> {
    let writers = self.writers.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_writers.fetch_max(writers, Ordering::SeqCst);
    tokio::task::yield_now().await;
    self.release_commits.lock().push(message.to_string());
    self.writers.fetch_sub(1, Ordering::SeqCst);
    Ok(format!("{:07}", self.release_commits.lock().len()))
  }

  async fn create_tag(&self, tag: &str, _message: &str) -> RelayResult<()> {
    if self.fail_tags.lock().contains(tag) || self.tags.lock().iter().any(|t| t == tag) {
      return Err(RelayError::Git(GitError::TagExists { tag: tag.to_string() }));
    }
    self.tags.lock().push(tag.to_string());
    Ok(())
  }
}

/// Registry that records uploads
#[derive(Default)]
pub(crate) struct FakeRegistry {
  pub(crate) published: Mutex<Vec<String>>,
  pub(crate) fail_publish: Mutex<HashSet<String>>,
  pub(crate) fail_verify: Mutex<HashSet<String>>,
}

#[async_trait]
impl Registry for FakeRegistry {
  async fn verify(&self, unit: &Unit) -> RelayResult<()> {
    if self.fail_verify.lock().contains(&unit.name) {
      return Err(RelayError::message(format!("{} has no registry credentials", unit.name)));
    }
    Ok(())
  }

  async fn prepare(&self, _unit: &Unit, _version: &Version) -> RelayResult<()> {
    tokio::task::yield_now().await;
    Ok(())
  }

  async fn publish(&self, unit: &Unit, version: &Version) -> RelayResult<ReleaseDescriptor> {
    if self.fail_publish.lock().contains(&unit.name) {
      return Err(RelayError::message(format!("upload of {} rejected", unit.name)));
    }
    self.published.lock().push(unit.name.clone());
    Ok(ReleaseDescriptor {
      name: unit.name.clone(),
      version: version.clone(),
      url: (!unit.private).then(|| format!("https://registry.test/{}/{}", unit.name, version)),
    })
  }
}

/// A workspace assembled from in-memory manifests and history
pub(crate) struct FakeWorkspace {
  names: Vec<String>,
  pub(crate) manifests: Arc<MemoryManifestStore>,
  pub(crate) vcs: Arc<FakeVcs>,
  pub(crate) registry: Arc<FakeRegistry>,
}

impl FakeWorkspace {
  pub(crate) fn new() -> Self {
    Self::with_root("[workspace]\nmembers = [\"crates/*\"]\nresolver = \"2\"\n")
  }

  pub(crate) fn with_root(root: &str) -> Self {
    let manifests = Arc::new(MemoryManifestStore::default());
    manifests.insert(ROOT_MANIFEST, root);
    Self {
      names: Vec::new(),
      manifests,
      vcs: Arc::new(FakeVcs::default()),
      registry: Arc::new(FakeRegistry::default()),
    }
  }

  pub(crate) fn manifest_path(name: &str) -> PathBuf {
    PathBuf::from("crates").join(name).join("Cargo.toml")
  }

  /// Add a member whose `[dependencies]` table holds `deps` (raw TOML values)
  pub(crate) fn member(self, name: &str, version: &str, deps: &[(&str, &str)]) -> Self {
    let mut content = format!("[package]\nname = \"{}\"\nversion = \"{}\"\nedition = \"2021\"\n", name, version);
    if !deps.is_empty() {
      content.push_str("\n[dependencies]\n");
      for (dep, value) in deps {
        content.push_str(&format!("{} = {}\n", dep, value));
      }
    }
    self.raw_member(name, &content)
  }

  pub(crate) fn raw_member(mut self, name: &str, content: &str) -> Self {
    self.manifests.insert(Self::manifest_path(name), content);
    self.names.push(name.to_string());
    self
  }

  /// Record `name` as released at `version`
  pub(crate) fn released(self, name: &str, version: &str) -> Self {
    let version = Version::parse(version).unwrap();
    self.vcs.releases.lock().insert(
      name.to_string(),
      LastRelease {
        tag: format!("{}@v{}", name, version),
        version,
        git_head: "feedbee".to_string(),
      },
    );
    self
  }

  pub(crate) fn commit(self, name: &str, subject: &str) -> Self {
    let mut commits = self.vcs.commits.lock();
    let list = commits.entry(name.to_string()).or_default();
    let sha = format!("{:040}", list.len() + 1);
    list.push(CommitInfo::new(sha, subject, ""));
    drop(commits);
    self
  }

  /// Unit specs read back from the stored manifests
  pub(crate) fn specs(&self) -> Vec<UnitSpec> {
    let root = self.manifests.load(Path::new(ROOT_MANIFEST)).unwrap();
    self
      .names
      .iter()
      .map(|name| {
        let path = Self::manifest_path(name);
        let manifest = self.manifests.load(&path).unwrap();
        UnitSpec {
          name: name.clone(),
          dir: path.parent().unwrap().to_path_buf(),
          manifest_version: manifest.version().unwrap(),
          private: manifest.is_private(),
          requirements: manifest.requirements(Some(&root)),
          manifest_path: path,
        }
      })
      .collect()
  }

  pub(crate) fn collaborators(&self) -> Collaborators {
    Collaborators {
      vcs: self.vcs.clone(),
      registry: self.registry.clone(),
      manifests: self.manifests.clone(),
    }
  }
}
