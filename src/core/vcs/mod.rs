//! Version control access for releases
//!
//! The release pipeline only sees the [`VersionControl`] trait; [`SystemGit`] is the
//! production backend.

pub mod system_git;

pub use system_git::SystemGit;

use crate::core::error::RelayResult;
use crate::release::prerelease::Channel;
use crate::release::tags::TagFormat;
use crate::release::unit::Unit;
use async_trait::async_trait;
use semver::Version;
use serde::Serialize;
use std::path::PathBuf;

/// Information about a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
  pub sha: String,
  pub subject: String,
  pub body: String,
}

impl CommitInfo {
  pub fn new(sha: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      sha: sha.into(),
      subject: subject.into(),
      body: body.into(),
    }
  }

  /// Subject and body joined the way git shows them
  pub fn message(&self) -> String {
    if self.body.is_empty() {
      self.subject.clone()
    } else {
      format!("{}\n\n{}", self.subject, self.body)
    }
  }
}

/// The most recent release of a crate found in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastRelease {
  pub version: Version,
  /// Commit the release tag points at
  pub git_head: String,
  pub tag: String,
}

/// History, tags and release commits
#[async_trait]
pub trait VersionControl: Send + Sync {
  /// Check the repository is usable for a release
  async fn verify(&self) -> RelayResult<()>;

  /// Latest release of `unit` reachable from HEAD, counting pre-releases on `channel`
  async fn last_release(
    &self,
    unit: &Unit,
    format: &TagFormat,
    channel: Option<&Channel>,
  ) -> RelayResult<Option<LastRelease>>;

  /// Commits touching the unit's directory since `since` (all history when `None`), newest first
  async fn commits(&self, unit: &Unit, since: Option<&str>, first_parent: bool) -> RelayResult<Vec<CommitInfo>>;

  /// Commit `paths` with `message`, returning the new HEAD (or the old one if nothing changed)
  async fn commit_release(&self, paths: &[PathBuf], message: &str) -> RelayResult<String>;

  /// Create an annotated tag at HEAD
  async fn create_tag(&self, tag: &str, message: &str) -> RelayResult<()>;
}
