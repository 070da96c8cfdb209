//! System git backend
//!
//! Uses git porcelain/plumbing commands through `tokio::process` so that many
//! crate pipelines can query history concurrently. Writes (commits, tags) are only
//! issued by the pipeline currently holding the tag baton.

use super::{CommitInfo, LastRelease, VersionControl};
use crate::core::error::{GitError, RelayError, RelayResult, ResultExt};
use crate::release::prerelease::Channel;
use crate::release::tags::{TagFormat, latest_release};
use crate::release::unit::Unit;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

const FIELD_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';

/// Git backend using system git
pub struct SystemGit {
  /// Repository working directory
  pub(crate) repo_path: PathBuf,

  /// Working tree root
  pub(crate) work_tree: PathBuf,
}

impl SystemGit {
  /// Open a git repository
  ///
  /// This performs ONE subprocess call to get the repository metadata.
  pub async fn open(path: &Path) -> RelayResult<Self> {
    let output = Command::new("git")
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .await
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if stderr.contains("not a git repository") {
        return Err(RelayError::Git(GitError::RepoNotFound {
          path: path.to_path_buf(),
        }));
      }
      return Err(RelayError::message(format!("Failed to open git repository: {}", stderr)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let work_tree = stdout.trim();

    Ok(Self {
      repo_path: path.to_path_buf(),
      work_tree: PathBuf::from(work_tree),
    })
  }

  pub fn work_tree(&self) -> &Path {
    &self.work_tree
  }

  /// Get HEAD commit SHA
  pub async fn head_commit(&self) -> RelayResult<String> {
    let output = self.run(&["rev-parse", "HEAD"]).await?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Tags matching `pattern` that are reachable from HEAD
  pub async fn merged_tags(&self, pattern: &str) -> RelayResult<Vec<String>> {
    let output = self.run(&["tag", "--merged", "HEAD", "--list", pattern]).await?;
    Ok(
      String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect(),
    )
  }

  /// Commit a tag points at
  pub async fn tag_target(&self, tag: &str) -> RelayResult<String> {
    let output = self.run(&["rev-list", "-n", "1", tag]).await?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  async fn tag_exists(&self, tag: &str) -> RelayResult<bool> {
    let output = self
      .git_cmd()
      .args(["rev-parse", "-q", "--verify"])
      .arg(format!("refs/tags/{}", tag))
      .output()
      .await
      .context("Failed to run git rev-parse")?;
    Ok(output.status.success())
  }

  async fn run(&self, args: &[&str]) -> RelayResult<Output> {
    let output = self
      .git_cmd()
      .args(args)
      .output()
      .await
      .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(RelayError::Git(GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        stderr: stderr.to_string(),
      }));
    }

    Ok(output)
  }

  /// Create a git command with an isolated environment
  ///
  /// - Sets working directory to repo path
  /// - Clears environment variables
  /// - Whitelists PATH, HOME and the commit identity variables
  /// - Adds safe configuration overrides
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = Command::new("git");

    cmd.arg("-C").arg(&self.repo_path);

    cmd.env_clear();
    for key in [
      "PATH",
      "HOME",
      "GIT_AUTHOR_NAME",
      "GIT_AUTHOR_EMAIL",
      "GIT_COMMITTER_NAME",
      "GIT_COMMITTER_EMAIL",
    ] {
      if let Ok(value) = std::env::var(key) {
        cmd.env(key, value);
      }
    }

    cmd.arg("-c").arg("advice.detachedHead=false");
    cmd.arg("-c").arg("core.quotePath=false");
    cmd.arg("-c").arg("tag.gpgSign=false");

    cmd
  }
}

#[async_trait]
impl VersionControl for SystemGit {
  async fn verify(&self) -> RelayResult<()> {
    self.head_commit().await.map(|_| ()).map_err(|_| {
      RelayError::with_help(
        format!("Repository at {} has no commits", self.work_tree.display()),
        "Commit your workspace before releasing.",
      )
    })
  }

  async fn last_release(
    &self,
    unit: &Unit,
    format: &TagFormat,
    channel: Option<&Channel>,
  ) -> RelayResult<Option<LastRelease>> {
    let tags = self.merged_tags(&format.glob(&unit.name)).await?;
    let Some((version, tag)) = latest_release(format, &unit.name, tags.iter().map(String::as_str), channel) else {
      debug!(unit = %unit.name, "no previous release tag");
      return Ok(None);
    };

    let git_head = self.tag_target(tag).await?;
    Ok(Some(LastRelease {
      version,
      git_head,
      tag: tag.to_string(),
    }))
  }

  async fn commits(&self, unit: &Unit, since: Option<&str>, first_parent: bool) -> RelayResult<Vec<CommitInfo>> {
    let mut cmd = self.git_cmd();
    cmd.args(["log", "--format=%H%x1f%s%x1f%b%x1e"]);

    if first_parent {
      cmd.arg("--first-parent");
    }

    match since {
      Some(sha) => cmd.arg(format!("{}..HEAD", sha)),
      None => cmd.arg("HEAD"),
    };
    cmd.arg("--").arg(&unit.dir);

    let output = cmd.output().await.context("Failed to run git log")?;
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(RelayError::Git(GitError::CommandFailed {
        command: "git log".to_string(),
        stderr: stderr.to_string(),
      }));
    }

    Ok(parse_log(&String::from_utf8_lossy(&output.stdout)))
  }

  async fn commit_release(&self, paths: &[PathBuf], message: &str) -> RelayResult<String> {
    let mut add = self.git_cmd();
    add.args(["add", "--"]).args(paths);
    let output = add.output().await.context("Failed to run git add")?;
    if !output.status.success() {
      return Err(RelayError::Git(GitError::CommandFailed {
        command: "git add".to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      }));
    }

    let staged = self
      .git_cmd()
      .args(["diff", "--cached", "--quiet"])
      .status()
      .await
      .context("Failed to run git diff")?;
    if staged.success() {
      debug!("nothing staged for release commit");
      return self.head_commit().await;
    }

    self.run(&["commit", "-m", message]).await?;
    self.head_commit().await
  }

  async fn create_tag(&self, tag: &str, message: &str) -> RelayResult<()> {
    if self.tag_exists(tag).await? {
      return Err(RelayError::Git(GitError::TagExists { tag: tag.to_string() }));
    }
    self.run(&["tag", "-a", tag, "-m", message]).await?;
    Ok(())
  }
}

/// Parse `git log` output produced with field/record separators
fn parse_log(output: &str) -> Vec<CommitInfo> {
  output
    .split(RECORD_SEP)
    .filter_map(|record| {
      let record = record.trim_start_matches('\n');
      if record.trim().is_empty() {
        return None;
      }
      let mut fields = record.splitn(3, FIELD_SEP);
      let sha = fields.next()?.trim();
      let subject = fields.next().unwrap_or("").trim();
      let body = fields.next().unwrap_or("").trim();
      Some(CommitInfo::new(sha, subject, body))
    })
    .collect()
}
