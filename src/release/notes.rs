//! Release notes rendering
//!
//! Notes group conventional commits by type and end with a `### Dependencies`
//! section listing local dependencies upgraded in the same run.

use crate::release::commits::{CommitType, ConventionalCommit};
use semver::Version;
use std::collections::BTreeMap;

/// A local dependency moved to a new version by this release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyUpgrade {
  pub name: String,
  pub version: Version,
}

/// Notes for one crate release
#[derive(Debug, Clone)]
pub struct ReleaseNotes {
  pub name: String,
  pub version: Version,
  /// Date of the release (ISO 8601)
  pub date: String,
  commits_by_type: BTreeMap<CommitType, Vec<ConventionalCommit>>,
  breaking: Vec<ConventionalCommit>,
  dependencies: Vec<DependencyUpgrade>,
}

impl ReleaseNotes {
  pub fn new(name: impl Into<String>, version: Version, date: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version,
      date: date.into(),
      commits_by_type: BTreeMap::new(),
      breaking: Vec::new(),
      dependencies: Vec::new(),
    }
  }

  pub fn add_commit(&mut self, commit: ConventionalCommit) {
    if commit.breaking.is_some() {
      self.breaking.push(commit.clone());
    }
    if commit.commit_type.section().is_some() {
      self.commits_by_type.entry(commit.commit_type).or_default().push(commit);
    }
  }

  pub fn add_dependency(&mut self, upgrade: DependencyUpgrade) {
    self.dependencies.push(upgrade);
  }

  /// Render as markdown
  pub fn to_markdown(&self) -> String {
    let mut output = format!("## {} v{} ({})\n\n", self.name, self.version, self.date);

    if !self.breaking.is_empty() {
      output.push_str("### ⚠ BREAKING CHANGES\n\n");
      for commit in &self.breaking {
        let text = match commit.breaking.as_deref() {
          Some(desc) if !desc.is_empty() => desc,
          _ => commit.description.as_str(),
        };
        output.push_str(&format!("* {}{}\n", scope_prefix(commit), text));
      }
      output.push('\n');
    }

    for (commit_type, commits) in &self.commits_by_type {
      let Some(title) = commit_type.section() else {
        continue;
      };
      output.push_str(&format!("### {}\n\n", title));
      for commit in commits {
        output.push_str(&format!(
          "* {}{} ({})\n",
          scope_prefix(commit),
          commit.description,
          short_sha(&commit.sha)
        ));
      }
      output.push('\n');
    }

    if !self.dependencies.is_empty() {
      output.push_str("### Dependencies\n\n");
      for dep in &self.dependencies {
        output.push_str(&format!("* **{}:** upgraded to {}\n", dep.name, dep.version));
      }
      output.push('\n');
    }

    output
  }
}

fn scope_prefix(commit: &ConventionalCommit) -> String {
  commit
    .scope
    .as_ref()
    .map(|s| format!("**{}:** ", s))
    .unwrap_or_default()
}

fn short_sha(sha: &str) -> &str {
  &sha[..7.min(sha.len())]
}

/// Insert notes at the top of a changelog, below a leading `# ` title if present
pub fn prepend_changelog(existing: &str, notes: &str) -> String {
  if existing.trim().is_empty() {
    return format!("# Changelog\n\n{}", notes);
  }

  if existing.starts_with("# ") {
    let (title, rest) = existing.split_once('\n').unwrap_or((existing, ""));
    return format!("{}\n\n{}{}", title, notes, rest.trim_start_matches('\n'));
  }

  format!("{}{}", notes, existing)
}
