//! Conventional commit classification
//!
//! Maps commit messages to a [`Severity`]:
//!
//! - `type!:` or a `BREAKING CHANGE:` footer → major
//! - `feat` → minor
//! - `fix`, `perf`, `revert` → patch
//! - anything else → none

use crate::core::vcs::CommitInfo;
use crate::release::severity::{Severity, merge_highest};

/// Conventional commit type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommitType {
  Feat,
  Fix,
  Perf,
  Revert,
  Docs,
  Style,
  Refactor,
  Test,
  Build,
  Ci,
  Chore,
  Other,
}

impl CommitType {
  fn from_token(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "feat" | "feature" => Self::Feat,
      "fix" => Self::Fix,
      "perf" => Self::Perf,
      "revert" => Self::Revert,
      "docs" | "doc" => Self::Docs,
      "style" => Self::Style,
      "refactor" => Self::Refactor,
      "test" | "tests" => Self::Test,
      "build" => Self::Build,
      "ci" => Self::Ci,
      "chore" => Self::Chore,
      _ => Self::Other,
    }
  }

  /// Section title in release notes, for types that appear there
  pub fn section(self) -> Option<&'static str> {
    match self {
      Self::Feat => Some("Features"),
      Self::Fix => Some("Bug Fixes"),
      Self::Perf => Some("Performance Improvements"),
      Self::Revert => Some("Reverts"),
      _ => None,
    }
  }
}

/// A commit parsed as `<type>(<scope>)!: <description>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionalCommit {
  pub sha: String,
  pub commit_type: CommitType,
  pub scope: Option<String>,
  pub description: String,
  /// Breaking change description; empty when only marked with `!`
  pub breaking: Option<String>,
}

impl ConventionalCommit {
  /// Parse a commit. Non-conventional subjects become [`CommitType::Other`].
  pub fn parse(commit: &CommitInfo) -> Self {
    let subject = commit.subject.trim();
    let breaking_footer = breaking_footer(&commit.body);

    let Some((header, description)) = subject.split_once(':') else {
      return Self::other(commit, breaking_footer);
    };

    let (header, bang) = match header.strip_suffix('!') {
      Some(h) => (h, true),
      None => (header, false),
    };

    let (type_token, scope) = match header.split_once('(') {
      Some((t, rest)) => match rest.strip_suffix(')') {
        Some(scope) => (t, Some(scope.trim().to_string())),
        None => return Self::other(commit, breaking_footer),
      },
      None => (header, None),
    };

    if type_token.is_empty() || !type_token.chars().all(|c| c.is_ascii_alphabetic()) {
      return Self::other(commit, breaking_footer);
    }

    let breaking = breaking_footer.or_else(|| bang.then(String::new));

    Self {
      sha: commit.sha.clone(),
      commit_type: CommitType::from_token(type_token),
      scope: scope.filter(|s| !s.is_empty()),
      description: description.trim().to_string(),
      breaking,
    }
  }

  fn other(commit: &CommitInfo, breaking: Option<String>) -> Self {
    Self {
      sha: commit.sha.clone(),
      commit_type: CommitType::Other,
      scope: None,
      description: commit.subject.trim().to_string(),
      breaking,
    }
  }

  pub fn severity(&self) -> Severity {
    if self.breaking.is_some() {
      return Severity::Major;
    }
    match self.commit_type {
      CommitType::Feat => Severity::Minor,
      CommitType::Fix | CommitType::Perf | CommitType::Revert => Severity::Patch,
      _ => Severity::None,
    }
  }
}

fn breaking_footer(body: &str) -> Option<String> {
  body.lines().find_map(|line| {
    line
      .strip_prefix("BREAKING CHANGE:")
      .or_else(|| line.strip_prefix("BREAKING-CHANGE:"))
      .map(|rest| rest.trim().to_string())
  })
}

/// Severity of a set of commits (highest wins)
pub fn classify(commits: &[ConventionalCommit]) -> Severity {
  merge_highest(commits.iter().map(ConventionalCommit::severity))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(subject: &str, body: &str) -> ConventionalCommit {
    ConventionalCommit::parse(&CommitInfo::new("abc123", subject, body))
  }

  #[test]
  fn test_commit_type_parsing() {
    let c = parse("feat(auth): add OAuth2 support", "");
    assert_eq!(c.commit_type, CommitType::Feat);
    assert_eq!(c.scope.as_deref(), Some("auth"));
    assert_eq!(c.description, "add OAuth2 support");
    assert_eq!(c.severity(), Severity::Minor);

    assert_eq!(parse("fix: off by one", "").severity(), Severity::Patch);
    assert_eq!(parse("perf: faster", "").severity(), Severity::Patch);
    assert_eq!(parse("docs: typo", "").severity(), Severity::None);
    assert_eq!(parse("Merge branch 'main'", "").commit_type, CommitType::Other);
  }

  #[test]
  fn test_breaking_change_detection() {
    assert_eq!(parse("feat!: drop old api", "").severity(), Severity::Major);
    assert_eq!(parse("refactor(core)!: rename", "").severity(), Severity::Major);

    let footer = parse("fix: tighten types", "Some details\nBREAKING CHANGE: `parse` now returns Result");
    assert_eq!(footer.severity(), Severity::Major);
    assert_eq!(footer.breaking.as_deref(), Some("`parse` now returns Result"));
  }

  #[test]
  fn test_malformed_headers_are_other() {
    assert_eq!(parse("feat(core: missing paren", "").commit_type, CommitType::Other);
    assert_eq!(parse("wip stuff: things", "").commit_type, CommitType::Other);
  }

  #[test]
  fn test_classify_highest_wins() {
    let commits = vec![parse("docs: readme", ""), parse("fix: bug", ""), parse("feat: thing", "")];
    assert_eq!(classify(&commits), Severity::Minor);
    assert_eq!(classify(&[]), Severity::None);
    assert_eq!(classify(&[parse("chore: deps", "")]), Severity::None);
  }
}
