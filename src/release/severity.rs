//! Change severity and version bumping

use serde::{Deserialize, Serialize};
use std::fmt;

/// How strongly a crate changed since its last release.
///
/// Ordered `None < Patch < Minor < Major`; merges always keep the highest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  /// No release needed
  #[default]
  None,
  /// Bug fixes
  Patch,
  /// New features
  Minor,
  /// Breaking changes
  Major,
}

impl Severity {
  /// Apply this severity to a version.
  ///
  /// A pre-release is finalized rather than bumped when it already sits on the
  /// requested boundary: `2.0.0-rc.1` with major gives `2.0.0`, `1.2.3-beta.1`
  /// with patch gives `1.2.3`. Build metadata is dropped on any real bump.
  pub fn apply(self, version: &semver::Version) -> semver::Version {
    let pre = !version.pre.is_empty();
    let (major, minor, patch) = (version.major, version.minor, version.patch);
    match self {
      Severity::Major if pre && minor == 0 && patch == 0 => semver::Version::new(major, 0, 0),
      Severity::Major => semver::Version::new(major + 1, 0, 0),
      Severity::Minor if pre && patch == 0 => semver::Version::new(major, minor, 0),
      Severity::Minor => semver::Version::new(major, minor + 1, 0),
      Severity::Patch if pre => semver::Version::new(major, minor, patch),
      Severity::Patch => semver::Version::new(major, minor, patch + 1),
      Severity::None => version.clone(),
    }
  }

  /// Combine two severities (returns the larger one)
  pub fn combine(self, other: Self) -> Self {
    self.max(other)
  }

  pub fn is_release(self) -> bool {
    self != Severity::None
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Severity::None => "none",
      Severity::Patch => "patch",
      Severity::Minor => "minor",
      Severity::Major => "major",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Highest severity in the input, `None` when empty.
pub fn merge_highest<I>(severities: I) -> Severity
where
  I: IntoIterator<Item = Severity>,
{
  severities.into_iter().fold(Severity::None, Severity::combine)
}
