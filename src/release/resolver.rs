//! Dependency constraint resolution
//!
//! Pure functions deciding how a dependent's recorded requirement on a local crate
//! changes when that crate moves to a new version.
//!
//! - **override**: always pin to `prefix + next`
//! - **satisfy**: keep the requirement if `next` already matches it
//! - **inherit**: keep it if it matches, otherwise rewrite its numeric components
//!
//! Requirements are evaluated with Cargo semantics (`semver::VersionReq`), so a bare
//! `1.0.0` means `^1.0.0`.

use crate::core::error::{ConfigError, RelayError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker for requirements that track the in-repo version of a crate.
///
/// Path-only Cargo dependencies are reported as `workspace:*`.
pub const WORKSPACE_MARKER: &str = "workspace:";

/// How a dependent's requirement is updated when a local dependency changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BumpStrategy {
  /// Replace the requirement with the new version
  #[default]
  Override,
  /// Keep the requirement if it is still satisfied
  Satisfy,
  /// Follow the shape of the existing requirement
  Inherit,
}

impl fmt::Display for BumpStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      BumpStrategy::Override => "override",
      BumpStrategy::Satisfy => "satisfy",
      BumpStrategy::Inherit => "inherit",
    })
  }
}

/// Operator prepended to versions written by the `override` strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionPrefix {
  #[default]
  None,
  Caret,
  Tilde,
  Exact,
}

impl VersionPrefix {
  pub fn as_str(self) -> &'static str {
    match self {
      VersionPrefix::None => "",
      VersionPrefix::Caret => "^",
      VersionPrefix::Tilde => "~",
      VersionPrefix::Exact => "=",
    }
  }
}

impl FromStr for VersionPrefix {
  type Err = RelayError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "" | "none" => Ok(VersionPrefix::None),
      "^" | "caret" => Ok(VersionPrefix::Caret),
      "~" | "tilde" => Ok(VersionPrefix::Tilde),
      "=" | "exact" => Ok(VersionPrefix::Exact),
      other => Err(RelayError::Config(ConfigError::InvalidValue {
        field: "deps.prefix".to_string(),
        reason: format!("'{}' is not one of \"\", \"^\", \"~\", \"=\"", other),
      })),
    }
  }
}

impl TryFrom<String> for VersionPrefix {
  type Error = RelayError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<VersionPrefix> for String {
  fn from(prefix: VersionPrefix) -> Self {
    prefix.as_str().to_string()
  }
}

impl fmt::Display for VersionPrefix {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Resolve the requirement a dependent should record for a dependency at `next`.
pub fn resolve_constraint(current: &str, next: &str, strategy: BumpStrategy, prefix: VersionPrefix) -> String {
  let current = substitute_workspace_marker(current, next);

  if current == next {
    return current;
  }

  if matches!(strategy, BumpStrategy::Satisfy | BumpStrategy::Inherit) && satisfies(next, &current) {
    return current;
  }

  if strategy == BumpStrategy::Inherit {
    return inherit_components(&current, next);
  }

  format!("{}{}", prefix.as_str(), next)
}

/// Whether resolving `current` against `next` changes the recorded requirement.
pub fn is_constraint_update_required(current: &str, next: &str, strategy: BumpStrategy, prefix: VersionPrefix) -> bool {
  resolve_constraint(current, next, strategy, prefix) != current
}

fn substitute_workspace_marker(current: &str, next: &str) -> String {
  let Some(range) = current.strip_prefix(WORKSPACE_MARKER) else {
    return current.to_string();
  };

  match range {
    "" | "*" => next.to_string(),
    "^" | "~" => format!("{}{}", range, next),
    explicit => explicit.to_string(),
  }
}

fn satisfies(version: &str, requirement: &str) -> bool {
  let (Ok(version), Ok(req)) = (semver::Version::parse(version), semver::VersionReq::parse(requirement)) else {
    return false;
  };
  req.matches(&version)
}

/// Replace the first digit run of each dot-separated component with the matching
/// component of `next`. Components without digits (`x`, `*`) are kept as-is.
fn inherit_components(current: &str, next: &str) -> String {
  let next_chunks: Vec<&str> = next.split('.').collect();

  current
    .split('.')
    .enumerate()
    .map(|(i, chunk)| match next_chunks.get(i) {
      Some(replacement) if !replacement.is_empty() => replace_first_digits(chunk, replacement),
      _ => chunk.to_string(),
    })
    .collect::<Vec<_>>()
    .join(".")
}

fn replace_first_digits(chunk: &str, replacement: &str) -> String {
  let Some(start) = chunk.find(|c: char| c.is_ascii_digit()) else {
    return chunk.to_string();
  };
  let end = chunk[start..]
    .find(|c: char| !c.is_ascii_digit())
    .map(|offset| start + offset)
    .unwrap_or(chunk.len());

  format!("{}{}{}", &chunk[..start], replacement, &chunk[end..])
}
