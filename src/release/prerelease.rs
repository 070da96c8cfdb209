//! Pre-release channels
//!
//! With a channel such as `beta`, every release is cut as `X.Y.Z-beta.N`:
//!
//! - from a stable release, the severity bump starts a new series at `.1`
//! - from a release already on the channel, `N` is incremented and the core
//!   version is kept
//! - a crate that was never released starts at its manifest version
//!
//! Leaving the channel finalizes the series; see [`Severity::apply`].

use crate::core::error::{ConfigError, RelayError, RelayResult};
use crate::release::severity::Severity;
use semver::{Prerelease, Version};
use std::fmt;

/// A validated pre-release identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
  id: String,
}

impl Channel {
  pub fn new(id: impl Into<String>) -> RelayResult<Self> {
    let id = id.into();
    if id.is_empty() || Prerelease::new(&format!("{}.1", id)).is_err() {
      return Err(RelayError::Config(ConfigError::InvalidValue {
        field: "release.prerelease".to_string(),
        reason: format!("'{}' is not a valid pre-release identifier", id),
      }));
    }
    Ok(Self { id })
  }

  pub fn as_str(&self) -> &str {
    &self.id
  }

  /// `N` for a version `X.Y.Z-<id>.N` on this channel
  pub fn sequence(&self, version: &Version) -> Option<u64> {
    version
      .pre
      .as_str()
      .strip_prefix(self.id.as_str())?
      .strip_prefix('.')?
      .parse()
      .ok()
  }

  pub fn contains(&self, version: &Version) -> bool {
    self.sequence(version).is_some()
  }

  /// First version for a crate that was never released
  pub fn first(&self, manifest: &Version) -> Version {
    if self.contains(manifest) {
      return manifest.clone();
    }
    self.at(manifest, 1)
  }

  /// Next version on this channel after `last`
  pub fn bump(&self, last: &Version, severity: Severity) -> Version {
    if !severity.is_release() {
      return last.clone();
    }
    match self.sequence(last) {
      Some(n) => self.at(last, n + 1),
      None if last.pre.is_empty() => self.at(&severity.apply(last), 1),
      None => self.at(last, 1),
    }
  }

  fn at(&self, base: &Version, n: u64) -> Version {
    let mut version = Version::new(base.major, base.minor, base.patch);
    // `new` already parsed `<id>.1`, so any `<id>.N` parses too
    version.pre = Prerelease::new(&format!("{}.{}", self.id, n)).unwrap_or(Prerelease::EMPTY);
    version
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.id)
  }
}

/// Next version after `last` for `severity`, on `channel` when one is set
pub fn bump(last: &Version, severity: Severity, channel: Option<&Channel>) -> Version {
  match channel {
    Some(channel) => channel.bump(last, severity),
    None => severity.apply(last),
  }
}

/// Version of a first release
pub fn first_release(manifest: &Version, channel: Option<&Channel>) -> Version {
  match channel {
    Some(channel) => channel.first(manifest),
    None => manifest.clone(),
  }
}
