use crate::core::error::{ConfigError, RelayError, RelayResult, ResultExt};
use crate::release::prerelease::Channel;
use crate::release::resolver::{BumpStrategy, VersionPrefix};
use crate::release::severity::Severity;
use crate::release::tags::{DEFAULT_TAG_FORMAT, TagFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for cargo-relay
/// Searched in order: relay.toml, .relay.toml, .cargo/relay.toml, .config/relay.toml
///
/// # Example
///
/// ```toml
/// [release]
/// tag_format = "{name}@v{version}"
/// exclude = ["xtask"]
/// prerelease = "beta"
/// changelog = "CHANGELOG.md"
///
/// [deps]
/// strategy = "inherit"
/// prefix = "^"
/// release = "patch"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
  #[serde(default)]
  pub release: ReleaseConfig,
  #[serde(default)]
  pub deps: DepsConfig,
}

/// `[release]`: run-level behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseConfig {
  /// Tag template with `{name}` and `{version}` placeholders
  pub tag_format: String,

  /// Stop after release notes: no manifest writes, tags or uploads
  pub dry_run: bool,

  /// Start crate pipelines one after another instead of all at once
  pub sequential: bool,

  /// Only follow first-parent history when collecting commits
  pub first_parent: bool,

  /// Drop `publish = false` crates from the run entirely
  pub ignore_private: bool,

  /// Crate names to leave out of the run
  pub exclude: Vec<String>,

  /// Upload to the registry (tags and commits are still created when false)
  pub publish: bool,

  /// Per-crate changelog file to prepend notes to, relative to the crate directory
  pub changelog: Option<PathBuf>,

  /// Pre-release channel: releases become `X.Y.Z-<id>.N`
  pub prerelease: Option<String>,
}

impl Default for ReleaseConfig {
  fn default() -> Self {
    Self {
      tag_format: DEFAULT_TAG_FORMAT.to_string(),
      dry_run: false,
      sequential: false,
      first_parent: false,
      ignore_private: false,
      exclude: Vec::new(),
      publish: true,
      changelog: None,
      prerelease: None,
    }
  }
}

/// `[deps]`: how local dependency changes ripple into dependents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DepsConfig {
  pub strategy: BumpStrategy,
  pub prefix: VersionPrefix,
  /// Minimum release of a crate whose local dependency requirement changed
  pub release: DependentRelease,
}

/// Release rule for dependents of an updated local crate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DependentRelease {
  #[default]
  Patch,
  Minor,
  Major,
  /// Take the highest severity among the updated dependencies
  Inherit,
}

impl DependentRelease {
  /// Fixed severity of the rule, `None` for `inherit`
  pub fn severity(self) -> Option<Severity> {
    match self {
      DependentRelease::Patch => Some(Severity::Patch),
      DependentRelease::Minor => Some(Severity::Minor),
      DependentRelease::Major => Some(Severity::Major),
      DependentRelease::Inherit => None,
    }
  }
}

impl fmt::Display for DependentRelease {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      DependentRelease::Patch => "patch",
      DependentRelease::Minor => "minor",
      DependentRelease::Major => "major",
      DependentRelease::Inherit => "inherit",
    })
  }
}

/// Dependency bump policy used during severity propagation and manifest rewrites
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DepsPolicy {
  pub strategy: BumpStrategy,
  pub prefix: VersionPrefix,
  pub release: DependentRelease,
}

/// Command-line values that take precedence over relay.toml
#[derive(Debug, Clone, Default)]
pub struct ReleaseOverrides {
  pub dry_run: bool,
  pub sequential: bool,
  pub first_parent: bool,
  pub ignore_private: bool,
  pub no_publish: bool,
  pub exclude: Vec<String>,
  pub strategy: Option<BumpStrategy>,
  pub prefix: Option<VersionPrefix>,
  pub dependent_release: Option<DependentRelease>,
  pub changelog: Option<PathBuf>,
  pub prerelease: Option<String>,
}

/// Fully resolved options for one release run
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
  pub tag_format: TagFormat,
  pub dry_run: bool,
  pub sequential: bool,
  pub first_parent: bool,
  pub ignore_private: bool,
  pub exclude: Vec<String>,
  pub publish: bool,
  pub changelog: Option<PathBuf>,
  pub prerelease: Option<Channel>,
  pub deps: DepsPolicy,
}

impl Default for ReleaseOptions {
  fn default() -> Self {
    Self {
      tag_format: TagFormat::default(),
      dry_run: false,
      sequential: false,
      first_parent: false,
      ignore_private: false,
      exclude: Vec::new(),
      publish: true,
      changelog: None,
      prerelease: None,
      deps: DepsPolicy::default(),
    }
  }
}

impl RelayConfig {
  /// Find config file in search order: relay.toml, .relay.toml, .cargo/relay.toml, .config/relay.toml
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = [
      path.join("relay.toml"),
      path.join(".relay.toml"),
      path.join(".cargo").join("relay.toml"),
      path.join(".config").join("relay.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load relay.toml if present. A workspace without one uses defaults.
  pub fn load(path: &Path) -> RelayResult<Self> {
    let Some(config_path) = Self::find_config_path(path) else {
      return Ok(Self::default());
    };

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config = Self::parse(&config_path, &content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn parse(path: &Path, content: &str) -> RelayResult<Self> {
    toml_edit::de::from_str(content).map_err(|e| {
      RelayError::Config(ConfigError::InvalidToml {
        path: path.to_path_buf(),
        reason: e.to_string(),
      })
    })
  }

  /// Check values serde cannot check on its own
  pub fn validate(&self) -> RelayResult<()> {
    TagFormat::new(self.release.tag_format.as_str())?;

    if let Some(name) = self.release.exclude.iter().find(|n| n.trim().is_empty()) {
      return Err(RelayError::Config(ConfigError::InvalidValue {
        field: "release.exclude".to_string(),
        reason: format!("'{}' is not a crate name", name),
      }));
    }

    if let Some(changelog) = &self.release.changelog
      && (changelog.is_absolute() || changelog.as_os_str().is_empty())
    {
      return Err(RelayError::Config(ConfigError::InvalidValue {
        field: "release.changelog".to_string(),
        reason: "must be a file name relative to each crate directory".to_string(),
      }));
    }

    if let Some(id) = &self.release.prerelease {
      Channel::new(id.as_str())?;
    }

    Ok(())
  }

  /// Merge command-line overrides into run options
  pub fn resolve(&self, overrides: ReleaseOverrides) -> RelayResult<ReleaseOptions> {
    let mut exclude = self.release.exclude.clone();
    for name in overrides.exclude {
      if !exclude.contains(&name) {
        exclude.push(name);
      }
    }

    Ok(ReleaseOptions {
      tag_format: TagFormat::new(self.release.tag_format.as_str())?,
      dry_run: overrides.dry_run || self.release.dry_run,
      sequential: overrides.sequential || self.release.sequential,
      first_parent: overrides.first_parent || self.release.first_parent,
      ignore_private: overrides.ignore_private || self.release.ignore_private,
      exclude,
      publish: self.release.publish && !overrides.no_publish,
      changelog: overrides.changelog.or_else(|| self.release.changelog.clone()),
      prerelease: overrides
        .prerelease
        .or_else(|| self.release.prerelease.clone())
        .map(Channel::new)
        .transpose()?,
      deps: DepsPolicy {
        strategy: overrides.strategy.unwrap_or(self.deps.strategy),
        prefix: overrides.prefix.unwrap_or(self.deps.prefix),
        release: overrides.dependent_release.unwrap_or(self.deps.release),
      },
    })
  }
}
