//! Release tag naming
//!
//! Tags are rendered from a template with `{name}` and `{version}` placeholders.
//! The default, `{name}@v{version}`, produces tags like `my-crate@v1.2.3`.

use crate::core::error::{ConfigError, RelayError, RelayResult};
use crate::release::prerelease::Channel;
use semver::Version;

pub const DEFAULT_TAG_FORMAT: &str = "{name}@v{version}";

/// Validated tag template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFormat {
  template: String,
}

impl TagFormat {
  pub fn new(template: impl Into<String>) -> RelayResult<Self> {
    let template = template.into();
    if template.matches("{version}").count() != 1 {
      return Err(RelayError::Config(ConfigError::InvalidValue {
        field: "release.tag_format".to_string(),
        reason: format!("'{}' must contain `{{version}}` exactly once", template),
      }));
    }
    if template.chars().any(|c| c.is_whitespace() || matches!(c, '*' | '?' | '[' | '~' | '^' | ':')) {
      return Err(RelayError::Config(ConfigError::InvalidValue {
        field: "release.tag_format".to_string(),
        reason: format!("'{}' contains characters git does not allow in tag names", template),
      }));
    }
    Ok(Self { template })
  }

  /// Tag name for `name` at `version`
  pub fn format(&self, name: &str, version: &Version) -> String {
    self
      .template
      .replace("{name}", name)
      .replace("{version}", &version.to_string())
  }

  /// Glob matching every release tag of `name` (for `git tag --list`)
  pub fn glob(&self, name: &str) -> String {
    self.template.replace("{name}", name).replace("{version}", "*")
  }

  /// Extract the version from a tag of `name`, if it is one
  pub fn parse(&self, name: &str, tag: &str) -> Option<Version> {
    let rendered = self.template.replace("{name}", name);
    let (before, after) = rendered.split_once("{version}")?;
    let raw = tag.strip_prefix(before)?.strip_suffix(after)?;
    Version::parse(raw).ok()
  }
}

impl Default for TagFormat {
  fn default() -> Self {
    Self {
      template: DEFAULT_TAG_FORMAT.to_string(),
    }
  }
}

/// Highest version among tags of `name`: stable ones, plus those on `channel`
pub fn latest_release<'a>(
  format: &TagFormat,
  name: &str,
  tags: impl IntoIterator<Item = &'a str>,
  channel: Option<&Channel>,
) -> Option<(Version, &'a str)> {
  tags
    .into_iter()
    .filter_map(|tag| format.parse(name, tag).map(|v| (v, tag)))
    .filter(|(v, _)| v.pre.is_empty() || channel.is_some_and(|c| c.contains(v)))
    .max_by(|a, b| a.0.cmp(&b.0))
}
