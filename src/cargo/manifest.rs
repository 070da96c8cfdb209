//! Lossless Cargo.toml access for releases
//!
//! Reads the package version, the `publish` flag and every recorded dependency
//! requirement; writes back new versions and requirements without disturbing the
//! rest of the file (comments, ordering, inline formatting).
//!
//! Requirements inherited with `dep = { workspace = true }` live in the root
//! manifest's `[workspace.dependencies]` and are written there.

use crate::core::error::{ConfigError, RelayError, RelayResult, ResultExt};
use crate::release::resolver::WORKSPACE_MARKER;
use semver::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use toml_edit::{DocumentMut, Item, TableLike, Value};

/// Dependency table kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyKind {
  Normal,
  Dev,
  Build,
}

impl DependencyKind {
  pub const ALL: [DependencyKind; 3] = [DependencyKind::Normal, DependencyKind::Dev, DependencyKind::Build];

  pub fn table_key(self) -> &'static str {
    match self {
      DependencyKind::Normal => "dependencies",
      DependencyKind::Dev => "dev-dependencies",
      DependencyKind::Build => "build-dependencies",
    }
  }
}

/// A dependency table in a manifest, optionally target-specific
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyScope {
  pub target: Option<String>,
  pub kind: DependencyKind,
}

impl DependencyScope {
  pub fn new(kind: DependencyKind) -> Self {
    Self { target: None, kind }
  }
}

impl fmt::Display for DependencyScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.target {
      Some(target) => write!(f, "target.'{}'.{}", target, self.kind.table_key()),
      None => f.write_str(self.kind.table_key()),
    }
  }
}

/// A recorded version requirement on one dependency in one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
  pub scope: DependencyScope,
  /// Key of the entry in the dependency table (differs from the crate name when renamed)
  pub key: String,
  /// Version requirement, or `workspace:*` for a path-only dependency
  pub requirement: String,
  /// Declared with `workspace = true`; the requirement lives in the root manifest
  pub inherited: bool,
}

enum Entry {
  Versioned(String),
  Inherited,
}

/// A parsed Cargo.toml that can be edited in place
#[derive(Debug, Clone)]
pub struct CargoManifest {
  path: PathBuf,
  doc: DocumentMut,
}

impl CargoManifest {
  pub fn parse(path: impl Into<PathBuf>, content: &str) -> RelayResult<Self> {
    let path = path.into();
    let doc = content.parse::<DocumentMut>().map_err(|e| {
      RelayError::Config(ConfigError::InvalidManifest {
        path: path.clone(),
        reason: e.to_string(),
      })
    })?;
    Ok(Self { path, doc })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn package_name(&self) -> Option<&str> {
    self.doc.get("package")?.get("name")?.as_str()
  }

  /// Declared `[package] version`. A missing version means `0.0.0`, as in Cargo.
  pub fn version(&self) -> RelayResult<Version> {
    let Some(item) = self.doc.get("package").and_then(|p| p.get("version")) else {
      return Ok(Version::new(0, 0, 0));
    };

    if let Some(raw) = item.as_str() {
      return Version::parse(raw).map_err(|e| {
        RelayError::Config(ConfigError::InvalidManifest {
          path: self.path.clone(),
          reason: format!("invalid version '{}': {}", raw, e),
        })
      });
    }

    Err(RelayError::Config(ConfigError::InvalidManifest {
      path: self.path.clone(),
      reason: "package version is inherited from the workspace".to_string(),
    }))
  }

  /// `publish = false` or `publish = []`
  pub fn is_private(&self) -> bool {
    let Some(publish) = self.doc.get("package").and_then(|p| p.get("publish")) else {
      return false;
    };
    match publish.as_value() {
      Some(Value::Boolean(flag)) => !*flag.value(),
      Some(Value::Array(registries)) => registries.is_empty(),
      _ => false,
    }
  }

  /// Every versioned dependency, grouped by crate name.
  ///
  /// `workspace` is the root manifest used to resolve `workspace = true` entries.
  pub fn requirements(&self, workspace: Option<&CargoManifest>) -> BTreeMap<String, Vec<Requirement>> {
    let mut out: BTreeMap<String, Vec<Requirement>> = BTreeMap::new();

    for (scope, table) in self.scope_tables() {
      for (key, item) in table.iter() {
        let Some((name, entry)) = parse_entry(key, item) else {
          continue;
        };

        let (name, requirement, inherited) = match entry {
          Entry::Versioned(req) => (name, req, false),
          Entry::Inherited => {
            let Some((ws_name, Entry::Versioned(req))) = workspace.and_then(|ws| ws.workspace_entry(key)) else {
              continue;
            };
            (ws_name, req, true)
          }
        };

        out.entry(name).or_default().push(Requirement {
          scope: scope.clone(),
          key: key.to_string(),
          requirement,
          inherited,
        });
      }
    }

    out
  }

  /// Set `[package] version`
  pub fn set_version(&mut self, version: &Version) -> RelayResult<()> {
    let package = self
      .doc
      .get_mut("package")
      .and_then(Item::as_table_like_mut)
      .ok_or_else(|| RelayError::message(format!("No [package] section in {}", self.path.display())))?;

    match package.get_mut("version") {
      Some(item) if item.is_str() => {
        if let Some(value) = item.as_value_mut() {
          replace_string(value, &version.to_string());
        }
      }
      Some(_) => {
        return Err(RelayError::Config(ConfigError::InvalidManifest {
          path: self.path.clone(),
          reason: "package version is inherited from the workspace".to_string(),
        }));
      }
      None => {
        package.insert("version", toml_edit::value(version.to_string()));
      }
    }
    Ok(())
  }

  /// Write a requirement into a member dependency table. Returns false if the
  /// entry does not exist.
  pub fn set_requirement(&mut self, scope: &DependencyScope, key: &str, requirement: &str) -> bool {
    self
      .scope_table_mut(scope)
      .and_then(|table| table.get_mut(key))
      .is_some_and(|item| write_requirement(item, requirement))
  }

  /// Write a requirement into `[workspace.dependencies]`
  pub fn set_workspace_requirement(&mut self, key: &str, requirement: &str) -> bool {
    self
      .doc
      .get_mut("workspace")
      .and_then(Item::as_table_like_mut)
      .and_then(|ws| ws.get_mut("dependencies"))
      .and_then(Item::as_table_like_mut)
      .and_then(|deps| deps.get_mut(key))
      .is_some_and(|item| write_requirement(item, requirement))
  }

  fn workspace_entry(&self, key: &str) -> Option<(String, Entry)> {
    let item = self.doc.get("workspace")?.get("dependencies")?.as_table_like()?.get(key)?;
    parse_entry(key, item)
  }

  fn scope_tables(&self) -> Vec<(DependencyScope, &dyn TableLike)> {
    let mut tables = Vec::new();

    for kind in DependencyKind::ALL {
      if let Some(table) = self.doc.get(kind.table_key()).and_then(Item::as_table_like) {
        tables.push((DependencyScope::new(kind), table));
      }
    }

    if let Some(targets) = self.doc.get("target").and_then(Item::as_table_like) {
      for (target, item) in targets.iter() {
        for kind in DependencyKind::ALL {
          if let Some(table) = item.get(kind.table_key()).and_then(Item::as_table_like) {
            let scope = DependencyScope {
              target: Some(target.to_string()),
              kind,
            };
            tables.push((scope, table));
          }
        }
      }
    }

    tables
  }

  fn scope_table_mut(&mut self, scope: &DependencyScope) -> Option<&mut dyn TableLike> {
    let key = scope.kind.table_key();
    match &scope.target {
      None => self.doc.get_mut(key)?.as_table_like_mut(),
      Some(target) => self
        .doc
        .get_mut("target")?
        .as_table_like_mut()?
        .get_mut(target)?
        .as_table_like_mut()?
        .get_mut(key)?
        .as_table_like_mut(),
    }
  }
}

impl fmt::Display for CargoManifest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.doc)
  }
}

fn parse_entry(key: &str, item: &Item) -> Option<(String, Entry)> {
  if let Some(req) = item.as_str() {
    return Some((key.to_string(), Entry::Versioned(req.to_string())));
  }

  let table = item.as_table_like()?;
  let name = table
    .get("package")
    .and_then(Item::as_str)
    .unwrap_or(key)
    .to_string();

  if table.get("workspace").and_then(Item::as_bool) == Some(true) {
    return Some((name, Entry::Inherited));
  }
  if let Some(req) = table.get("version").and_then(Item::as_str) {
    return Some((name, Entry::Versioned(req.to_string())));
  }
  if table.contains_key("path") {
    return Some((name, Entry::Versioned(format!("{}*", WORKSPACE_MARKER))));
  }
  None
}

/// Update version in a dependency item (handles both string and table format)
fn write_requirement(item: &mut Item, requirement: &str) -> bool {
  if let Some(value) = item.as_value_mut() {
    match value {
      Value::String(_) => {
        replace_string(value, requirement);
        return true;
      }
      Value::InlineTable(table) => {
        match table.get_mut("version") {
          Some(version) => replace_string(version, requirement),
          None => {
            table.insert("version", Value::from(requirement));
          }
        }
        return true;
      }
      _ => return false,
    }
  }

  if let Some(table) = item.as_table_mut() {
    match table.get_mut("version").and_then(Item::as_value_mut) {
      Some(version) => replace_string(version, requirement),
      None => {
        table.insert("version", toml_edit::value(requirement));
      }
    }
    return true;
  }

  false
}

fn replace_string(value: &mut Value, new: &str) {
  let decor = value.decor().clone();
  *value = Value::from(new);
  *value.decor_mut() = decor;
}

/// Manifest persistence used by the release pipeline
pub trait ManifestStore: Send + Sync {
  fn load(&self, path: &Path) -> RelayResult<CargoManifest>;
  fn save(&self, manifest: &CargoManifest) -> RelayResult<()>;
}

/// Reads and writes manifests on disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FsManifestStore;

impl ManifestStore for FsManifestStore {
  fn load(&self, path: &Path) -> RelayResult<CargoManifest> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    CargoManifest::parse(path, &content)
  }

  fn save(&self, manifest: &CargoManifest) -> RelayResult<()> {
    std::fs::write(manifest.path(), manifest.to_string())
      .with_context(|| format!("Failed to write {}", manifest.path().display()))
  }
}
