//! Error types for cargo-relay with contextual messages and exit codes
//!
//! Errors fall into two scopes:
//!
//! - **Run-scoped**: configuration, manifest loading and graph validity. These abort
//!   before any per-crate pipeline starts.
//! - **Unit-scoped**: everything raised inside one crate's pipeline. The crate is
//!   marked failed and reported; siblings keep going.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for cargo-relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (git, registry, I/O)
  System = 2,
  /// Validation failure (dependency cycles, invalid manifests)
  Validation = 3,
  /// Some queued crates were not released
  Partial = 4,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for cargo-relay
#[derive(Debug)]
pub enum RelayError {
  /// Configuration and manifest errors
  Config(ConfigError),

  /// Release coordination errors
  Release(ReleaseError),

  /// Git operation errors
  Git(GitError),

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl RelayError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    RelayError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    RelayError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      RelayError::Message { message, context, help } => RelayError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      RelayError::Config(_) => ExitCode::User,
      RelayError::Release(ReleaseError::DependencyCycle { .. }) => ExitCode::Validation,
      RelayError::Release(_) => ExitCode::System,
      RelayError::Git(_) => ExitCode::System,
      RelayError::Io(_) => ExitCode::System,
      RelayError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      RelayError::Config(e) => e.help_message(),
      RelayError::Release(e) => e.help_message(),
      RelayError::Git(e) => e.help_message(),
      RelayError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

impl fmt::Display for RelayError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RelayError::Config(e) => write!(f, "{}", e),
      RelayError::Release(e) => write!(f, "{}", e),
      RelayError::Git(e) => write!(f, "{}", e),
      RelayError::Io(e) => write!(f, "I/O error: {}", e),
      RelayError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for RelayError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      RelayError::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for RelayError {
  fn from(err: io::Error) -> Self {
    RelayError::Io(err)
  }
}

impl From<String> for RelayError {
  fn from(msg: String) -> Self {
    RelayError::message(msg)
  }
}

impl From<&str> for RelayError {
  fn from(msg: &str) -> Self {
    RelayError::message(msg)
  }
}

impl From<ConfigError> for RelayError {
  fn from(err: ConfigError) -> Self {
    RelayError::Config(err)
  }
}

impl From<ReleaseError> for RelayError {
  fn from(err: ReleaseError) -> Self {
    RelayError::Release(err)
  }
}

impl From<GitError> for RelayError {
  fn from(err: GitError) -> Self {
    RelayError::Git(err)
  }
}

impl From<toml_edit::TomlError> for RelayError {
  fn from(err: toml_edit::TomlError) -> Self {
    RelayError::message(format!("TOML parse error: {}", err))
  }
}

impl From<toml_edit::de::Error> for RelayError {
  fn from(err: toml_edit::de::Error) -> Self {
    RelayError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<cargo_metadata::Error> for RelayError {
  fn from(err: cargo_metadata::Error) -> Self {
    RelayError::message(format!("Cargo metadata error: {}", err))
  }
}

impl From<semver::Error> for RelayError {
  fn from(err: semver::Error) -> Self {
    RelayError::message(format!("Invalid semver: {}", err))
  }
}

impl From<serde_json::Error> for RelayError {
  fn from(err: serde_json::Error) -> Self {
    RelayError::message(format!("JSON error: {}", err))
  }
}

impl From<tokio::task::JoinError> for RelayError {
  fn from(err: tokio::task::JoinError) -> Self {
    RelayError::message(format!("Release task aborted: {}", err))
  }
}

/// Convert anyhow::Error to RelayError
impl From<anyhow::Error> for RelayError {
  fn from(err: anyhow::Error) -> Self {
    RelayError::message(err.to_string())
  }
}

/// Configuration and manifest errors
#[derive(Debug)]
pub enum ConfigError {
  /// Workspace has no Cargo.toml
  NotFound { workspace_root: PathBuf },

  /// relay.toml is not valid TOML or does not match the schema
  InvalidToml { path: PathBuf, reason: String },

  /// A config value is out of range
  InvalidValue { field: String, reason: String },

  /// A crate manifest cannot be used for a release
  InvalidManifest { path: PathBuf, reason: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::NotFound { .. } => Some("Run cargo-relay from the root of a Cargo workspace.".to_string()),
      ConfigError::InvalidToml { .. } => Some("See `cargo relay --help` for the supported relay.toml keys.".to_string()),
      ConfigError::InvalidValue { field, .. } => Some(format!("Check the value of `{}` in relay.toml.", field)),
      ConfigError::InvalidManifest { reason, .. } if reason.contains("workspace") => Some(
        "Independent releases need a per-crate `version` in [package]; replace `version.workspace = true`.".to_string(),
      ),
      ConfigError::InvalidManifest { .. } => None,
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::NotFound { workspace_root } => {
        write!(f, "No Cargo workspace found.\nExpected file: {}/Cargo.toml", workspace_root.display())
      }
      ConfigError::InvalidToml { path, reason } => {
        write!(f, "Invalid configuration in {}: {}", path.display(), reason)
      }
      ConfigError::InvalidValue { field, reason } => {
        write!(f, "Invalid value for `{}`: {}", field, reason)
      }
      ConfigError::InvalidManifest { path, reason } => {
        write!(f, "Invalid manifest {}: {}", path.display(), reason)
      }
    }
  }
}

/// Errors raised while coordinating a release
#[derive(Debug)]
pub enum ReleaseError {
  /// A changed dependency has neither a previous nor a new version
  UnresolvedDependency { unit: String, dependency: String },

  /// Local dependencies form a cycle
  DependencyCycle { units: Vec<String> },

  /// A dependency this crate waits on failed to release
  DependencyFailed { unit: String, dependency: String },

  /// A pipeline task ended without reporting an outcome
  Task { unit: String, reason: String },
}

impl ReleaseError {
  fn help_message(&self) -> Option<String> {
    match self {
      ReleaseError::UnresolvedDependency { dependency, .. } => Some(format!(
        "Tag a release of '{}' or make sure it has releasable commits.",
        dependency
      )),
      ReleaseError::DependencyCycle { .. } => {
        Some("Break the cycle, or exclude one of the crates with `--exclude`.".to_string())
      }
      ReleaseError::DependencyFailed { dependency, .. } => {
        Some(format!("Fix the failure reported for '{}' and run the release again.", dependency))
      }
      ReleaseError::Task { .. } => None,
    }
  }
}

impl fmt::Display for ReleaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReleaseError::UnresolvedDependency { unit, dependency } => {
        write!(f, "Cannot resolve next version of '{}' required by '{}'", dependency, unit)
      }
      ReleaseError::DependencyCycle { units } => {
        write!(f, "Local dependency cycle detected: {}", units.join(" → "))
      }
      ReleaseError::DependencyFailed { unit, dependency } => {
        write!(f, "'{}' was not published because its dependency '{}' failed", unit, dependency)
      }
      ReleaseError::Task { unit, reason } => {
        write!(f, "Release task for '{}' failed: {}", unit, reason)
      }
    }
  }
}

/// Git operation errors
#[derive(Debug)]
pub enum GitError {
  /// Git command failed
  CommandFailed { command: String, stderr: String },

  /// Repository not found
  RepoNotFound { path: PathBuf },

  /// Tag already exists
  TagExists { tag: String },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::RepoNotFound { path } => Some(format!(
        "Initialize the repository first or check the path: {}",
        path.display()
      )),
      GitError::TagExists { tag } => Some(format!(
        "A release was already tagged as '{}'. Fetch tags with `git fetch --tags` and re-run.",
        tag
      )),
      _ => None,
    }
  }
}

impl fmt::Display for GitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GitError::CommandFailed { command, stderr } => {
        write!(f, "Git command failed: {}\n{}", command, stderr)
      }
      GitError::RepoNotFound { path } => {
        write!(f, "Git repository not found at: {}", path.display())
      }
      GitError::TagExists { tag } => {
        write!(f, "Tag already exists: {}", tag)
      }
    }
  }
}

/// Result type alias for cargo-relay
pub type RelayResult<T> = Result<T, RelayError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> RelayResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> RelayResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<RelayError>,
{
  fn context(self, ctx: impl Into<String>) -> RelayResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> RelayResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &RelayError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}
