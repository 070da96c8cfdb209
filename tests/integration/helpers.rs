//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A Cargo workspace inside a fresh git repository
pub struct TestWorkspace {
  _root: TempDir,
  pub path: PathBuf,
}

impl TestWorkspace {
  /// Create an empty workspace with one initial commit
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().to_path_buf();

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;
    git(&path, &["config", "commit.gpgSign", "false"])?;

    std::fs::write(
      path.join("Cargo.toml"),
      r#"[workspace]
members = ["crates/*"]
resolver = "2"

[workspace.package]
edition = "2021"
license = "MIT"
"#,
    )?;

    git(&path, &["add", "."])?;
    git(&path, &["commit", "-m", "chore: workspace setup"])?;

    Ok(Self { _root: root, path })
  }

  /// Add a library crate; `deps` are raw `[dependencies]` entries
  pub fn add_crate(&self, name: &str, version: &str, deps: &[(&str, &str)]) -> Result<PathBuf> {
    let crate_path = self.path.join("crates").join(name);
    std::fs::create_dir_all(crate_path.join("src"))?;

    let mut cargo_toml = format!(
      r#"[package]
name = "{}"
version = "{}"
edition.workspace = true
license.workspace = true
description = "Test crate {}"

[dependencies]
"#,
      name, version, name
    );
    for (dep_name, dep_spec) in deps {
      cargo_toml.push_str(&format!("{} = {}\n", dep_name, dep_spec));
    }

    std::fs::write(crate_path.join("Cargo.toml"), cargo_toml)?;
    std::fs::write(
      crate_path.join("src/lib.rs"),
      format!("pub fn hello() -> &'static str {{\n  \"Hello from {}\"\n}}\n", name),
    )?;

    Ok(crate_path)
  }

  /// Commit current changes
  pub fn commit(&self, message: &str) -> Result<String> {
    git(&self.path, &["add", "."])?;
    git(&self.path, &["commit", "-m", message])?;

    let output = git(&self.path, &["rev-parse", "HEAD"])?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Create an annotated release tag at HEAD
  pub fn tag(&self, tag: &str) -> Result<()> {
    git(&self.path, &["tag", "-a", tag, "-m", &format!("Release {}", tag)])?;
    Ok(())
  }

  /// Overwrite a file in a crate
  pub fn modify_file(&self, crate_name: &str, file: &str, content: &str) -> Result<()> {
    let file_path = self.path.join("crates").join(crate_name).join(file);
    std::fs::write(file_path, content)?;
    Ok(())
  }

  /// Subjects of the last `n` commits, newest first
  pub fn git_log(&self, n: usize) -> Result<Vec<String>> {
    let output = git(&self.path, &["log", &format!("-{}", n), "--format=%s"])?;
    Ok(
      String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(String::from)
        .collect(),
    )
  }

  /// All tag names
  pub fn tags(&self) -> Result<Vec<String>> {
    let output = git(&self.path, &["tag", "--list"])?;
    Ok(
      String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(String::from)
        .collect(),
    )
  }

  pub fn file_exists(&self, path: &str) -> bool {
    self.path.join(path).exists()
  }

  pub fn read_file(&self, path: &str) -> Result<String> {
    Ok(std::fs::read_to_string(self.path.join(path))?)
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Run the cargo-relay binary and capture its output, whatever the exit status
pub fn cargo_relay(cwd: &Path, args: &[&str]) -> Result<Output> {
  let bin = env!("CARGO_BIN_EXE_cargo-relay");

  Command::new(bin)
    .current_dir(cwd)
    .args(args)
    .env_remove("RELAY_LOG")
    .env_remove("CARGO_REGISTRY_TOKEN")
    .output()
    .context("Failed to run cargo-relay")
}

/// Run the cargo-relay binary and require success
pub fn run_cargo_relay(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = cargo_relay(cwd, args)?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "cargo-relay command failed: cargo {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}

/// A released `engine` crate and a `cli` crate depending on it, with a new feature in `engine`
pub fn two_crate_workspace() -> Result<TestWorkspace> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("engine", "0.1.0", &[])?;
  ws.add_crate("cli", "0.1.0", &[("engine", r#"{ path = "../engine", version = "0.1.0" }"#)])?;
  ws.commit("feat: initial crates")?;
  ws.tag("engine@v0.1.0")?;
  ws.tag("cli@v0.1.0")?;

  ws.modify_file("engine", "src/lib.rs", "pub fn hello() -> &'static str {\n  \"hi\"\n}\n\npub fn extra() {}\n")?;
  ws.commit("feat(engine): add extra")?;
  Ok(ws)
}
