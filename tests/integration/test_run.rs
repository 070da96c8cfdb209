//! Integration tests for `cargo relay run`

use crate::helpers::{TestWorkspace, cargo_relay, run_cargo_relay, two_crate_workspace};
use anyhow::Result;

#[test]
fn test_run_versions_and_tags_in_dependency_order() -> Result<()> {
  let ws = two_crate_workspace()?;
  let output = run_cargo_relay(&ws.path, &["relay", "run", "--no-publish"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("Released 2 of 2 queued crates"), "{}", stdout);

  let tags = ws.tags()?;
  assert!(tags.contains(&"engine@v0.2.0".to_string()), "{:?}", tags);
  assert!(tags.contains(&"cli@v0.1.1".to_string()), "{:?}", tags);

  let engine = ws.read_file("crates/engine/Cargo.toml")?;
  assert!(engine.contains("version = \"0.2.0\""));

  let cli = ws.read_file("crates/cli/Cargo.toml")?;
  assert!(cli.contains("version = \"0.1.1\""));
  assert!(cli.contains(r#"engine = { path = "../engine", version = "0.2.0" }"#), "{}", cli);

  let log = ws.git_log(2)?;
  assert!(log.contains(&"chore(release): engine@v0.2.0".to_string()), "{:?}", log);
  assert!(log.contains(&"chore(release): cli@v0.1.1".to_string()), "{:?}", log);
  Ok(())
}

#[test]
fn test_run_dry_run_writes_nothing() -> Result<()> {
  let ws = two_crate_workspace()?;
  let before = ws.read_file("crates/engine/Cargo.toml")?;

  let output = run_cargo_relay(&ws.path, &["relay", "run", "--dry-run"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("Would release 2 of 2 queued crates"), "{}", stdout);

  assert_eq!(ws.read_file("crates/engine/Cargo.toml")?, before);
  assert_eq!(ws.tags()?.len(), 2);
  Ok(())
}

#[test]
fn test_run_prepends_changelog() -> Result<()> {
  let ws = two_crate_workspace()?;
  run_cargo_relay(&ws.path, &["relay", "run", "--no-publish", "--changelog"])?;

  assert!(ws.file_exists("crates/engine/CHANGELOG.md"));
  let changelog = ws.read_file("crates/engine/CHANGELOG.md")?;
  assert!(changelog.starts_with("# Changelog\n\n## engine v0.2.0 ("), "{}", changelog);
  assert!(changelog.contains("### Features"));
  assert!(changelog.contains("add extra"));

  let cli = ws.read_file("crates/cli/CHANGELOG.md")?;
  assert!(cli.contains("### Dependencies"), "{}", cli);
  Ok(())
}

#[test]
fn test_run_with_nothing_to_release() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("engine", "0.1.0", &[])?;
  ws.commit("feat: engine")?;
  ws.tag("engine@v0.1.0")?;

  let output = run_cargo_relay(&ws.path, &["relay", "run", "--no-publish"])?;
  assert!(String::from_utf8_lossy(&output.stdout).contains("Nothing to release"));
  assert_eq!(ws.tags()?, vec!["engine@v0.1.0".to_string()]);
  Ok(())
}

#[test]
fn test_run_without_token_is_partial() -> Result<()> {
  let ws = two_crate_workspace()?;

  let output = cargo_relay(&ws.path, &["relay", "run"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);

  assert_eq!(output.status.code(), Some(4), "{}", stdout);
  assert!(stdout.contains("CARGO_REGISTRY_TOKEN"), "{}", stdout);
  assert_eq!(ws.tags()?.len(), 2);
  Ok(())
}
