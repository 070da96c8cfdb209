//! Integration tests for `cargo relay plan`

use crate::helpers::{TestWorkspace, cargo_relay, run_cargo_relay, two_crate_workspace};
use anyhow::Result;
use serde_json::Value;

fn unit<'a>(plan: &'a Value, name: &str) -> &'a Value {
  plan["units"]
    .as_array()
    .and_then(|units| units.iter().find(|u| u["name"] == name))
    .unwrap_or_else(|| panic!("{} missing from plan: {}", name, plan))
}

fn plan_json(ws: &TestWorkspace, extra: &[&str]) -> Result<Value> {
  let mut args = vec!["relay", "plan", "--json"];
  args.extend_from_slice(extra);
  let output = run_cargo_relay(&ws.path, &args)?;
  Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn test_plan_json_propagates_to_dependents() -> Result<()> {
  let ws = two_crate_workspace()?;
  let plan = plan_json(&ws, &[])?;

  assert_eq!(plan["dry_run"], true);
  assert_eq!(plan["queued"], 2);
  assert_eq!(plan["plan_id"].as_str().map(str::len), Some(64));

  let engine = unit(&plan, "engine");
  assert_eq!(engine["current_version"], "0.1.0");
  assert_eq!(engine["next_version"], "0.2.0");
  assert_eq!(engine["own_severity"], "minor");

  let cli = unit(&plan, "cli");
  assert_eq!(cli["own_severity"], "none");
  assert_eq!(cli["effective_severity"], "patch");
  assert_eq!(cli["next_version"], "0.1.1");
  assert_eq!(cli["changed_dependencies"], serde_json::json!(["engine"]));

  Ok(())
}

#[test]
fn test_plan_leaves_repository_untouched() -> Result<()> {
  let ws = two_crate_workspace()?;
  let before = ws.read_file("crates/cli/Cargo.toml")?;

  run_cargo_relay(&ws.path, &["relay", "plan"])?;

  assert_eq!(ws.read_file("crates/cli/Cargo.toml")?, before);
  assert_eq!(ws.tags()?.len(), 2);
  assert_eq!(ws.git_log(1)?, vec!["feat(engine): add extra".to_string()]);
  Ok(())
}

#[test]
fn test_plan_table_output() -> Result<()> {
  let ws = two_crate_workspace()?;
  let output = run_cargo_relay(&ws.path, &["relay", "plan"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);

  assert!(stdout.contains("CRATE"), "missing header: {}", stdout);
  assert!(stdout.contains("engine"));
  assert!(stdout.contains("0.2.0"));
  assert!(stdout.contains("Would release 2 of 2 queued crates"), "{}", stdout);
  Ok(())
}

#[test]
fn test_plan_id_is_stable() -> Result<()> {
  let ws = two_crate_workspace()?;
  let first = plan_json(&ws, &[])?;
  let second = plan_json(&ws, &[])?;
  assert_eq!(first["plan_id"], second["plan_id"]);

  let minor = plan_json(&ws, &["--dependent-release", "minor"])?;
  assert_ne!(first["plan_id"], minor["plan_id"]);
  assert_eq!(unit(&minor, "cli")["next_version"], "0.2.0");
  Ok(())
}

#[test]
fn test_plan_exclude() -> Result<()> {
  let ws = two_crate_workspace()?;
  let plan = plan_json(&ws, &["--exclude", "cli"])?;

  let names: Vec<&str> = plan["units"]
    .as_array()
    .map(|units| units.iter().filter_map(|u| u["name"].as_str()).collect())
    .unwrap_or_default();
  assert_eq!(names, vec!["engine"]);
  Ok(())
}

#[test]
fn test_plan_first_release_uses_manifest_version() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("fresh", "0.3.0", &[])?;
  ws.commit("feat: first cut")?;

  let plan = plan_json(&ws, &[])?;
  let fresh = unit(&plan, "fresh");
  assert!(fresh["current_version"].is_null());
  assert_eq!(fresh["next_version"], "0.3.0");
  Ok(())
}

#[test]
fn test_plan_reads_relay_toml() -> Result<()> {
  let ws = two_crate_workspace()?;
  std::fs::write(ws.path.join("relay.toml"), "[deps]\nrelease = \"major\"\n")?;

  let plan = plan_json(&ws, &[])?;
  assert_eq!(unit(&plan, "cli")["next_version"], "1.0.0");
  Ok(())
}

#[test]
fn test_plan_rejects_invalid_config() -> Result<()> {
  let ws = two_crate_workspace()?;
  std::fs::write(ws.path.join("relay.toml"), "[deps]\nstrategy = \"sideways\"\n")?;

  let output = cargo_relay(&ws.path, &["relay", "plan"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(String::from_utf8_lossy(&output.stderr).contains("❌"));
  Ok(())
}

#[test]
fn test_plan_prerelease_channel() -> Result<()> {
  let ws = two_crate_workspace()?;
  let plan = plan_json(&ws, &["--prerelease", "beta"])?;

  assert_eq!(unit(&plan, "engine")["next_version"], "0.2.0-beta.1");
  assert_eq!(unit(&plan, "cli")["next_version"], "0.1.1-beta.1");
  Ok(())
}

#[test]
fn test_plan_outside_workspace() -> Result<()> {
  let dir = tempfile::TempDir::new()?;
  let output = cargo_relay(dir.path(), &["relay", "plan"])?;

  assert_eq!(output.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("No Cargo workspace found"), "{}", stderr);
  Ok(())
}
