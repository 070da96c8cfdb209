//! `cargo relay plan`

use crate::core::config::ReleaseOverrides;
use crate::core::context::WorkspaceContext;
use crate::core::error::RelayResult;

/// Compute the release decisions without writing anything
pub async fn run_plan(ctx: &WorkspaceContext, mut overrides: ReleaseOverrides, json: bool) -> RelayResult<()> {
  overrides.dry_run = true;
  let options = ctx.options(overrides)?;
  let specs = ctx.unit_specs()?;
  let collaborators = ctx.collaborators(&options);

  let report = crate::release::execute(specs, collaborators, options, ctx.root_manifest_path(), false).await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&report)?);
    return Ok(());
  }

  print!("{}", report.to_table());
  println!();
  println!("📋 {}", report.summary());
  println!("   plan id: {}", &report.plan_id[..12]);
  for unit in report.failures() {
    println!("❌ {}: {}", unit.name, unit.failure.as_deref().unwrap_or("failed"));
  }
  Ok(())
}
