//! `cargo relay run`

use crate::core::config::ReleaseOverrides;
use crate::core::context::WorkspaceContext;
use crate::core::error::{ExitCode, RelayResult};
use crate::release::RunReport;
use std::io::IsTerminal;
use tracing::info;

/// Release every crate with changes; returns `Partial` if any queued crate failed
pub async fn run_release(ctx: &WorkspaceContext, overrides: ReleaseOverrides) -> RelayResult<Option<ExitCode>> {
  let options = ctx.options(overrides)?;
  let specs = ctx.unit_specs()?;
  let collaborators = ctx.collaborators(&options);

  if options.dry_run {
    println!("🔍 Dry run: nothing will be written, tagged or published\n");
  }
  info!(crates = specs.len(), dry_run = options.dry_run, "starting release run");

  let report = crate::release::execute(
    specs,
    collaborators,
    options,
    ctx.root_manifest_path(),
    std::io::stderr().is_terminal(),
  )
  .await?;

  print_report(&report);

  if report.is_partial() {
    return Ok(Some(ExitCode::Partial));
  }
  Ok(None)
}

fn print_report(report: &RunReport) {
  if report.queued == 0 {
    println!("✅ Nothing to release");
    return;
  }

  for unit in report.units.iter().filter(|u| u.is_released()) {
    match (&unit.tag, &unit.next_version) {
      (Some(tag), _) if !report.dry_run => println!("📦 {}", tag),
      (_, Some(version)) => println!("📦 {} -> {}", unit.name, version),
      _ => {}
    }
  }

  let failures: Vec<_> = report.failures().collect();
  if !failures.is_empty() {
    println!();
    for unit in failures {
      println!("❌ {}: {}", unit.name, unit.failure.as_deref().unwrap_or("failed"));
    }
  }

  println!();
  if report.is_partial() {
    println!("⚠️  {}", report.summary());
  } else {
    println!("✅ {}", report.summary());
  }
}
