//! Release run orchestration
//!
//! Builds the dependency graph, spawns one pipeline task per unit and collects
//! the outcome into a [`RunReport`].

use crate::core::config::ReleaseOptions;
use crate::core::error::{RelayError, RelayResult};
use crate::graph::DependencyGraph;
use crate::release::driver::{Collaborators, PipelineDriver, RunContext, abandon};
use crate::release::severity::Severity;
use crate::release::unit::{Phase, Unit, UnitId, UnitSpec};
use crate::sync::Synchronizer;
use crate::ui::PhaseProgress;
use semver::Version;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Drop excluded crates (and private ones when asked to)
pub fn select_units(specs: Vec<UnitSpec>, options: &ReleaseOptions) -> Vec<UnitSpec> {
  specs
    .into_iter()
    .filter(|spec| {
      let excluded = options.exclude.iter().any(|name| name == &spec.name);
      let ignored = options.ignore_private && spec.private;
      if excluded || ignored {
        debug!(unit = %spec.name, excluded, ignored, "left out of the run");
      }
      !excluded && !ignored
    })
    .collect()
}

/// Release every selected unit concurrently
pub async fn execute(
  specs: Vec<UnitSpec>,
  collaborators: Collaborators,
  options: ReleaseOptions,
  root_manifest: PathBuf,
  show_progress: bool,
) -> RelayResult<RunReport> {
  let graph = DependencyGraph::build(select_units(specs, &options))?;
  debug!(units = graph.len(), depth = graph.depth(), "dependency graph built");

  let sync = Arc::new(Synchronizer::new(graph.units().to_vec()));
  let progress = if show_progress {
    PhaseProgress::new(graph.units())
  } else {
    PhaseProgress::disabled()
  };

  let ctx = Arc::new(RunContext {
    sync,
    collaborators,
    options,
    root_manifest,
    progress,
    date: chrono::Local::now().format("%Y-%m-%d").to_string(),
  });

  let mut tasks = JoinSet::new();
  let mut task_units: HashMap<tokio::task::Id, UnitId> = HashMap::new();
  for unit in graph.units() {
    let driver = PipelineDriver::new(unit.clone(), ctx.clone());
    let handle = tasks.spawn(driver.run());
    task_units.insert(handle.id(), unit.id);
  }

  while let Some(joined) = tasks.join_next_with_id().await {
    if let Err(err) = joined {
      let Some(unit) = task_units.get(&err.id()).map(|id| graph.unit(*id)) else {
        continue;
      };
      warn!(unit = %unit.name, "release task did not complete");
      abandon(&ctx, unit, &RelayError::from(err));
    }
  }

  Ok(RunReport::collect(graph.units(), &ctx.options))
}

/// Outcome for one unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
  pub name: String,
  pub current_version: Option<Version>,
  pub next_version: Option<Version>,
  pub own_severity: Severity,
  pub effective_severity: Severity,
  pub changed_dependencies: Vec<String>,
  pub rounds: usize,
  pub phase: String,
  pub private: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure: Option<String>,
}

impl UnitReport {
  pub fn is_released(&self) -> bool {
    self.failure.is_none() && self.phase == Phase::Done.to_string() && self.effective_severity.is_release()
  }

  fn is_queued(&self) -> bool {
    self.effective_severity.is_release() || self.failure.is_some()
  }
}

/// Outcome of a release run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  /// SHA256 over the release decisions; equal plans have equal ids
  pub plan_id: String,
  pub dry_run: bool,
  pub queued: usize,
  pub released: usize,
  pub units: Vec<UnitReport>,
}

impl RunReport {
  pub fn collect(units: &[Arc<Unit>], options: &ReleaseOptions) -> Self {
    let reports: Vec<UnitReport> = units
      .iter()
      .map(|unit| {
        unit.read(|s| UnitReport {
          name: unit.name.clone(),
          current_version: s.last_version().cloned(),
          next_version: s.next_version.clone(),
          own_severity: s.own_severity(),
          effective_severity: s.effective_severity(),
          changed_dependencies: s
            .changed_dependencies
            .iter()
            .filter_map(|id| units.get(*id).map(|u| u.name.clone()))
            .collect(),
          rounds: s.rounds.len(),
          phase: s.phase.to_string(),
          private: unit.private,
          tag: s.next_version.as_ref().map(|v| options.tag_format.format(&unit.name, v)),
          url: s.release.as_ref().and_then(|r| r.url.clone()),
          failure: s.failure.clone(),
        })
      })
      .collect();

    Self {
      plan_id: plan_id(&reports),
      dry_run: options.dry_run,
      queued: reports.iter().filter(|r| r.is_queued()).count(),
      released: reports.iter().filter(|r| r.is_released()).count(),
      units: reports,
    }
  }

  /// Fewer units were released than queued
  pub fn is_partial(&self) -> bool {
    self.released < self.queued
  }

  pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
    self.units.iter().filter(|u| u.failure.is_some())
  }

  pub fn summary(&self) -> String {
    let verb = if self.dry_run { "Would release" } else { "Released" };
    format!("{} {} of {} queued crates", verb, self.released, self.queued)
  }

  /// Human-readable table of decisions
  pub fn to_table(&self) -> String {
    let width = self.units.iter().map(|u| u.name.len()).max().unwrap_or(4).max(4);
    let mut out = format!(
      "{:<width$}  {:<10}  {:<10}  {:<6}  {:<9}  {:<6}  {}\n",
      "CRATE",
      "CURRENT",
      "NEXT",
      "OWN",
      "EFFECTIVE",
      "ROUNDS",
      "CHANGED DEPS",
      width = width
    );

    for unit in &self.units {
      let current = unit
        .current_version
        .as_ref()
        .map(Version::to_string)
        .unwrap_or_else(|| "-".to_string());
      let next = unit
        .next_version
        .as_ref()
        .map(Version::to_string)
        .unwrap_or_else(|| "-".to_string());
      let deps = if unit.changed_dependencies.is_empty() {
        "-".to_string()
      } else {
        unit.changed_dependencies.join(", ")
      };
      out.push_str(&format!(
        "{:<width$}  {:<10}  {:<10}  {:<6}  {:<9}  {:<6}  {}\n",
        unit.name,
        current,
        next,
        unit.own_severity.as_str(),
        unit.effective_severity.as_str(),
        unit.rounds,
        deps,
        width = width
      ));
    }
    out
  }
}

fn plan_id(units: &[UnitReport]) -> String {
  let decisions: Vec<(&str, Option<String>, Severity, &[String])> = units
    .iter()
    .map(|u| {
      (
        u.name.as_str(),
        u.next_version.as_ref().map(Version::to_string),
        u.effective_severity,
        u.changed_dependencies.as_slice(),
      )
    })
    .collect();

  let mut hasher = Sha256::new();
  hasher.update(serde_json::to_vec(&decisions).unwrap_or_default());
  format!("{:x}", hasher.finalize())
}
