//! Per-unit release pipeline
//!
//! Each unit runs one [`PipelineDriver`] task through
//! `Created → Verifying → Analyzing → SeverityFinal → NotesGenerated → Tagging → Prepared → Published → Done`.
//! Units that do not release stop at `SeverityFinal` and finish as `Done`.
//!
//! Cross-unit ordering goes through the [`Synchronizer`]:
//!
//! - sequential mode verifies units one at a time (`ReadyForRelease` baton)
//! - severities are computed after every unit is analyzed (`Analyzed` barrier)
//! - notes wait until every releasing unit knows its version (`NextVersion` barrier)
//! - manifest writes, commits and tags happen under the `TagBaton`
//! - uploads wait for the unit's changed local dependencies (`Published` signals)
//!
//! Any error moves the unit to `Failed`, sets its remaining flags, fires its
//! `Published` signal, retires it and hands on any baton it holds, so siblings
//! never wait on it.

use crate::cargo::manifest::{CargoManifest, ManifestStore};
use crate::cargo::registry::Registry;
use crate::core::config::ReleaseOptions;
use crate::core::error::{ReleaseError, RelayError, RelayResult, ResultExt};
use crate::core::vcs::VersionControl;
use crate::release::commits::{ConventionalCommit, classify};
use crate::release::notes::{DependencyUpgrade, ReleaseNotes, prepend_changelog};
use crate::release::prerelease::{bump, first_release};
use crate::release::propagation::propagate;
use crate::release::resolver::resolve_constraint;
use crate::release::unit::{Flag, Phase, Unit, UnitId, UnitState};
use crate::sync::{Probe, Synchronizer};
use crate::ui::PhaseProgress;
use semver::Version;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span};

/// External systems a release run talks to
#[derive(Clone)]
pub struct Collaborators {
  pub vcs: Arc<dyn VersionControl>,
  pub registry: Arc<dyn Registry>,
  pub manifests: Arc<dyn ManifestStore>,
}

/// Shared state of one release run
pub struct RunContext {
  pub sync: Arc<Synchronizer>,
  pub collaborators: Collaborators,
  pub options: ReleaseOptions,
  /// Workspace root manifest, holding `[workspace.dependencies]`
  pub root_manifest: PathBuf,
  pub progress: PhaseProgress,
  /// Release date used in notes
  pub date: String,
}

/// Sequential mode: waiting to be verified
fn not_ready(s: &UnitState) -> bool {
  !s.flags.contains(Flag::Ready)
}

/// Releasing and still waiting for the tag baton
fn awaiting_tag(s: &UnitState) -> bool {
  s.is_releasing() && !s.flags.contains(Flag::Tagged)
}

/// Drives one unit through its release pipeline
pub struct PipelineDriver {
  unit: Arc<Unit>,
  ctx: Arc<RunContext>,
}

impl PipelineDriver {
  pub fn new(unit: Arc<Unit>, ctx: Arc<RunContext>) -> Self {
    Self { unit, ctx }
  }

  /// Run the pipeline to completion. Errors are recorded on the unit.
  pub async fn run(self) -> Phase {
    let span = info_span!("release", unit = %self.unit.name);
    let result = self.drive().instrument(span).await;

    match result {
      Ok(()) => {
        self.enter(Phase::Done).ok();
        self.ctx.sync.retire(self.unit.id);
      }
      Err(err) => abandon(&self.ctx, &self.unit, &err),
    }
    self.unit.phase()
  }

  async fn drive(&self) -> RelayResult<()> {
    let commits = self.verify_and_analyze().await?;

    let Some(next) = self.finalize_severity().await? else {
      return Ok(());
    };

    self.generate_notes(&next, commits)?;
    if self.ctx.options.dry_run {
      self.unit.update(|s| {
        s.flags.insert(Flag::Tagged);
        s.flags.insert(Flag::Published);
      });
      self.ctx.sync.signal_for(Probe::Published, self.unit.id);
      return Ok(());
    }

    self.tag(&next).await?;
    self.prepare(&next).await?;
    self.publish(&next).await
  }

  async fn verify_and_analyze(&self) -> RelayResult<Vec<ConventionalCommit>> {
    let sync = &self.ctx.sync;
    let options = &self.ctx.options;
    let id = self.unit.id;

    if options.sequential {
      sync.grant_first(Probe::ReadyForRelease, not_ready);
      sync.wait_for(Probe::ReadyForRelease, id).wait().await;
    }

    self.enter(Phase::Verifying)?;
    let verified = self.verify().await;
    self.unit.set_flag(Flag::Ready);
    if options.sequential {
      sync.pass_baton(Probe::ReadyForRelease, id, not_ready);
    }
    verified?;

    self.enter(Phase::Analyzing)?;
    let vcs = &self.ctx.collaborators.vcs;
    let last_release = vcs
      .last_release(&self.unit, &options.tag_format, options.prerelease.as_ref())
      .await?;
    let since = last_release.as_ref().map(|r| r.git_head.clone());
    let commits: Vec<ConventionalCommit> = vcs
      .commits(&self.unit, since.as_deref(), options.first_parent)
      .await?
      .iter()
      .map(ConventionalCommit::parse)
      .collect();
    let own = classify(&commits);
    debug!(
      last = ?last_release.as_ref().map(|r| r.version.to_string()),
      commits = commits.len(),
      severity = %own,
      "analyzed history"
    );

    self.unit.update(|s| {
      s.last_release = last_release;
      s.own_severity = Some(own);
      s.flags.insert(Flag::Analyzed);
    });
    sync
      .barrier(Probe::Analyzed, |_| true, |s| s.flags.contains(Flag::Analyzed))
      .wait()
      .await;

    Ok(commits)
  }

  async fn verify(&self) -> RelayResult<()> {
    self.ctx.collaborators.vcs.verify().await?;
    if !self.ctx.options.dry_run {
      self.ctx.collaborators.registry.verify(&self.unit).await?;
    }
    Ok(())
  }

  /// Propagate severities; returns the next version if the unit releases
  async fn finalize_severity(&self) -> RelayResult<Option<Version>> {
    let sync = &self.ctx.sync;
    let channel = self.ctx.options.prerelease.as_ref();
    let severity = propagate(&self.unit, sync, &self.ctx.options.deps, channel).await;

    self.enter(Phase::SeverityFinal)?;
    let next = self.unit.update(|s| {
      s.flags.insert(Flag::SeverityStable);
      if !severity.is_release() {
        return None;
      }
      let next = match s.last_version() {
        Some(last) => bump(last, severity, channel),
        None => first_release(&self.unit.manifest_version, channel),
      };
      s.next_version = Some(next.clone());
      Some(next)
    });

    let Some(next) = next else {
      info!("no release needed");
      return Ok(None);
    };
    info!(severity = %severity, version = %next, "releasing");

    sync
      .barrier(Probe::NextVersion, UnitState::may_release, |s| s.next_version.is_some())
      .wait()
      .await;
    Ok(Some(next))
  }

  fn generate_notes(&self, next: &Version, commits: Vec<ConventionalCommit>) -> RelayResult<()> {
    self.enter(Phase::NotesGenerated)?;

    let mut notes = ReleaseNotes::new(&self.unit.name, next.clone(), &self.ctx.date);
    for commit in commits {
      notes.add_commit(commit);
    }
    for dep in self.changed_dependencies() {
      notes.add_dependency(DependencyUpgrade {
        name: dep.name.clone(),
        version: self.dependency_version(&dep)?,
      });
    }

    let markdown = notes.to_markdown();
    self.unit.update(|s| {
      s.notes = Some(markdown);
      s.flags.insert(Flag::ReadyToTag);
    });
    Ok(())
  }

  async fn tag(&self, next: &Version) -> RelayResult<()> {
    let sync = &self.ctx.sync;
    let id = self.unit.id;

    self.enter(Phase::Tagging)?;
    sync.grant_first(Probe::TagBaton, awaiting_tag);
    sync.wait_for(Probe::TagBaton, id).wait().await;

    debug!("holding tag baton");
    let result = self.write_release(next).await;
    self.unit.set_flag(Flag::Tagged);
    sync.pass_baton(Probe::TagBaton, id, awaiting_tag);
    result
  }

  /// Rewrite manifests, update the changelog, commit and tag. Runs under the tag baton.
  async fn write_release(&self, next: &Version) -> RelayResult<()> {
    let store = &self.ctx.collaborators.manifests;
    let policy = &self.ctx.options.deps;

    let mut manifest = store.load(&self.unit.manifest_path)?;
    manifest.set_version(next)?;
    let mut root: Option<CargoManifest> = None;

    for dep in self.changed_dependencies() {
      let version = self.dependency_version(&dep)?.to_string();

      for req in self.unit.requirements.get(&dep.name).into_iter().flatten() {
        let resolved = resolve_constraint(&req.requirement, &version, policy.strategy, policy.prefix);
        if resolved == req.requirement {
          continue;
        }
        debug!(dependency = %dep.name, scope = %req.scope, from = %req.requirement, to = %resolved, "rewriting requirement");

        let written = if !req.inherited {
          manifest.set_requirement(&req.scope, &req.key, &resolved)
        } else if manifest.path() == self.ctx.root_manifest {
          manifest.set_workspace_requirement(&req.key, &resolved)
        } else {
          if root.is_none() {
            root = Some(store.load(&self.ctx.root_manifest)?);
          }
          root
            .as_mut()
            .is_some_and(|root| root.set_workspace_requirement(&req.key, &resolved))
        };
        if !written {
          return Err(RelayError::message(format!(
            "Could not update {} requirement on {} in {}",
            self.unit.name, dep.name, req.scope
          )));
        }
      }
    }

    store.save(&manifest)?;
    let mut paths = vec![self.unit.manifest_path.clone()];
    if let Some(root) = &root {
      store.save(root)?;
      paths.push(self.ctx.root_manifest.clone());
    }

    if let Some(file) = &self.ctx.options.changelog {
      let path = self.unit.dir.join(file);
      let existing = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(RelayError::from(e).context(format!("Failed to read {}", path.display()))),
      };
      let notes = self.unit.read(|s| s.notes.clone()).unwrap_or_default();
      tokio::fs::write(&path, prepend_changelog(&existing, &notes))
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
      paths.push(path);
    }

    let tag = self.ctx.options.tag_format.format(&self.unit.name, next);
    let vcs = &self.ctx.collaborators.vcs;
    vcs.commit_release(&paths, &format!("chore(release): {}", tag)).await?;
    vcs.create_tag(&tag, &format!("Release {}", tag)).await?;
    info!(tag = %tag, "tagged");
    Ok(())
  }

  /// Version a changed dependency is released at, new or previous
  fn dependency_version(&self, dep: &Unit) -> RelayResult<Version> {
    dep
      .read(|s| s.next_version.clone().or_else(|| s.last_version().cloned()))
      .ok_or_else(|| {
        RelayError::Release(ReleaseError::UnresolvedDependency {
          unit: self.unit.name.clone(),
          dependency: dep.name.clone(),
        })
      })
  }

  async fn prepare(&self, next: &Version) -> RelayResult<()> {
    self.enter(Phase::Prepared)?;

    // Packaging resolves dependencies from the registry, so changed ones must be uploaded first
    for dep in self.changed_dependencies() {
      if !dep.read(|s| s.next_version.is_some() || s.is_failed()) {
        continue;
      }
      self.ctx.sync.wait_for(Probe::Published, dep.id).wait().await;
      if dep.read(UnitState::is_failed) {
        return Err(RelayError::Release(ReleaseError::DependencyFailed {
          unit: self.unit.name.clone(),
          dependency: dep.name.clone(),
        }));
      }
    }

    self.ctx.collaborators.registry.prepare(&self.unit, next).await
  }

  async fn publish(&self, next: &Version) -> RelayResult<()> {
    let sync = &self.ctx.sync;
    let id = self.unit.id;

    self.enter(Phase::Published)?;
    let descriptor = self.ctx.collaborators.registry.publish(&self.unit, next).await?;
    info!(version = %descriptor.version, url = ?descriptor.url, "published");

    self.unit.update(|s| {
      s.release = Some(descriptor);
      s.flags.insert(Flag::Published);
    });
    sync.signal_for(Probe::Published, id);

    sync
      .barrier(Probe::Published, UnitState::is_releasing, |s| s.flags.contains(Flag::Published))
      .wait()
      .await;
    if sync.grant_next(Probe::Announce, Some(id)) {
      announce(sync);
    }
    Ok(())
  }

  fn changed_dependencies(&self) -> Vec<Arc<Unit>> {
    let ids: Vec<UnitId> = self.unit.read(|s| s.changed_dependencies.clone());
    ids
      .into_iter()
      .filter_map(|id| self.ctx.sync.units().get(id).cloned())
      .collect()
  }

  fn enter(&self, phase: Phase) -> RelayResult<()> {
    let from = self.unit.phase();
    if !self.unit.advance(phase) {
      return Err(RelayError::Release(ReleaseError::Task {
        unit: self.unit.name.clone(),
        reason: format!("illegal transition {} → {}", from, phase),
      }));
    }
    debug!(unit = %self.unit.name, %from, to = %phase, "phase");
    self.ctx.progress.update(self.unit.id, phase);
    Ok(())
  }
}

/// Aggregate success step, run once by the unit that wins the election
fn announce(sync: &Synchronizer) {
  let released: Vec<String> = sync
    .units()
    .iter()
    .filter_map(|u| u.read(|s| s.release.as_ref().map(|r| format!("{}@{}", r.name, r.version))))
    .collect();
  info!(count = released.len(), "all releasing crates published");
  println!("🎉 Published {}", released.join(", "));
}

/// Record a failure and take the unit out of every barrier and baton
pub(crate) fn abandon(ctx: &RunContext, unit: &Unit, err: &RelayError) {
  let message = err.to_string();
  error!(unit = %unit.name, error = %message, "release failed");

  unit.update(|s| {
    s.failure = Some(message);
    for flag in Flag::ALL {
      s.flags.insert(flag);
    }
    if s.phase.can_advance_to(Phase::Failed) {
      s.phase = Phase::Failed;
    }
  });
  ctx.progress.update(unit.id, Phase::Failed);

  let sync = &ctx.sync;
  sync.signal_for(Probe::Published, unit.id);
  sync.retire(unit.id);
  sync.pass_baton(Probe::ReadyForRelease, unit.id, not_ready);
  sync.pass_baton(Probe::TagBaton, unit.id, awaiting_tag);
}
