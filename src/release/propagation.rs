//! Severity propagation across local dependencies
//!
//! Every unit runs the same synchronized fixpoint inside its own task:
//!
//! 1. Round `r` reads each dependency's value as of round `r - 1` (its own
//!    severity for round 0) and computes a candidate.
//! 2. The candidate is appended to the unit's round history.
//! 3. All active units meet at the `PropagationRound(r)` barrier.
//! 4. The run is stable once every unit's round `r` left its value unchanged.
//!
//! Values only ever increase over a four-element lattice, so the loop always
//! terminates. A change travels one edge per round, so a graph of depth `D`
//! is stable after at most `D + 1` rounds.

use crate::core::config::{DependentRelease, DepsPolicy};
use crate::release::prerelease::{Channel, bump};
use crate::release::resolver::is_constraint_update_required;
use crate::release::severity::{Severity, merge_highest};
use crate::release::unit::{Round, Unit, UnitId};
use crate::sync::{Probe, Synchronizer};
use semver::Version;
use tracing::debug;

/// A dependency's state as of the previous round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeveritySnapshot {
  pub id: UnitId,
  pub last_version: Option<Version>,
  pub severity: Severity,
}

impl SeveritySnapshot {
  /// Version the dependency moves to with this severity
  pub fn next_version(&self, channel: Option<&Channel>) -> Option<Version> {
    self.last_version.as_ref().map(|v| bump(v, self.severity, channel))
  }
}

/// A dependency judged "updated" for one dependent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedDependency {
  pub released_before: bool,
  pub severity: Severity,
}

/// Whether `dep` forces a change in `unit`'s recorded requirements.
///
/// A crate that was never released always counts as updated.
pub fn is_updated(
  unit: &Unit,
  dep_name: &str,
  dep: &SeveritySnapshot,
  policy: &DepsPolicy,
  channel: Option<&Channel>,
) -> bool {
  let Some(next) = dep.next_version(channel) else {
    return true;
  };
  let next = next.to_string();
  unit.requirements.get(dep_name).is_some_and(|reqs| {
    reqs
      .iter()
      .any(|req| is_constraint_update_required(&req.requirement, &next, policy.strategy, policy.prefix))
  })
}

/// Candidate severity for one round.
///
/// `previous` is the unit's value from the previous round.
pub fn candidate(
  previous: Severity,
  has_last_release: bool,
  updated: &[UpdatedDependency],
  rule: DependentRelease,
) -> Severity {
  let all_quiet = updated.iter().all(|d| d.released_before && d.severity == Severity::None);
  if !has_last_release || updated.is_empty() || all_quiet {
    return previous;
  }

  match rule.severity() {
    Some(fixed) => previous.combine(fixed),
    None => previous.combine(merge_highest(updated.iter().map(|d| d.severity))),
  }
}

/// Run the fixpoint for `unit` until the whole run is stable.
///
/// Returns the unit's effective severity and records every updated dependency,
/// released or not, as changed.
pub async fn propagate(unit: &Unit, sync: &Synchronizer, policy: &DepsPolicy, channel: Option<&Channel>) -> Severity {
  let mut round = 0usize;

  loop {
    let before = round.checked_sub(1);
    let deps = snapshots(unit, sync, before);
    let updated: Vec<UpdatedDependency> = deps
      .iter()
      .filter(|(name, snap)| is_updated(unit, name, snap, policy, channel))
      .map(|(_, snap)| UpdatedDependency {
        released_before: snap.last_version.is_some(),
        severity: snap.severity,
      })
      .collect();

    let (previous, has_last_release) = unit.read(|s| (s.severity_after(before), s.last_release.is_some()));
    let next = candidate(previous, has_last_release, &updated, policy.release);
    unit.update(|s| {
      s.rounds.push(Round {
        severity: next,
        unchanged: next == previous,
      })
    });
    debug!(unit = %unit.name, round, severity = %next, changed = next != previous, "propagation round");

    sync
      .barrier(Probe::PropagationRound(round as u32), |_| true, move |s| s.has_recorded_round(round))
      .wait()
      .await;

    if is_stable(sync, round) {
      break;
    }
    round += 1;
  }

  let changed: Vec<UnitId> = snapshots(unit, sync, Some(round))
    .into_iter()
    .filter(|(name, snap)| is_updated(unit, name, snap, policy, channel))
    .map(|(_, snap)| snap.id)
    .collect();

  unit.update(|s| {
    s.changed_dependencies = changed;
    s.effective_severity()
  })
}

/// Snapshots of `unit`'s local dependencies as of `round`, keyed by crate name
fn snapshots<'a>(unit: &Unit, sync: &'a Synchronizer, round: Option<usize>) -> Vec<(&'a str, SeveritySnapshot)> {
  unit
    .depends_on
    .iter()
    .filter_map(|id| sync.units().get(*id))
    .map(|dep| {
      let snapshot = dep.read(|s| SeveritySnapshot {
        id: dep.id,
        last_version: s.last_version().cloned(),
        severity: s.severity_after(round),
      });
      (dep.name.as_str(), snapshot)
    })
    .collect()
}

fn is_stable(sync: &Synchronizer, round: usize) -> bool {
  sync
    .units()
    .iter()
    .all(|u| u.read(|s| s.rounds.get(round).is_none_or(|r| r.unchanged)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::vcs::LastRelease;
  use crate::graph::DependencyGraph;
  use crate::graph::dependency_graph::tests::spec;
  use crate::release::resolver::{BumpStrategy, VersionPrefix};
  use crate::release::unit::{Flag, UnitSpec};
  use std::sync::Arc;

  fn quiet() -> UpdatedDependency {
    UpdatedDependency {
      released_before: true,
      severity: Severity::None,
    }
  }

  fn changed(severity: Severity) -> UpdatedDependency {
    UpdatedDependency {
      released_before: true,
      severity,
    }
  }

  #[test]
  fn test_candidate_keeps_previous_without_updates() {
    let p = Severity::Patch;
    assert_eq!(candidate(p, false, &[changed(Severity::Major)], DependentRelease::Inherit), p);
    assert_eq!(candidate(p, true, &[], DependentRelease::Major), p);
    assert_eq!(candidate(p, true, &[quiet(), quiet()], DependentRelease::Major), p);
  }

  #[test]
  fn test_candidate_applies_rule() {
    assert_eq!(
      candidate(Severity::None, true, &[changed(Severity::Major)], DependentRelease::Patch),
      Severity::Patch
    );
    assert_eq!(
      candidate(Severity::Minor, true, &[changed(Severity::Major)], DependentRelease::Patch),
      Severity::Minor
    );
    assert_eq!(
      candidate(Severity::None, true, &[quiet(), changed(Severity::Minor)], DependentRelease::Inherit),
      Severity::Minor
    );

    let new_crate = UpdatedDependency {
      released_before: false,
      severity: Severity::None,
    };
    assert_eq!(
      candidate(Severity::None, true, &[new_crate], DependentRelease::Minor),
      Severity::Minor
    );
  }

  struct Setup {
    sync: Arc<Synchronizer>,
  }

  impl Setup {
    /// `units`: (spec, last released version, own severity)
    fn new(units: Vec<(UnitSpec, Option<&str>, Severity)>) -> Self {
      let mut seeds = Vec::new();
      let mut specs = Vec::new();
      for (spec, last, own) in units {
        seeds.push((spec.name.clone(), last.map(|v| Version::parse(v).unwrap()), own));
        specs.push(spec);
      }

      let graph = DependencyGraph::build(specs).unwrap();
      for (name, last, own) in seeds {
        let unit = graph.find(&name).unwrap();
        unit.update(|s| {
          s.own_severity = Some(own);
          s.last_release = last.map(|version| LastRelease {
            tag: format!("{}@v{}", name, version),
            version,
            git_head: "0000000".to_string(),
          });
          s.flags.insert(Flag::Analyzed);
        });
      }

      Self {
        sync: Arc::new(Synchronizer::new(graph.units().to_vec())),
      }
    }

    async fn run(&self, strategy: BumpStrategy, release: DependentRelease) {
      self.run_on(strategy, release, None).await;
    }

    async fn run_on(&self, strategy: BumpStrategy, release: DependentRelease, channel: Option<Channel>) {
      let policy = DepsPolicy {
        strategy,
        prefix: VersionPrefix::Caret,
        release,
      };
      let mut tasks = tokio::task::JoinSet::new();
      for unit in self.sync.units().to_vec() {
        let sync = self.sync.clone();
        let channel = channel.clone();
        tasks.spawn(async move { propagate(&unit, &sync, &policy, channel.as_ref()).await });
      }
      while let Some(result) = tasks.join_next().await {
        result.unwrap();
      }
    }

    fn unit(&self, name: &str) -> &Arc<Unit> {
      self.sync.units().iter().find(|u| u.name == name).unwrap()
    }

    fn severity(&self, name: &str) -> Severity {
      self.unit(name).read(|s| s.effective_severity())
    }

    fn rounds(&self, name: &str) -> usize {
      self.unit(name).read(|s| s.rounds.len())
    }
  }

  fn pair() -> Setup {
    Setup::new(vec![
      (spec("a", &[]), Some("1.0.0"), Severity::Minor),
      (spec("b", &[("a", "^1.0.0")]), Some("1.0.0"), Severity::None),
    ])
  }

  #[tokio::test]
  async fn test_inherit_keeps_satisfied_dependent() {
    let setup = pair();
    setup.run(BumpStrategy::Inherit, DependentRelease::Inherit).await;

    assert_eq!(setup.severity("a"), Severity::Minor);
    assert_eq!(setup.severity("b"), Severity::None);
    assert!(setup.unit("b").read(|s| s.changed_dependencies.is_empty()));
  }

  #[tokio::test]
  async fn test_override_bumps_dependent() {
    let setup = pair();
    setup.run(BumpStrategy::Override, DependentRelease::Patch).await;

    assert_eq!(setup.severity("b"), Severity::Patch);
    let a = setup.unit("a").id;
    assert_eq!(setup.unit("b").read(|s| s.changed_dependencies.clone()), vec![a]);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_chain_converges_within_depth_plus_one() {
    let setup = Setup::new(vec![
      (spec("a", &[]), Some("1.0.0"), Severity::Patch),
      (spec("b", &[("a", "^1.0.0")]), Some("1.0.0"), Severity::None),
      (spec("c", &[("b", "^1.0.0")]), Some("1.0.0"), Severity::None),
      (spec("d", &[("c", "^1.0.0")]), Some("1.0.0"), Severity::None),
    ]);
    setup.run(BumpStrategy::Override, DependentRelease::Patch).await;

    for name in ["a", "b", "c", "d"] {
      assert_eq!(setup.severity(name), Severity::Patch, "{} should be released", name);
      assert!(setup.rounds(name) <= 4, "depth 3 must settle in at most 4 rounds");
    }
  }

  #[tokio::test]
  async fn test_diamond_inherits_highest() {
    let setup = Setup::new(vec![
      (spec("base", &[]), Some("1.0.0"), Severity::Major),
      (spec("left", &[("base", "^1.0.0")]), Some("1.0.0"), Severity::Patch),
      (spec("right", &[("base", "^1.0.0")]), Some("2.3.0"), Severity::None),
      (spec("top", &[("left", "^1.0.0"), ("right", "^2.3.0")]), Some("0.4.0"), Severity::None),
    ]);
    setup.run(BumpStrategy::Satisfy, DependentRelease::Inherit).await;

    assert_eq!(setup.severity("left"), Severity::Major);
    assert_eq!(setup.severity("right"), Severity::Major);
    assert_eq!(setup.severity("top"), Severity::Major);
    assert!(setup.rounds("top") <= 3);
  }

  #[tokio::test]
  async fn test_unreleased_dependency_counts_as_updated() {
    let setup = Setup::new(vec![
      (spec("fresh", &[]), None, Severity::Minor),
      (spec("user", &[("fresh", "^0.1.0")]), Some("1.0.0"), Severity::None),
    ]);
    setup.run(BumpStrategy::Satisfy, DependentRelease::Patch).await;

    assert_eq!(setup.severity("user"), Severity::Patch);
  }

  #[tokio::test]
  async fn test_prerelease_leaves_satisfied_range() {
    // `1.1.0-beta.1` does not match `^1.0.0`, while `1.1.0` does
    let setup = pair();
    setup
      .run_on(BumpStrategy::Satisfy, DependentRelease::Patch, Some(Channel::new("beta").unwrap()))
      .await;
    assert_eq!(setup.severity("b"), Severity::Patch);

    let stable = pair();
    stable.run(BumpStrategy::Satisfy, DependentRelease::Patch).await;
    assert_eq!(stable.severity("b"), Severity::None);
  }

  #[tokio::test]
  async fn test_unreleased_quiet_dependency_is_recorded_as_changed() {
    let setup = Setup::new(vec![
      (spec("fresh", &[]), None, Severity::None),
      (spec("user", &[("fresh", "^0.1.0")]), Some("1.0.0"), Severity::None),
    ]);
    setup.run(BumpStrategy::Override, DependentRelease::Patch).await;

    assert_eq!(setup.severity("fresh"), Severity::None);
    assert_eq!(setup.severity("user"), Severity::Patch);
    let fresh = setup.unit("fresh").id;
    assert_eq!(setup.unit("user").read(|s| s.changed_dependencies.clone()), vec![fresh]);
  }

  #[tokio::test]
  async fn test_quiet_dependencies_do_not_propagate() {
    let setup = Setup::new(vec![
      (spec("a", &[]), Some("1.0.0"), Severity::None),
      (spec("b", &[("a", "=0.9.0")]), Some("1.0.0"), Severity::None),
    ]);
    setup.run(BumpStrategy::Override, DependentRelease::Major).await;

    assert_eq!(setup.severity("b"), Severity::None);
    assert_eq!(setup.rounds("b"), 1);
  }
}
