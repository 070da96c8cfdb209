//! Release units: one workspace crate moving through the release lifecycle
//!
//! A [`Unit`] has an immutable identity (name, paths, recorded dependency
//! requirements, resolved local edges) and a mutable [`UnitState`] behind a mutex.
//! Each field of the state has exactly one writer: the unit's own pipeline task.
//! Other tasks only read it, through the synchronizer or short snapshots.

use crate::cargo::manifest::Requirement;
use crate::cargo::registry::ReleaseDescriptor;
use crate::core::vcs::LastRelease;
use crate::release::severity::Severity;
use parking_lot::Mutex;
use semver::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Index of a unit in the run's enumeration order
pub type UnitId = usize;

/// Pipeline state of a unit. Declaration order is lifecycle order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
  #[default]
  Created,
  Verifying,
  Analyzing,
  SeverityFinal,
  NotesGenerated,
  Tagging,
  Prepared,
  Published,
  Done,
  Failed,
}

impl Phase {
  pub fn is_terminal(self) -> bool {
    matches!(self, Phase::Done | Phase::Failed)
  }

  fn successor(self) -> Option<Phase> {
    match self {
      Phase::Created => Some(Phase::Verifying),
      Phase::Verifying => Some(Phase::Analyzing),
      Phase::Analyzing => Some(Phase::SeverityFinal),
      Phase::SeverityFinal => Some(Phase::NotesGenerated),
      Phase::NotesGenerated => Some(Phase::Tagging),
      Phase::Tagging => Some(Phase::Prepared),
      Phase::Prepared => Some(Phase::Published),
      Phase::Published => Some(Phase::Done),
      Phase::Done | Phase::Failed => None,
    }
  }

  /// Phases only move forward one step at a time. A unit may finish early
  /// (`Done`) or fail from any non-terminal phase.
  pub fn can_advance_to(self, next: Phase) -> bool {
    if self.is_terminal() {
      return false;
    }
    matches!(next, Phase::Done | Phase::Failed) || self.successor() == Some(next)
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Created => "created",
      Phase::Verifying => "verifying",
      Phase::Analyzing => "analyzing",
      Phase::SeverityFinal => "severity-final",
      Phase::NotesGenerated => "notes-generated",
      Phase::Tagging => "tagging",
      Phase::Prepared => "prepared",
      Phase::Published => "published",
      Phase::Done => "done",
      Phase::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// Lifecycle flag, one per phase boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
  Ready = 1,
  Analyzed = 1 << 1,
  SeverityStable = 1 << 2,
  ReadyToTag = 1 << 3,
  Tagged = 1 << 4,
  Published = 1 << 5,
}

impl Flag {
  pub const ALL: [Flag; 6] = [
    Flag::Ready,
    Flag::Analyzed,
    Flag::SeverityStable,
    Flag::ReadyToTag,
    Flag::Tagged,
    Flag::Published,
  ];
}

/// Set of lifecycle flags. Flags are only ever added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
  pub fn contains(self, flag: Flag) -> bool {
    self.0 & flag as u8 != 0
  }

  /// Returns false if the flag was already set.
  pub fn insert(&mut self, flag: Flag) -> bool {
    let fresh = !self.contains(flag);
    self.0 |= flag as u8;
    fresh
  }
}

/// One fixpoint round as recorded by a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
  pub severity: Severity,
  pub unchanged: bool,
}

/// Mutable release state of a unit
#[derive(Debug, Default)]
pub struct UnitState {
  pub phase: Phase,
  pub flags: Flags,
  /// No longer taking part in barriers or baton hand-offs
  pub terminated: bool,
  pub failure: Option<String>,
  pub own_severity: Option<Severity>,
  pub rounds: Vec<Round>,
  pub last_release: Option<LastRelease>,
  pub next_version: Option<Version>,
  pub changed_dependencies: Vec<UnitId>,
  pub notes: Option<String>,
  pub release: Option<ReleaseDescriptor>,
}

impl UnitState {
  pub fn own_severity(&self) -> Severity {
    self.own_severity.unwrap_or_default()
  }

  pub fn effective_severity(&self) -> Severity {
    self.rounds.last().map(|r| r.severity).unwrap_or_else(|| self.own_severity())
  }

  /// Severity as of the end of `round`, or the own severity before round 0.
  ///
  /// A unit that stopped early keeps reporting its last recorded value.
  pub fn severity_after(&self, round: Option<usize>) -> Severity {
    match round {
      None => self.own_severity(),
      Some(r) => self
        .rounds
        .get(r)
        .or(self.rounds.last())
        .map(|rec| rec.severity)
        .unwrap_or_else(|| self.own_severity()),
    }
  }

  pub fn has_recorded_round(&self, round: usize) -> bool {
    self.rounds.len() > round
  }

  pub fn is_failed(&self) -> bool {
    self.failure.is_some()
  }

  /// Severity is final and asks for a release
  pub fn is_releasing(&self) -> bool {
    self.flags.contains(Flag::SeverityStable) && !self.is_failed() && self.effective_severity().is_release()
  }

  /// Not yet known to be skipping the release
  pub fn may_release(&self) -> bool {
    !self.flags.contains(Flag::SeverityStable) || self.effective_severity().is_release()
  }

  pub fn last_version(&self) -> Option<&Version> {
    self.last_release.as_ref().map(|r| &r.version)
  }
}

/// Everything needed to create a unit, gathered at workspace load
#[derive(Debug, Clone)]
pub struct UnitSpec {
  pub name: String,
  pub dir: PathBuf,
  pub manifest_path: PathBuf,
  pub manifest_version: Version,
  pub private: bool,
  /// Recorded requirements per dependency name, across all dependency scopes
  pub requirements: BTreeMap<String, Vec<Requirement>>,
}

/// A workspace crate taking part in the release run
#[derive(Debug)]
pub struct Unit {
  pub id: UnitId,
  pub name: String,
  pub dir: PathBuf,
  pub manifest_path: PathBuf,
  pub manifest_version: Version,
  pub private: bool,
  pub requirements: BTreeMap<String, Vec<Requirement>>,
  /// Local dependencies, resolved once after every unit is loaded
  pub depends_on: Vec<UnitId>,
  state: Mutex<UnitState>,
}

impl Unit {
  pub fn new(id: UnitId, spec: UnitSpec, depends_on: Vec<UnitId>) -> Self {
    Self {
      id,
      name: spec.name,
      dir: spec.dir,
      manifest_path: spec.manifest_path,
      manifest_version: spec.manifest_version,
      private: spec.private,
      requirements: spec.requirements,
      depends_on,
      state: Mutex::new(UnitState::default()),
    }
  }

  /// Read the state under the unit lock
  pub fn read<R>(&self, f: impl FnOnce(&UnitState) -> R) -> R {
    f(&self.state.lock())
  }

  /// Mutate the state under the unit lock. Only the unit's own task calls this.
  pub(crate) fn update<R>(&self, f: impl FnOnce(&mut UnitState) -> R) -> R {
    f(&mut self.state.lock())
  }

  pub fn phase(&self) -> Phase {
    self.read(|s| s.phase)
  }

  pub(crate) fn set_flag(&self, flag: Flag) {
    self.update(|s| {
      s.flags.insert(flag);
    });
  }

  /// Move to `next`, returning false (and staying put) on an illegal transition.
  pub(crate) fn advance(&self, next: Phase) -> bool {
    self.update(|s| {
      if s.phase.can_advance_to(next) {
        s.phase = next;
        true
      } else {
        false
      }
    })
  }
}

impl fmt::Display for Unit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)
  }
}
