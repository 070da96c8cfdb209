//! Per-run coordination between unit pipelines
//!
//! The [`Synchronizer`] owns three tables behind one short-lived lock:
//!
//! - **signals**: one-shot `watch` channels keyed by probe (and optionally by unit).
//!   A fired signal stays fired; later waiters return immediately.
//! - **barriers**: conditions over every active unit in scope. Re-evaluated on
//!   each `barrier` call and whenever a unit retires.
//! - **elections**: the current baton holder per probe and every grant ever made.
//!   A unit is granted a given probe at most once per run.
//!
//! Lock order is the table lock first, then unit state locks. Neither is held
//! across an `.await`.

use crate::release::unit::{Unit, UnitId, UnitState};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

/// A named synchronization point in the release pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
  /// Baton, sequential mode only
  ReadyForRelease,
  /// Barrier: every unit has its own severity
  Analyzed,
  /// Barrier: every unit recorded the given propagation round
  PropagationRound(u32),
  /// Barrier: every releasing unit knows its next version
  NextVersion,
  /// Baton guarding manifest writes, commits and tags
  TagBaton,
  /// Barrier over releasing units, plus one addressed signal per unit
  Published,
  /// Election for the aggregate success step
  Announce,
}

impl fmt::Display for Probe {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Probe::ReadyForRelease => f.write_str("ready-for-release"),
      Probe::Analyzed => f.write_str("analyzed"),
      Probe::PropagationRound(r) => write!(f, "propagation-round-{}", r),
      Probe::NextVersion => f.write_str("next-version"),
      Probe::TagBaton => f.write_str("tag-baton"),
      Probe::Published => f.write_str("published"),
      Probe::Announce => f.write_str("announce"),
    }
  }
}

/// Predicate over a unit's state
pub type StatePredicate = Arc<dyn Fn(&UnitState) -> bool + Send + Sync>;

type SignalKey = (Probe, Option<UnitId>);

struct PendingBarrier {
  scope: StatePredicate,
  condition: StatePredicate,
}

#[derive(Default)]
struct Tables {
  signals: HashMap<SignalKey, watch::Sender<bool>>,
  barriers: HashMap<Probe, PendingBarrier>,
  holders: HashMap<Probe, UnitId>,
  granted: HashSet<(Probe, UnitId)>,
}

impl Tables {
  fn sender(&mut self, key: SignalKey) -> &watch::Sender<bool> {
    self.signals.entry(key).or_insert_with(|| watch::channel(false).0)
  }

  fn fire(&mut self, key: SignalKey) {
    let sender = self.sender(key);
    if !*sender.borrow() {
      sender.send_replace(true);
      trace!(probe = %key.0, unit = ?key.1, "fired");
    }
  }

  fn is_fired(&self, key: &SignalKey) -> bool {
    self.signals.get(key).is_some_and(|s| *s.borrow())
  }

  fn waiter(&mut self, key: SignalKey) -> Waiter {
    Waiter {
      rx: self.sender(key).subscribe(),
    }
  }
}

/// Suspends until a signal fires
#[must_use = "a waiter does nothing until awaited"]
pub struct Waiter {
  rx: watch::Receiver<bool>,
}

impl Waiter {
  pub async fn wait(mut self) {
    // The sender lives as long as the synchronizer, which outlives every waiter
    let _ = self.rx.wait_for(|fired| *fired).await;
  }
}

/// Signals, barriers and batons for one release run
pub struct Synchronizer {
  units: Vec<Arc<Unit>>,
  tables: Mutex<Tables>,
}

impl Synchronizer {
  /// `units` must be in enumeration order
  pub fn new(units: Vec<Arc<Unit>>) -> Self {
    Self {
      units,
      tables: Mutex::new(Tables::default()),
    }
  }

  pub fn units(&self) -> &[Arc<Unit>] {
    &self.units
  }

  /// Fire `probe`. No-op if already fired.
  pub fn signal(&self, probe: Probe) {
    self.tables.lock().fire((probe, None));
  }

  /// Fire the signal addressed to `unit`
  pub fn signal_for(&self, probe: Probe, unit: UnitId) {
    self.tables.lock().fire((probe, Some(unit)));
  }

  pub fn wait(&self, probe: Probe) -> Waiter {
    self.tables.lock().waiter((probe, None))
  }

  /// Wait until `unit` is granted `probe` (or its addressed signal fires)
  pub fn wait_for(&self, probe: Probe, unit: UnitId) -> Waiter {
    self.tables.lock().waiter((probe, Some(unit)))
  }

  pub fn is_fired(&self, probe: Probe) -> bool {
    self.tables.lock().is_fired(&(probe, None))
  }

  pub fn is_fired_for(&self, probe: Probe, unit: UnitId) -> bool {
    self.tables.lock().is_fired(&(probe, Some(unit)))
  }

  /// Current baton holder for `probe`
  pub fn holder(&self, probe: Probe) -> Option<UnitId> {
    self.tables.lock().holders.get(&probe).copied()
  }

  /// Grant `probe` to `candidate` if nobody holds it and the candidate is an
  /// active unit that was never granted it before.
  pub fn grant_next(&self, probe: Probe, candidate: Option<UnitId>) -> bool {
    let mut tables = self.tables.lock();
    self.grant_locked(&mut tables, probe, candidate)
  }

  /// Grant `probe` to the first active, never-granted unit matching `eligible`.
  ///
  /// Candidate selection and the grant happen under one lock, so a unit that
  /// retires concurrently is never handed a baton it cannot pass on.
  pub fn grant_first(&self, probe: Probe, eligible: impl Fn(&UnitState) -> bool) -> Option<UnitId> {
    let mut tables = self.tables.lock();
    self.grant_first_locked(&mut tables, probe, &eligible)
  }

  /// Release `probe` if `holder` holds it, then grant it to the first eligible unit.
  pub fn pass_baton(&self, probe: Probe, holder: UnitId, eligible: impl Fn(&UnitState) -> bool) -> Option<UnitId> {
    let mut tables = self.tables.lock();
    if tables.holders.get(&probe) != Some(&holder) {
      return None;
    }
    tables.holders.remove(&probe);
    trace!(probe = %probe, unit = holder, "baton released");
    self.grant_first_locked(&mut tables, probe, &eligible)
  }

  /// Wait until `condition` holds for every active unit matching `scope`.
  ///
  /// Fires immediately when already satisfied; otherwise registers the barrier
  /// so later calls and retirements can complete it.
  pub fn barrier(
    &self,
    probe: Probe,
    scope: impl Fn(&UnitState) -> bool + Send + Sync + 'static,
    condition: impl Fn(&UnitState) -> bool + Send + Sync + 'static,
  ) -> Waiter {
    let mut tables = self.tables.lock();
    let waiter = tables.waiter((probe, None));
    if tables.is_fired(&(probe, None)) {
      return waiter;
    }

    let pending = PendingBarrier {
      scope: Arc::new(scope),
      condition: Arc::new(condition),
    };
    if self.barrier_met(&pending) {
      tables.barriers.remove(&probe);
      tables.fire((probe, None));
    } else {
      tables.barriers.insert(probe, pending);
    }
    waiter
  }

  /// Take `unit` out of every barrier and election, completing any barrier it was blocking
  pub fn retire(&self, unit: UnitId) {
    let mut tables = self.tables.lock();
    let Some(u) = self.units.get(unit) else {
      return;
    };
    u.update(|s| s.terminated = true);
    trace!(unit = %u.name, "retired");

    let met: Vec<Probe> = tables
      .barriers
      .iter()
      .filter(|(_, pending)| self.barrier_met(pending))
      .map(|(probe, _)| *probe)
      .collect();
    for probe in met {
      tables.barriers.remove(&probe);
      tables.fire((probe, None));
    }
  }

  /// First active unit, in enumeration order, whose state matches `predicate`
  pub fn find(&self, predicate: impl Fn(&UnitState) -> bool) -> Option<UnitId> {
    self
      .units
      .iter()
      .find(|u| u.read(|s| !s.terminated && predicate(s)))
      .map(|u| u.id)
  }

  fn barrier_met(&self, pending: &PendingBarrier) -> bool {
    self
      .units
      .iter()
      .all(|u| u.read(|s| s.terminated || !(pending.scope)(s) || (pending.condition)(s)))
  }

  fn grant_locked(&self, tables: &mut Tables, probe: Probe, candidate: Option<UnitId>) -> bool {
    if tables.holders.contains_key(&probe) {
      return false;
    }
    let Some(id) = candidate else {
      return false;
    };
    let active = self.units.get(id).is_some_and(|u| u.read(|s| !s.terminated));
    if !active || tables.granted.contains(&(probe, id)) {
      return false;
    }

    tables.granted.insert((probe, id));
    tables.holders.insert(probe, id);
    tables.fire((probe, Some(id)));
    true
  }

  fn grant_first_locked(
    &self,
    tables: &mut Tables,
    probe: Probe,
    eligible: &dyn Fn(&UnitState) -> bool,
  ) -> Option<UnitId> {
    if tables.holders.contains_key(&probe) {
      return None;
    }
    let candidate = self
      .units
      .iter()
      .filter(|u| !tables.granted.contains(&(probe, u.id)))
      .find(|u| u.read(|s| !s.terminated && eligible(s)))
      .map(|u| u.id);

    self.grant_locked(tables, probe, candidate).then_some(candidate).flatten()
  }
}
