//! Progress indicators for release runs
//!
//! Uses `linya` for allocation-free, concurrency-friendly progress bars: one bar
//! per crate, advanced as its pipeline moves through phases.

use crate::release::unit::{Phase, Unit, UnitId};
use linya::{Bar, Progress};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::Arc;

/// Number of steps from `Created` to `Done`
const STEPS: usize = 8;

struct Bars {
  progress: Progress,
  bars: HashMap<UnitId, Bar>,
}

/// Multi-bar phase progress, one bar per unit
/// Thread-safe; a disabled instance ignores every update
#[derive(Clone, Default)]
pub struct PhaseProgress {
  inner: Option<Arc<Mutex<Bars>>>,
}

impl PhaseProgress {
  /// Bars for `units`, drawn only when stderr is a terminal
  pub fn new(units: &[Arc<Unit>]) -> Self {
    if !std::io::stderr().is_terminal() {
      return Self::disabled();
    }

    let mut progress = Progress::new();
    let bars = units
      .iter()
      .map(|u| (u.id, progress.bar(STEPS, u.name.clone())))
      .collect();

    Self {
      inner: Some(Arc::new(Mutex::new(Bars { progress, bars }))),
    }
  }

  pub fn disabled() -> Self {
    Self { inner: None }
  }

  pub fn is_enabled(&self) -> bool {
    self.inner.is_some()
  }

  /// Move the unit's bar to `phase`
  pub fn update(&self, unit: UnitId, phase: Phase) {
    let Some(inner) = &self.inner else {
      return;
    };
    let Some(position) = position(phase) else {
      return;
    };

    let mut guard = inner.lock();
    let Bars { progress, bars } = &mut *guard;
    if let Some(bar) = bars.get(&unit) {
      progress.set_and_draw(bar, position);
    }
  }
}

/// Bar position for a phase; failed units keep their last position
fn position(phase: Phase) -> Option<usize> {
  let step = match phase {
    Phase::Created => 0,
    Phase::Verifying => 1,
    Phase::Analyzing => 2,
    Phase::SeverityFinal => 3,
    Phase::NotesGenerated => 4,
    Phase::Tagging => 5,
    Phase::Prepared => 6,
    Phase::Published => 7,
    Phase::Done => STEPS,
    Phase::Failed => return None,
  };
  Some(step)
}
