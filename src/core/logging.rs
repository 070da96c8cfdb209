//! Diagnostic logging
//!
//! Diagnostics go through `tracing` to stderr. User-facing output stays on stdout
//! via `println!`, so `cargo relay plan --json` remains machine-readable.

use crate::core::error::RelayResult;
use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `RELAY_LOG=cargo_relay=trace`
pub const LOG_ENV: &str = "RELAY_LOG";

/// Default directive: `warn`, or `debug` for our own events with `-v`
fn default_directive(verbose: bool) -> &'static str {
  if verbose { "warn,cargo_relay=debug" } else { "warn" }
}

/// Install the global subscriber; `RELAY_LOG` wins over `-v`
pub fn init(verbose: bool) -> RelayResult<()> {
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(verbose)
    .try_init()
    .map_err(|e| anyhow::anyhow!(e))?;
  Ok(())
}
