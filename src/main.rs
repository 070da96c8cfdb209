mod cargo;
mod commands;
mod core;
mod graph;
mod release;
mod sync;
mod ui;

use clap::{Args, Parser, Subcommand};
use core::config::{DependentRelease, ReleaseOverrides};
use core::context::WorkspaceContext;
use core::error::{ExitCode, RelayError, RelayResult, ResultExt, print_error};
use release::resolver::{BumpStrategy, VersionPrefix};
use std::path::PathBuf;

/// Coordinated, dependency-aware releases for Cargo workspaces
#[derive(Parser)]
#[command(name = "cargo")]
#[command(bin_name = "cargo")]
#[command(styles = get_styles())]
enum CargoCli {
  Relay(RelayCli),
}

#[derive(Parser)]
#[command(name = "relay")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct RelayCli {
  /// Show debug diagnostics on stderr (RELAY_LOG takes precedence)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Release every changed crate in dependency order (version, tag, publish)
  Run {
    #[command(flatten)]
    release: ReleaseArgs,
  },

  /// Show what a release would do without touching anything
  Plan {
    #[command(flatten)]
    release: ReleaseArgs,
    /// Output the plan in JSON format (useful for CI/automation)
    #[arg(long)]
    json: bool,
  },
}

/// Flags shared by `run` and `plan`; each overrides relay.toml
#[derive(Args)]
struct ReleaseArgs {
  /// Compute versions and notes only: no manifest writes, tags or uploads
  #[arg(long)]
  dry_run: bool,
  /// Verify and analyze one crate at a time
  #[arg(long)]
  sequential: bool,
  /// Leave these crates out of the run
  #[arg(long, value_name = "NAME", num_args = 1..)]
  exclude: Vec<String>,
  /// How dependents' version requirements are rewritten
  #[arg(long, value_enum)]
  strategy: Option<BumpStrategy>,
  /// Operator written in front of overridden requirements: "", "^", "~", "="
  #[arg(long)]
  prefix: Option<VersionPrefix>,
  /// Minimum bump for a crate whose dependencies were released
  #[arg(long, value_enum)]
  dependent_release: Option<DependentRelease>,
  /// Only follow first-parent history when collecting commits
  #[arg(long)]
  first_parent: bool,
  /// Skip crates marked `publish = false`
  #[arg(long)]
  ignore_private: bool,
  /// Version and tag, but do not upload to the registry
  #[arg(long)]
  no_publish: bool,
  /// Cut pre-releases on this channel, e.g. `beta` gives `1.3.0-beta.1`
  #[arg(long, value_name = "ID")]
  prerelease: Option<String>,
  /// Prepend release notes to this file in each crate directory
  #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "CHANGELOG.md")]
  changelog: Option<PathBuf>,
}

impl From<ReleaseArgs> for ReleaseOverrides {
  fn from(args: ReleaseArgs) -> Self {
    Self {
      dry_run: args.dry_run,
      sequential: args.sequential,
      first_parent: args.first_parent,
      ignore_private: args.ignore_private,
      no_publish: args.no_publish,
      exclude: args.exclude,
      strategy: args.strategy,
      prefix: args.prefix,
      dependent_release: args.dependent_release,
      changelog: args.changelog,
      prerelease: args.prerelease,
    }
  }
}

fn get_styles() -> clap::builder::Styles {
  let yellow = anstyle::Color::Ansi(anstyle::AnsiColor::Yellow);
  let green = anstyle::Color::Ansi(anstyle::AnsiColor::Green);
  let red = anstyle::Color::Ansi(anstyle::AnsiColor::Red);

  clap::builder::Styles::styled()
    .usage(anstyle::Style::new().bold().underline().fg_color(Some(yellow)))
    .header(anstyle::Style::new().bold().underline().fg_color(Some(yellow)))
    .literal(anstyle::Style::new().fg_color(Some(green)))
    .invalid(anstyle::Style::new().bold().fg_color(Some(red)))
    .error(anstyle::Style::new().bold().fg_color(Some(red)))
    .valid(anstyle::Style::new().bold().underline().fg_color(Some(green)))
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn main() {
  let CargoCli::Relay(cli) = CargoCli::parse();

  if let Err(e) = core::logging::init(cli.verbose) {
    handle_error(e);
  }

  let runtime = match tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .context("Failed to start async runtime")
  {
    Ok(runtime) => runtime,
    Err(e) => handle_error(e),
  };

  match runtime.block_on(dispatch(cli.command)) {
    Ok(None) => {}
    Ok(Some(code)) => std::process::exit(code.as_i32()),
    Err(e) => handle_error(e),
  }
}

async fn dispatch(command: Commands) -> RelayResult<Option<ExitCode>> {
  let workspace_root = std::env::current_dir()?;
  let ctx = WorkspaceContext::build(&workspace_root).await?;

  match command {
    Commands::Run { release } => commands::run_release(&ctx, release.into()).await,
    Commands::Plan { release, json } => commands::run_plan(&ctx, release.into(), json).await.map(|()| None),
  }
}

fn handle_error(error: RelayError) -> ! {
  print_error(&error);
  std::process::exit(error.exit_code().as_i32());
}
