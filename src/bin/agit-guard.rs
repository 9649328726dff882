//! Hook entry point for the repository guards.
//!
//! Exit status: 0 when the write may proceed, 1 when it is refused,
//! 2 on usage or internal errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use agit_guard::builders::GuardBuilder;
use agit_guard::config::GuardConfig;
use agit_guard::core::{AppResult, RefTransaction};
use agit_guard::infra::PktLineSideband;
use agit_guard::util::init_tracing;
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "agit-guard",
    version,
    about = "Load admission and write-lock guards for repository hosting"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wait until host load allows a write, or refuse it.
    Admit {
        /// Send progress and errors as side-band pkt-lines on stdout.
        #[arg(long)]
        sideband: bool,
        /// Print the verdict as JSON on stdout.
        #[arg(long, conflicts_with = "sideband")]
        json: bool,
    },
    /// Refuse the write if a lock file exists above the control directory.
    CheckLock {
        /// Repository control directory.
        control_dir: PathBuf,
        /// Number of ref updates in the transaction.
        #[arg(long, default_value_t = 1)]
        updates: usize,
        /// Print the verdict as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Record that the repository was just written.
    Touch {
        /// Repository control directory.
        control_dir: PathBuf,
    },
    /// Print the resolved configuration as JSON.
    Config,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("agit-guard: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> AppResult<ExitCode> {
    match cli.command {
        Command::Admit { sideband, json } => {
            let mut builder = GuardBuilder::from_env();
            if sideband {
                builder =
                    builder.with_remote_channel(Arc::new(PktLineSideband::new(std::io::stdout())));
            }
            let admission = builder.build_admission().admit(sideband);
            if json {
                print_json(&admission)?;
            }
            Ok(ExitCode::from(admission.exit_code()))
        }
        Command::CheckLock {
            control_dir,
            updates,
            json,
        } => {
            let guard = GuardBuilder::from_env().build();
            let verdict = guard.check_write_lock(&RefTransaction::new(control_dir, updates));
            if json {
                print_json(&verdict)?;
            } else if let Some(reason) = verdict.reason() {
                eprintln!("{reason}");
            }
            Ok(if verdict.is_denied() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Touch { control_dir } => {
            let outcome = GuardBuilder::from_env().build().touch_timestamp(&control_dir);
            tracing::debug!(?outcome, "touch finished");
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            let config = GuardConfig::from_env();
            if let Err(e) = config.validate() {
                tracing::warn!("{}", e);
            }
            print_json(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
