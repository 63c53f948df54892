use clap::{Parser, Subcommand};
use guardian::commands::{self, ConsoleReporter, TargetArgs};
use guardian::{GuardianHome, GuardianResult, RuntimeFlags};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "guardian", version, about = "Out-of-band approval for protected operations")]
struct Cli {
    /// Directory holding policies.toml, grants and the audit log
    #[arg(long, global = true, env = "GUARDIAN_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authorize an operation without running anything
    Check {
        #[command(flatten)]
        target: TargetArgs,

        /// Command line shown on the approval page
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Authorize an operation, then run the command after `--`
    Approve {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Create the default policy file if none exists
    Setup,

    /// Show the policy file, its policies and active grants
    Status {
        /// Show a single policy by name
        policy: Option<String>,
    },

    /// Inspect or revoke grants
    Grant {
        #[command(subcommand)]
        action: GrantAction,
    },
}

#[derive(Debug, Subcommand)]
enum GrantAction {
    /// List active grants
    List,
    /// Revoke a grant by id
    Revoke { id: String },
    /// Delete expired grant files
    Prune,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GUARDIAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let home = match cli.home {
        Some(path) => GuardianHome::at(path),
        None => match GuardianHome::from_env() {
            Ok(home) => home,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(78);
            }
        },
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling pending approval");
            on_interrupt.cancel();
        }
    });

    let code = match run(cli.command, &home, cancel).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(command: Command, home: &GuardianHome, cancel: CancellationToken) -> GuardianResult<i32> {
    let flags = RuntimeFlags::from_env();

    match command {
        Command::Check { target, command } => {
            let guard = commands::build_guard(home, flags)?;
            let request = target.into_request(command);
            commands::check(&guard, &request, cancel, &ConsoleReporter).await
        }
        Command::Approve { target, command } => {
            let guard = commands::build_guard(home, flags)?;
            let request = target.into_request(command);
            commands::approve(&guard, &request, cancel, &ConsoleReporter).await
        }
        Command::Setup => {
            let path = commands::setup(home)?;
            println!("Policy file: {}", path.display());
            Ok(0)
        }
        Command::Status { policy } => {
            print!("{}", commands::status(home, policy.as_deref())?);
            Ok(0)
        }
        Command::Grant { action } => match action {
            GrantAction::List => {
                print!("{}", commands::grant_list(home)?);
                Ok(0)
            }
            GrantAction::Revoke { id } => {
                commands::grant_revoke(home, &id)?;
                println!("Revoked {}", id);
                Ok(0)
            }
            GrantAction::Prune => {
                let removed = commands::grant_prune(home)?;
                println!("Removed {} expired grant(s)", removed);
                Ok(0)
            }
        },
    }
}
