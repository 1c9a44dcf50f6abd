//! gitlab-shell - Entry point
//!
//! Loads config.yml, parses the SSH client's command, runs it against the
//! process's stdio and exits with its status. stdout belongs to the Git
//! protocol; user-facing errors go to stderr as `> GitLab: <message>`.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use gitlab_shell::command::commandargs::{CommandArgs, Who};
use gitlab_shell::config::{Args, Config, RuntimeDirs};
use gitlab_shell::{command, logging, Outcome, ReadWriter, ShellError};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let dirs = RuntimeDirs::from_executable().context("Failed to locate gitlab-shell")?;
    let config = Config::load(args.config.as_deref(), dirs).context("Failed to read config")?;

    logging::init(&config);

    let command_args = match CommandArgs::parse(&args.who, &args.original_command) {
        Ok(command_args) => command_args,
        Err(e) => {
            let who = Who::parse(&args.who)
                .map(|who| who.to_string())
                .unwrap_or_else(|| "unknown user".to_string());
            warn!(
                "Attempt to execute disallowed command <{}> by {}",
                args.original_command, who
            );
            eprintln!("> GitLab: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    info!(
        "gitlab-shell v{} running {}",
        env!("CARGO_PKG_VERSION"),
        command_args.command_type
    );

    let command = command::build(command_args, &config, args.git_protocol);

    // the client hanging up or sshd terminating us drops the running command,
    // which cancels any Gitaly call in flight
    let outcome = tokio::select! {
        outcome = command.execute(ReadWriter::stdio()) => outcome,
        _ = shutdown_signal() => Outcome::failure(ShellError::Cancelled),
    };

    if let Some(ref e) = outcome.error {
        error!("Command failed: {}", e);
        eprintln!("> GitLab: {}", e);
    }

    Ok(outcome.to_exit_code())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
