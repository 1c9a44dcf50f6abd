//! Commands the shell can run for an SSH client
//!
//! [`build`] picks the command once, up front; [`Command::execute`] runs it
//! against the session's streams.

pub mod commandargs;
pub mod discover;
pub mod fallback;
pub mod gitalycall;
pub mod lfsauthenticate;
pub mod receivepack;
pub mod uploadarchive;
pub mod uploadpack;

use tracing::debug;

use crate::config::Config;
use crate::handler::Outcome;
use crate::readwriter::ReadWriter;

use commandargs::{CommandArgs, CommandType};
use discover::DiscoverCommand;
use fallback::FallbackCommand;
use gitalycall::GitContext;
use lfsauthenticate::LfsAuthenticateCommand;
use receivepack::ReceivePackCommand;
use uploadarchive::UploadArchiveCommand;
use uploadpack::UploadPackCommand;

/// A runnable command
#[derive(Debug, Clone)]
pub enum Command {
    Discover(DiscoverCommand),
    LfsAuthenticate(LfsAuthenticateCommand),
    UploadPack(UploadPackCommand),
    ReceivePack(ReceivePackCommand),
    UploadArchive(UploadArchiveCommand),
    Fallback(FallbackCommand),
}

/// Choose the command for `args`.
///
/// Commands not enabled under `migration` go to the legacy shell.
/// `git_protocol` is the client's GIT_PROTOCOL.
pub fn build(args: CommandArgs, config: &Config, git_protocol: Option<String>) -> Command {
    let command_type = args.command_type;
    if !config.feature_enabled(command_type.as_str()) {
        debug!("{} is not enabled, falling back", command_type);
        return Command::Fallback(FallbackCommand::from_env(config));
    }

    let ctx = GitContext {
        config: config.clone(),
        args,
    };

    match command_type {
        CommandType::Discover => Command::Discover(DiscoverCommand {
            config: ctx.config,
            args: ctx.args,
        }),
        CommandType::LfsAuthenticate => Command::LfsAuthenticate(LfsAuthenticateCommand { ctx }),
        CommandType::UploadPack => Command::UploadPack(UploadPackCommand { ctx, git_protocol }),
        CommandType::ReceivePack => Command::ReceivePack(ReceivePackCommand { ctx, git_protocol }),
        CommandType::UploadArchive => Command::UploadArchive(UploadArchiveCommand { ctx }),
    }
}

impl Command {
    /// Run the command to completion
    pub async fn execute(self, rw: ReadWriter) -> Outcome {
        match self {
            Command::Discover(command) => command.execute(rw).await,
            Command::LfsAuthenticate(command) => command.execute(rw).await,
            Command::UploadPack(command) => command.execute(rw).await,
            Command::ReceivePack(command) => command.execute(rw).await,
            Command::UploadArchive(command) => command.execute(rw).await,
            Command::Fallback(command) => command.execute(),
        }
    }
}
