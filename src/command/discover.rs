//! Greeting for SSH sessions without a command

use tokio::io::AsyncWriteExt;

use super::commandargs::CommandArgs;
use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::gitlabnet::discover::{DiscoverClient, DiscoverResponse};
use crate::gitlabnet::{blocking, GitlabClient};
use crate::handler::Outcome;
use crate::readwriter::ReadWriter;

#[derive(Debug, Clone)]
pub struct DiscoverCommand {
    pub config: Config,
    pub args: CommandArgs,
}

impl DiscoverCommand {
    /// Print `Welcome to GitLab, @<username>!` for the caller
    pub async fn execute(&self, mut rw: ReadWriter) -> Outcome {
        let user = match self.user_info().await {
            Ok(user) => user,
            Err(e) => {
                return Outcome::failure(ShellError::api(format!(
                    "Failed to get username: {}",
                    e
                )))
            }
        };

        let greeting = match user {
            Some(user) => format!("Welcome to GitLab, @{}!\n", user.username),
            None => "Welcome to GitLab, Anonymous!\n".to_string(),
        };

        let written = async {
            rw.out.write_all(greeting.as_bytes()).await?;
            rw.out.flush().await
        };
        Outcome::from(written.await.map_err(ShellError::from))
    }

    async fn user_info(&self) -> Result<Option<DiscoverResponse>> {
        let who = self.args.who.clone().ok_or(ShellError::InvalidWho)?;
        let config = self.config.clone();

        blocking(move || DiscoverClient::new(GitlabClient::new(&config)?).get_user(&who)).await
    }
}
