//! `git-lfs-authenticate`: hand the Git LFS client an HTTP credential

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::commandargs::CommandArgs;
use super::gitalycall::{verify_access, GitContext};
use crate::error::{Result, ShellError};
use crate::gitlabnet::lfsauthenticate::{LfsClient, LfsResponse};
use crate::gitlabnet::{blocking, GitlabClient};
use crate::handler::Outcome;
use crate::readwriter::ReadWriter;

#[derive(Debug, Serialize)]
struct Header {
    #[serde(rename = "Authorization")]
    authorization: String,
}

/// What the LFS client expects on stdout
#[derive(Debug, Serialize)]
struct Payload {
    header: Header,
    href: String,
    expires_in: i64,
}

impl From<LfsResponse> for Payload {
    fn from(response: LfsResponse) -> Self {
        let credentials = format!("{}:{}", response.username, response.lfs_token);
        Self {
            header: Header {
                authorization: format!("Basic {}", STANDARD.encode(credentials)),
            },
            href: format!("{}/info/lfs", response.repository_http_path),
            expires_in: response.expires_in,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LfsAuthenticateCommand {
    pub ctx: GitContext,
}

impl LfsAuthenticateCommand {
    pub async fn execute(&self, mut rw: ReadWriter) -> Outcome {
        let payload = match self.payload().await {
            Ok(payload) => payload,
            Err(e) => return Outcome::failure(e),
        };

        let written = async {
            rw.out.write_all(payload.as_bytes()).await?;
            rw.out.flush().await
        };
        Outcome::from(written.await.map_err(ShellError::from))
    }

    async fn payload(&self) -> Result<String> {
        let args: &CommandArgs = &self.ctx.args;
        let operation = args.lfs_operation.ok_or(ShellError::DisallowedCommand)?;
        let who = args.who.clone().ok_or(ShellError::InvalidWho)?;

        verify_access(&self.ctx, operation.access_action()).await?;
        info!(
            "lfs {} on {} for {}",
            operation.as_str(),
            args.repo(),
            who
        );

        let config = self.ctx.config.clone();
        let repo = args.repo().to_string();
        let response = blocking(move || {
            LfsClient::new(GitlabClient::new(&config)?).authenticate(operation, &repo, &who)
        })
        .await?;

        render(response)
    }
}

fn render(response: LfsResponse) -> Result<String> {
    let mut json = serde_json::to_string(&Payload::from(response))?;
    json.push('\n');
    Ok(json)
}
